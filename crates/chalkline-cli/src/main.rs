use std::env;

use anyhow::{anyhow, Context, Result};
use chalkline_core::api::ApiError;
use chalkline_core::auth::{CredentialStore, FileStorage, SessionManager};
use chalkline_core::registry::{RegistryClient, RegistryEndpoints, SessionRecord};
use chalkline_core::services::SessionService;
use clap::{Args, Parser, Subcommand};
use tokio::task;
use url::Url;

const DEFAULT_PROFILE: &str = "default";

#[derive(Parser, Debug)]
#[command(author, version, about = "Chalkline terminal client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authentication related commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Manage sessions across logged-in devices
    #[command(subcommand)]
    Sessions(SessionsCommand),
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Log in with platform account credentials
    Login(LoginArgs),
    /// Log this device out and forget stored credentials
    Logout(ProfileArgs),
    /// Show the identity behind the stored session
    Whoami(WhoamiArgs),
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    /// List every live session for the account
    List(SessionListArgs),
    /// Terminate one session by its id
    Revoke(RevokeArgs),
    /// Log out everywhere, destroying every session
    RevokeAll(ProfileArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Account email (prompted when omitted)
    #[arg(long)]
    email: Option<String>,
    /// Profile name for stored credentials
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    /// Profile name for stored credentials
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

#[derive(Args, Debug)]
struct WhoamiArgs {
    /// Profile name for stored credentials
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SessionListArgs {
    /// Profile name for stored credentials
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct RevokeArgs {
    /// Session id as shown by `chalkline sessions list`
    session_id: String,
    /// Profile name for stored credentials
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Auth(cmd) => match cmd {
            AuthCommand::Login(args) => auth_login(args).await?,
            AuthCommand::Logout(args) => auth_logout(args).await?,
            AuthCommand::Whoami(args) => auth_whoami(args).await?,
        },
        Commands::Sessions(cmd) => match cmd {
            SessionsCommand::List(args) => sessions_list(args).await?,
            SessionsCommand::Revoke(args) => sessions_revoke(args).await?,
            SessionsCommand::RevokeAll(args) => sessions_revoke_all(args).await?,
        },
    }
    Ok(())
}

fn build_endpoints() -> Result<RegistryEndpoints> {
    let mut endpoints = RegistryEndpoints::default();
    if let Ok(base) = env::var("CHALKLINE_API_URL") {
        if !base.trim().is_empty() {
            endpoints.base_url = Url::parse(&base).context("invalid CHALKLINE_API_URL")?;
        }
    }
    Ok(endpoints)
}

async fn build_manager(profile: &str) -> Result<SessionManager> {
    let storage =
        FileStorage::in_user_config_dir().context("unable to initialise credential storage")?;
    let registry =
        RegistryClient::new(build_endpoints()?).context("failed to build registry client")?;
    let manager = SessionManager::new(CredentialStore::new(storage, profile), registry);
    manager
        .load()
        .await
        .context("failed to read stored credentials")?;
    Ok(manager)
}

async fn authenticated_manager(profile: &str) -> Result<SessionManager> {
    let manager = build_manager(profile).await?;
    if !manager.is_authenticated().await {
        return Err(anyhow!(
            "no credentials stored for profile '{}'; run `chalkline auth login`",
            profile
        ));
    }
    Ok(manager)
}

fn explain(err: ApiError, profile: &str) -> anyhow::Error {
    match err {
        ApiError::AuthenticationRequired => anyhow!(
            "session for profile '{}' has expired; run `chalkline auth login`",
            profile
        ),
        other => anyhow::Error::new(other),
    }
}

async fn auth_login(args: LoginArgs) -> Result<()> {
    let manager = build_manager(&args.profile).await?;
    let email = match args.email {
        Some(email) => email,
        None => prompt("Email: ").await?,
    };
    let password = prompt("Password: ").await?;

    let identity = manager
        .login(email.trim(), &password)
        .await
        .context("login failed")?;

    println!(
        "Login succeeded. Credentials stored for profile '{}'.",
        args.profile
    );
    println!(
        "Logged in as {} <{}> ({:?})",
        identity.display_name(),
        identity.email,
        identity.role
    );
    Ok(())
}

async fn auth_logout(args: ProfileArgs) -> Result<()> {
    let manager = build_manager(&args.profile).await?;
    manager
        .logout()
        .await
        .context("failed to remove stored credentials")?;
    println!("Logged out profile '{}'.", args.profile);
    Ok(())
}

async fn auth_whoami(args: WhoamiArgs) -> Result<()> {
    let manager = authenticated_manager(&args.profile).await?;
    let identity = manager
        .identity()
        .await
        .ok_or_else(|| anyhow!("stored session is missing an identity"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&identity)?);
        return Ok(());
    }

    println!("User ID : {}", identity.id);
    println!("Name    : {}", identity.display_name());
    println!("Email   : {}", identity.email);
    println!("Role    : {:?}", identity.role);
    Ok(())
}

async fn sessions_list(args: SessionListArgs) -> Result<()> {
    let manager = authenticated_manager(&args.profile).await?;
    let service = SessionService::new(manager.client()?);
    let sessions = service
        .list()
        .await
        .map_err(|err| explain(err, &args.profile))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No live sessions.");
        return Ok(());
    }
    for record in &sessions {
        render_session(record);
    }
    Ok(())
}

fn render_session(record: &SessionRecord) {
    let marker = if record.is_current { "*" } else { " " };
    println!(
        "{} {}  {}  from {}  last active {}  expires {}",
        marker,
        record.session_id,
        record.device_descriptor,
        record.origin_address,
        record.last_activity_at.to_rfc3339(),
        record.expires_at.to_rfc3339(),
    );
}

async fn sessions_revoke(args: RevokeArgs) -> Result<()> {
    let manager = authenticated_manager(&args.profile).await?;
    let service = SessionService::new(manager.client()?);
    service
        .terminate(&args.session_id)
        .await
        .map_err(|err| explain(err, &args.profile))?;
    println!("Terminated session {}.", args.session_id);
    Ok(())
}

async fn sessions_revoke_all(args: ProfileArgs) -> Result<()> {
    let manager = authenticated_manager(&args.profile).await?;
    let service = SessionService::new(manager.client()?);
    let destroyed = service
        .terminate_all()
        .await
        .map_err(|err| explain(err, &args.profile))?;

    // Our own session is among the destroyed; drop the local copy too.
    manager.store().clear().await?;
    println!("Destroyed {destroyed} session(s). All devices are logged out.");
    Ok(())
}

async fn prompt(label: &'static str) -> Result<String> {
    task::spawn_blocking(move || {
        use std::io::{self, Write};
        print!("{label}");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok::<_, std::io::Error>(input.trim().to_owned())
    })
    .await
    .map_err(|_| anyhow!("prompt interrupted"))?
    .context("failed to read input")
}
