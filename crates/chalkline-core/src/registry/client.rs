use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::auth::{AuthError, AuthErrorCode, CredentialPair};

use super::types::{ErrorEnvelope, LoginRequest, LoginSuccess, RefreshRequest};

const DEFAULT_BASE_URL: &str = "https://api.chalkline.app";
const DEFAULT_USER_AGENT: &str = "chalkline-rs/0.1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the session registry lives.
#[derive(Debug, Clone)]
pub struct RegistryEndpoints {
    pub base_url: Url,
}

impl RegistryEndpoints {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    pub fn login_url(&self) -> Result<Url, url::ParseError> {
        self.base_url.join("/auth/login")
    }

    pub fn refresh_url(&self) -> Result<Url, url::ParseError> {
        self.base_url.join("/auth/refresh")
    }

    pub fn logout_url(&self) -> Result<Url, url::ParseError> {
        self.base_url.join("/auth/logout")
    }
}

impl Default for RegistryEndpoints {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("valid default base URL"),
        }
    }
}

/// HTTP adapter for the session registry's credential-issuing endpoints.
///
/// Only the unauthenticated surface lives here (login, refresh, best-effort
/// logout notification). Everything that requires a valid access credential
/// goes through the authenticated call wrapper instead.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: Client,
    endpoints: RegistryEndpoints,
}

impl RegistryClient {
    pub fn new(endpoints: RegistryEndpoints) -> Result<Self, AuthError> {
        let http = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &RegistryEndpoints {
        &self.endpoints
    }

    /// Exchange account credentials for a fresh pair, identity, and a new
    /// server-side session record.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSuccess, AuthError> {
        let response = self
            .http
            .post(self.endpoints.login_url()?)
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let response = Self::reject_failures(response).await?;
        Ok(response.json::<LoginSuccess>().await?)
    }

    /// Trade a refresh credential for a new pair. Refresh credentials are
    /// single use: a reused, revoked, or expired credential is rejected.
    pub async fn refresh(&self, refresh_credential: &str) -> Result<CredentialPair, AuthError> {
        let response = self
            .http
            .post(self.endpoints.refresh_url()?)
            .json(&RefreshRequest { refresh_credential })
            .send()
            .await?;
        let response = Self::reject_failures(response).await?;
        Ok(response.json::<CredentialPair>().await?)
    }

    /// Tell the registry the device is logging out. Callers treat this as
    /// fire-and-forget; local state is authoritative regardless.
    pub async fn logout(&self, access_credential: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.endpoints.logout_url()?)
            .bearer_auth(access_credential)
            .send()
            .await?;
        Self::reject_failures(response).await?;
        Ok(())
    }

    async fn reject_failures(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let envelope = serde_json::from_str::<ErrorEnvelope>(&body).unwrap_or(ErrorEnvelope {
            code: None,
            message: None,
        });
        Err(AuthError::Registry {
            status,
            code: envelope.code.unwrap_or(AuthErrorCode::AuthError),
            message: envelope.message.unwrap_or(body),
        })
    }
}
