use std::sync::Mutex as StdMutex;

use tokio::sync::RwLock;

use crate::config::SessionPaths;

use super::{AuthError, CredentialPair, Identity};

const ACCESS_ENTRY: &str = "access.credential";
const REFRESH_ENTRY: &str = "refresh.credential";
const IDENTITY_ENTRY: &str = "identity.json";

/// One persisted session: the credential pair plus the identity it belongs to.
///
/// The three underlying storage entries are read and written together;
/// a session with only some of them present is treated as no session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub pair: CredentialPair,
    pub identity: Identity,
}

/// Persistence abstraction for session credentials.
pub trait StorageBackend: Send + Sync {
    fn load(&self, profile: &str) -> Result<Option<PersistedSession>, AuthError>;
    fn save(&self, profile: &str, session: &PersistedSession) -> Result<(), AuthError>;
    fn clear(&self, profile: &str) -> Result<(), AuthError>;
}

/// Filesystem-backed storage located in the user configuration directory.
///
/// Each profile owns a directory with three entries: the access credential,
/// the refresh credential, and the serialized identity.
pub struct FileStorage {
    paths: SessionPaths,
}

impl FileStorage {
    pub fn new(paths: SessionPaths) -> Self {
        Self { paths }
    }

    pub fn in_user_config_dir() -> Result<Self, AuthError> {
        Ok(Self::new(SessionPaths::discover()?))
    }
}

impl StorageBackend for FileStorage {
    fn load(&self, profile: &str) -> Result<Option<PersistedSession>, AuthError> {
        let access = self.paths.read_entry(profile, ACCESS_ENTRY)?;
        let refresh = self.paths.read_entry(profile, REFRESH_ENTRY)?;
        let identity = self.paths.read_entry(profile, IDENTITY_ENTRY)?;

        let (access, refresh, identity) = match (access, refresh, identity) {
            (Some(a), Some(r), Some(i)) => (a, r, i),
            (None, None, None) => return Ok(None),
            // Partial state means a write was interrupted. Treat as no session.
            _ => {
                tracing::warn!(profile, "incomplete persisted session; clearing");
                self.clear(profile)?;
                return Ok(None);
            }
        };

        match serde_json::from_str::<Identity>(&identity) {
            Ok(identity) => Ok(Some(PersistedSession {
                pair: CredentialPair::new(access, refresh),
                identity,
            })),
            Err(_) => {
                tracing::warn!(profile, "malformed persisted identity; clearing");
                self.clear(profile)?;
                Ok(None)
            }
        }
    }

    fn save(&self, profile: &str, session: &PersistedSession) -> Result<(), AuthError> {
        let identity = serde_json::to_string_pretty(&session.identity)?;
        self.paths
            .write_entry(profile, ACCESS_ENTRY, &session.pair.access_credential)?;
        self.paths
            .write_entry(profile, REFRESH_ENTRY, &session.pair.refresh_credential)?;
        self.paths.write_entry(profile, IDENTITY_ENTRY, &identity)?;
        Ok(())
    }

    fn clear(&self, profile: &str) -> Result<(), AuthError> {
        self.paths.remove_profile(profile)?;
        Ok(())
    }
}

/// Volatile storage used by tests and ephemeral consumers.
#[derive(Default)]
pub struct MemoryStorage {
    inner: StdMutex<Option<PersistedSession>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self, _profile: &str) -> Result<Option<PersistedSession>, AuthError> {
        Ok(self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, _profile: &str, session: &PersistedSession) -> Result<(), AuthError> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());
        Ok(())
    }

    fn clear(&self, _profile: &str) -> Result<(), AuthError> {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

/// In-memory cache of the active session, write-through to a [`StorageBackend`].
///
/// Readers never observe a half-written pair: `set`, `replace_pair`, and
/// `clear` all swap the cached session as a unit while holding the write
/// lock, and the backend write completes before the swap. The store never
/// performs network calls.
pub struct CredentialStore {
    storage: Box<dyn StorageBackend>,
    profile: String,
    state: RwLock<Option<PersistedSession>>,
}

impl CredentialStore {
    pub fn new(storage: impl StorageBackend + 'static, profile: impl Into<String>) -> Self {
        Self {
            storage: Box::new(storage),
            profile: profile.into(),
            state: RwLock::new(None),
        }
    }

    /// Store backed by volatile memory, mainly useful in tests.
    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new(), "default")
    }

    /// Hydrate the cache from durable storage. Malformed or partial
    /// persisted state is treated as "no session", not as an error.
    pub async fn load(&self) -> Result<(), AuthError> {
        let loaded = self.storage.load(&self.profile)?;
        let mut state = self.state.write().await;
        *state = loaded;
        Ok(())
    }

    /// Replace the active session, in memory and on disk, as one unit.
    pub async fn set(&self, pair: CredentialPair, identity: Identity) -> Result<(), AuthError> {
        let session = PersistedSession { pair, identity };
        let mut state = self.state.write().await;
        self.storage.save(&self.profile, &session)?;
        *state = Some(session);
        Ok(())
    }

    /// Swap in a freshly issued credential pair, keeping the identity.
    /// Fails if there is no active session to attach the pair to.
    pub async fn replace_pair(&self, pair: CredentialPair) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        let identity = match state.as_ref() {
            Some(session) => session.identity.clone(),
            None => return Err(AuthError::NotAuthenticated),
        };
        let session = PersistedSession { pair, identity };
        self.storage.save(&self.profile, &session)?;
        *state = Some(session);
        Ok(())
    }

    /// Drop the active session, in memory and on disk.
    pub async fn clear(&self) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        *state = None;
        self.storage.clear(&self.profile)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_some()
    }

    pub async fn access_credential(&self) -> Option<String> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|session| session.pair.access_credential.clone())
    }

    pub async fn refresh_credential(&self) -> Option<String> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|session| session.pair.refresh_credential.clone())
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|session| session.identity.clone())
    }

    /// Atomic view of the cached session.
    pub async fn snapshot(&self) -> Option<PersistedSession> {
        self.state.read().await.clone()
    }
}
