mod credentials;
mod error;
mod identity;
mod manager;
mod refresh;
mod store;

pub use credentials::CredentialPair;
pub use error::{AuthError, AuthErrorCode};
pub use identity::{Identity, Role};
pub use manager::SessionManager;
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use store::{CredentialStore, FileStorage, MemoryStorage, PersistedSession, StorageBackend};
