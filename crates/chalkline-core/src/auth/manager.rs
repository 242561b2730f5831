use std::sync::Arc;

use crate::api::{ApiClient, ApiError};
use crate::registry::RegistryClient;

use super::{AuthError, CredentialStore, Identity, RefreshCoordinator};

/// Owns the session lifecycle for one device: login, logout, and the wiring
/// between the credential store, the refresh coordinator, and the call
/// wrapper. Construct one per profile; instances share no global state.
pub struct SessionManager {
    store: Arc<CredentialStore>,
    registry: RegistryClient,
    refresher: Arc<RefreshCoordinator>,
}

impl SessionManager {
    pub fn new(store: CredentialStore, registry: RegistryClient) -> Self {
        let store = Arc::new(store);
        let refresher = Arc::new(RefreshCoordinator::new(store.clone(), registry.clone()));
        Self {
            store,
            registry,
            refresher,
        }
    }

    pub fn store(&self) -> Arc<CredentialStore> {
        self.store.clone()
    }

    pub fn refresher(&self) -> Arc<RefreshCoordinator> {
        self.refresher.clone()
    }

    /// Call wrapper rooted at the registry's base URL, sharing this
    /// manager's store and refresh coordinator.
    pub fn client(&self) -> Result<ApiClient, ApiError> {
        ApiClient::new(
            self.registry.endpoints().base_url.clone(),
            self.store.clone(),
            self.refresher.clone(),
        )
    }

    /// Hydrate the store from durable storage on process start.
    pub async fn load(&self) -> Result<(), AuthError> {
        self.store.load().await
    }

    /// Log in and persist the issued pair together with the identity.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let success = self.registry.login(email, password).await?;
        self.store.set(success.pair, success.identity.clone()).await?;
        Ok(success.identity)
    }

    /// Log this device out. The registry notification is best effort:
    /// local state is authoritative and is cleared regardless of whether
    /// the server acknowledged.
    pub async fn logout(&self) -> Result<(), AuthError> {
        if let Some(access) = self.store.access_credential().await {
            if let Err(err) = self.registry.logout(&access).await {
                tracing::debug!(error = %err, "logout notification failed; clearing anyway");
            }
        }
        self.store.clear().await
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.store.identity().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.store.is_authenticated().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthErrorCode, CredentialPair, Role};
    use crate::registry::RegistryEndpoints;
    use httpmock::prelude::*;
    use url::Url;

    fn manager_for(server: &MockServer) -> SessionManager {
        let endpoints = RegistryEndpoints::new(Url::parse(&server.base_url()).unwrap());
        let registry = RegistryClient::new(endpoints).unwrap();
        SessionManager::new(CredentialStore::in_memory(), registry)
    }

    fn sample_identity_json() -> serde_json::Value {
        serde_json::json!({
            "id": "user-1",
            "email": "ada@example.edu",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "role": "teacher",
        })
    }

    #[tokio::test]
    async fn login_persists_pair_and_identity() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/auth/login");
            then.status(200).json_body_obj(&serde_json::json!({
                "accessCredential": "acc-1",
                "refreshCredential": "ref-1",
                "identity": sample_identity_json(),
            }));
        });

        let manager = manager_for(&server);
        let identity = manager.login("ada@example.edu", "hunter2").await.unwrap();

        mock.assert();
        assert_eq!(identity.role, Role::Teacher);
        assert!(manager.is_authenticated().await);
        let session = manager.store().snapshot().await.unwrap();
        assert_eq!(session.pair, CredentialPair::new("acc-1", "ref-1"));
    }

    #[tokio::test]
    async fn rejected_login_leaves_store_empty() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth/login");
            then.status(401).json_body_obj(&serde_json::json!({
                "code": "AUTH_ERROR",
                "message": "invalid email or password",
            }));
        });

        let manager = manager_for(&server);
        let err = manager.login("ada@example.edu", "wrong").await.unwrap_err();
        match err {
            AuthError::Registry { code, .. } => assert_eq!(code, AuthErrorCode::AuthError),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn logout_clears_even_when_notification_fails() {
        let server = MockServer::start();
        let login = server.mock(|when, then| {
            when.method(POST).path("/auth/login");
            then.status(200).json_body_obj(&serde_json::json!({
                "accessCredential": "acc-1",
                "refreshCredential": "ref-1",
                "identity": sample_identity_json(),
            }));
        });
        let logout = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/logout")
                .header("authorization", "Bearer acc-1");
            then.status(500).body("registry on fire");
        });

        let manager = manager_for(&server);
        manager.login("ada@example.edu", "hunter2").await.unwrap();
        manager.logout().await.unwrap();

        login.assert();
        logout.assert();
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn logout_without_session_skips_the_network() {
        let server = MockServer::start();
        let logout = server.mock(|when, then| {
            when.method(POST).path("/auth/logout");
            then.status(204);
        });

        let manager = manager_for(&server);
        manager.logout().await.unwrap();
        logout.assert_hits(0);
    }
}
