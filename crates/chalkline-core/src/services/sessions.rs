use crate::api::{ApiClient, ApiRequest, ApiResult};
use crate::registry::{LogoutAllResponse, SessionRecord};

/// Session administration over the authenticated call wrapper: list the
/// account's device sessions, revoke one, or revoke them all.
#[derive(Clone)]
pub struct SessionService {
    api: ApiClient,
}

impl SessionService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Every live session for the account, one per logged-in device.
    pub async fn list(&self) -> ApiResult<Vec<SessionRecord>> {
        self.api.send_json(&ApiRequest::get("/sessions")).await
    }

    /// Destroy one session record and invalidate its refresh lineage. If
    /// the terminated session is the caller's own, the next refresh fails
    /// and that device is forced back to login.
    pub async fn terminate(&self, session_id: &str) -> ApiResult<()> {
        self.api
            .send(&ApiRequest::delete(format!("/sessions/{session_id}")))
            .await?;
        Ok(())
    }

    /// Log out everywhere. Returns how many sessions the registry
    /// destroyed, the caller's own included.
    pub async fn terminate_all(&self) -> ApiResult<u64> {
        let response: LogoutAllResponse = self
            .api
            .send_json(&ApiRequest::post("/auth/logout-all"))
            .await?;
        Ok(response.sessions_destroyed)
    }
}
