use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthErrorCode, CredentialPair, Identity};

/// Server-tracked metadata for one logged-in device, read-only to clients.
///
/// Refreshing rotates the credential pair but keeps the same `session_id`;
/// `is_current` is true only for the record tied to the caller's own
/// refresh lineage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub device_descriptor: String,
    pub origin_address: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_current: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Payload returned by a successful login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSuccess {
    #[serde(flatten)]
    pub pair: CredentialPair,
    pub identity: Identity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_credential: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogoutAllResponse {
    pub sessions_destroyed: u64,
}

/// Structured failure body returned by the registry.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub code: Option<AuthErrorCode>,
    pub message: Option<String>,
}
