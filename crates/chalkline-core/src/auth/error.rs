use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by credential storage and session lifecycle routines.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registry rejected the request ({status}, {code}): {message}")]
    Registry {
        status: StatusCode,
        code: AuthErrorCode,
        message: String,
    },
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Machine-readable failure codes returned by the session registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorCode {
    TokenMissing,
    TokenInvalid,
    AuthRequired,
    InsufficientPermissions,
    AuthError,
    #[serde(other)]
    Unknown,
}

impl AuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorCode::TokenMissing => "TOKEN_MISSING",
            AuthErrorCode::TokenInvalid => "TOKEN_INVALID",
            AuthErrorCode::AuthRequired => "AUTH_REQUIRED",
            AuthErrorCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            AuthErrorCode::AuthError => "AUTH_ERROR",
            AuthErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
