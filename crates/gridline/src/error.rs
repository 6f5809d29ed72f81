//! Error types for Gridline operations.

use thiserror::Error;

/// Result type for Gridline operations.
pub type GridlineResult<T> = Result<T, GridlineError>;

/// Error code the service reports for a missing resource.
pub const RESOURCE_NOT_FOUND: &str = "service_resource_not_found";

/// Errors that can occur during Gridline operations.
///
/// Service-visible categories render as `"{category}: {detail}"`.
#[derive(Debug, Error)]
pub enum GridlineError {
    /// Client construction rejected the supplied options.
    #[error("invalid_config: {0}")]
    InvalidConfig(String),

    /// The service rejected the login grant.
    #[error("login_failed: {0}")]
    LoginFailed(String),

    /// The access token lapsed and no reconnect path is available.
    #[error("expired_token: {0}")]
    ExpiredToken(String),

    /// The password-change endpoint reported an error.
    #[error("password_update_failed: {0}")]
    PasswordUpdateFailed(String),

    /// Connectivity failure or unclassified service error.
    #[error("general_failure: {0}")]
    GeneralFailure(String),

    /// Error code reported by the service, passed through as-is.
    #[error("{category}: {detail}")]
    Service {
        /// Machine-checkable error code from the response body.
        category: String,
        /// Human-readable detail from the response body.
        detail: String,
    },

    /// Response body was not JSON; no category can be assigned.
    #[error("malformed response body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    /// Local file I/O failed while preparing an upload.
    #[error("file error: {0}")]
    File(#[from] std::io::Error),
}

impl GridlineError {
    /// Machine-checkable category string.
    #[must_use]
    pub fn category(&self) -> &str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::LoginFailed(_) => "login_failed",
            Self::ExpiredToken(_) => "expired_token",
            Self::PasswordUpdateFailed(_) => "password_update_failed",
            Self::GeneralFailure(_) => "general_failure",
            Self::Service { category, .. } => category,
            Self::MalformedBody(_) => "malformed_body",
            Self::File(_) => "file_error",
        }
    }

    /// Returns `true` if the service reported a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Service { category, .. } if category == RESOURCE_NOT_FOUND)
    }
}

/// Replace a missing-resource failure with a fallback value.
///
/// Every other error passes through untouched.
pub fn or_not_found<T>(result: GridlineResult<T>, fallback: T) -> GridlineResult<T> {
    match result {
        Err(err) if err.is_not_found() => Ok(fallback),
        other => other,
    }
}
