use thiserror::Error;

use crate::utils::errors::ErrorKind;

/// Typed error for a single call against one backend surface.
///
/// The variants separate failures worth retrying from ones that will fail
/// the same way again, which drives both the retry policy and the fallback
/// cascade.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// Missing or expired credentials (401)
    #[error("Authentication failed: {message} (status: {status})")]
    Authentication { status: u16, message: String },

    /// Row-level security or role checks refused the call (403, PGRST 42501)
    #[error("Permission denied: {message} (status: {status})")]
    Permission { status: u16, message: String },

    /// 404 or an RPC/function that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limiting error (429)
    #[error("Rate limited: {message} (retry after: {retry_after:?}s)")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    /// Server error (500+)
    #[error("Server error: {message} (status: {status})")]
    ServerError { status: u16, message: String },

    /// Remaining 4xx responses
    #[error("Client error: {message} (status: {status})")]
    ClientError { status: u16, message: String },

    /// Connection refused, reset, DNS failures
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt did not finish within the per-call budget
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Backend error: {0}")]
    Other(String),
}

impl BackendError {
    /// Check if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Network(_)
                | BackendError::Timeout(_)
                | BackendError::ServerError { .. }
                | BackendError::RateLimit { .. }
        )
    }

    /// Get the retry-after duration for rate limit errors
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            BackendError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Authentication { .. } | BackendError::Permission { .. } => {
                ErrorKind::Permission
            }
            BackendError::NotFound(_) => ErrorKind::NotFound,
            BackendError::ClientError { .. } | BackendError::Parse(_) => ErrorKind::Validation,
            BackendError::RateLimit { .. }
            | BackendError::ServerError { .. }
            | BackendError::Network(_)
            | BackendError::Timeout(_)
            | BackendError::Other(_) => ErrorKind::Network,
        }
    }

    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            BackendError::Network(format!("Request timeout: {}", error))
        } else if error.is_connect() {
            BackendError::Network(format!("Connection failed: {}", error))
        } else if error.is_decode() {
            BackendError::Parse(error.to_string())
        } else if error.is_request() {
            BackendError::Network(format!("Request error: {}", error))
        } else {
            BackendError::Other(error.to_string())
        }
    }

    /// Map an HTTP status and body to an error.
    ///
    /// PostgREST reports row-level-security refusals with SQLSTATE 42501,
    /// sometimes under a 401, so the body is inspected before the status.
    pub fn from_status(status: u16, body: String, retry_after: Option<u64>) -> Self {
        if body.contains("42501") {
            return BackendError::Permission {
                status,
                message: body,
            };
        }

        match status {
            401 => BackendError::Authentication {
                status,
                message: body,
            },
            403 => BackendError::Permission {
                status,
                message: body,
            },
            404 => BackendError::NotFound(body),
            429 => BackendError::RateLimit {
                message: body,
                retry_after,
            },
            400..=499 => BackendError::ClientError {
                status,
                message: body,
            },
            500..=599 => BackendError::ServerError {
                status,
                message: body,
            },
            _ => BackendError::Other(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Parse(err.to_string())
    }
}
