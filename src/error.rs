//! Domain error types.
//!
//! Application plumbing (config loading, database setup, CLI commands) uses
//! `anyhow`. The two enums here exist because callers branch on them:
//! [`QueryError`] becomes a 400 response, [`BackendError`] is always
//! recovered by falling back to local retrieval or composition.

/// Rejections produced while validating an incoming query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The query is missing or blank after trimming.
    #[error("Query is required")]
    Empty,
    /// The query exceeds the configured character cap.
    #[error("Query is too long ({len} characters). Please limit it to {max} characters")]
    TooLong { len: usize, max: usize },
}

/// Failures of a remote retrieval or generation backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Provider selected but a required setting or secret is absent.
    #[error("{backend} is not configured: {reason}")]
    NotConfigured {
        backend: &'static str,
        reason: String,
    },
    /// Transport failure: connection refused, timeout, TLS.
    #[error("{backend} request failed: {source}")]
    Http {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// Non-success HTTP status (authentication, quota, server error).
    #[error("{backend} returned HTTP {status}: {body}")]
    Status {
        backend: &'static str,
        status: u16,
        body: String,
    },
    /// Response body did not have the expected shape.
    #[error("{backend} returned an unexpected response: {reason}")]
    Malformed {
        backend: &'static str,
        reason: String,
    },
}

impl BackendError {
    /// A short hint for operators, derived from the failure kind.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            BackendError::Status { status: 401 | 403, .. } => {
                Some("check the API token environment variable")
            }
            BackendError::Status { status: 429, .. } => Some("query quota exceeded"),
            BackendError::Http { source, .. } if source.is_timeout() => {
                Some("backend timed out; consider raising timeout_secs")
            }
            _ => None,
        }
    }
}
