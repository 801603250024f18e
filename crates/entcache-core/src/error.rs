// ── Core error types ──
//
// What callers of the cache see. Transport details are folded into a
// handful of cache-level variants by the `From<entcache_api::Error>` impl.
// Selector input problems never surface here: selectors log and degrade.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport failures ───────────────────────────────────────────
    #[error("Transport failure: {message}")]
    TransportFailure {
        message: String,
        /// HTTP status code, when the failure carried one.
        status: Option<u16>,
        /// Service-specific error code from the response body.
        code: Option<String>,
    },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Entity not found: {entity} with id {identifier}")]
    NotFound { entity: String, identifier: String },

    // ── Payload errors ───────────────────────────────────────────────
    #[error("Malformed response for {entity}: {message}")]
    MalformedResponse { entity: String, message: String },

    // ── Caller errors ────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the failure came from the network or the remote service,
    /// as opposed to a bad payload or local configuration.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure { .. }
                | Self::Timeout { .. }
                | Self::AuthenticationFailed { .. }
                | Self::NotFound { .. }
        )
    }

    /// HTTP status code, if one is known.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransportFailure { status, .. } => *status,
            Self::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// Name the entity (and id) a failed call was about.
    pub(crate) fn for_target(self, entity: &str, id: Option<&str>) -> Self {
        match self {
            Self::NotFound { .. } => Self::NotFound {
                entity: entity.to_owned(),
                identifier: id.unwrap_or_default().to_owned(),
            },
            Self::MalformedResponse { message, .. } => Self::MalformedResponse {
                entity: entity.to_owned(),
                message,
            },
            other => other,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<entcache_api::Error> for CoreError {
    fn from(err: entcache_api::Error) -> Self {
        if err.is_not_found() {
            return CoreError::NotFound {
                entity: "resource".into(),
                identifier: String::new(),
            };
        }
        match err {
            entcache_api::Error::Authentication { message, .. } => {
                CoreError::AuthenticationFailed { message }
            }
            entcache_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            entcache_api::Error::Transport(ref e) if e.is_timeout() => {
                CoreError::Timeout { timeout_secs: 0 }
            }
            entcache_api::Error::Transport(e) => CoreError::TransportFailure {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
                code: None,
            },
            entcache_api::Error::Api {
                status,
                message,
                code,
            } => CoreError::TransportFailure {
                message,
                status: Some(status),
                code,
            },
            entcache_api::Error::Tls(msg) => CoreError::TransportFailure {
                message: format!("TLS error: {msg}"),
                status: None,
                code: None,
            },
            entcache_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            entcache_api::Error::Deserialization { message, .. } => CoreError::MalformedResponse {
                entity: "response".into(),
                message,
            },
        }
    }
}
