//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use entcache_config::ConfigError;
use entcache_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Request failed: {message}")]
    #[diagnostic(
        code(entcache::connection_failed),
        help(
            "Check that the API is reachable and the base URL is right.\n\
             Try: entcache config show"
        )
    )]
    ConnectionFailed { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(entcache::auth_failed),
        help("Pass --token, set ENTCACHE_TOKEN, or set token_env in your profile.")
    )]
    AuthFailed { message: String },

    #[error("No token available for profile '{profile}'")]
    #[diagnostic(
        code(entcache::no_credentials),
        help("The profile reads its token from ${env}, which is not set.")
    )]
    NoCredentials { profile: String, env: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{entity} '{identifier}' not found")]
    #[diagnostic(
        code(entcache::not_found),
        help("Run: entcache list {entity} to see available records")
    )]
    NotFound { entity: String, identifier: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error(
        "API error ({status}): {message}{}",
        .code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default()
    )]
    #[diagnostic(code(entcache::api_error))]
    ApiError {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("Unexpected response for {entity}: {message}")]
    #[diagnostic(code(entcache::malformed_response))]
    MalformedResponse { entity: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(entcache::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(entcache::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: entcache config set-profile <name> --url <url>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No API base URL configured")]
    #[diagnostic(
        code(entcache::no_config),
        help(
            "Pass --base-url, or create a profile with: entcache config set-profile\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(entcache::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(entcache::timeout),
        help("Increase the timeout with --timeout or check the API's responsiveness.")
    )]
    Timeout { seconds: u64 },

    #[error("Internal error: {0}")]
    #[diagnostic(code(entcache::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(entcache::json), help("Check the JSON payload and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(entcache::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::ApiError { status: 409, .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::Json(_)
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::Config(_) => exit_code::USAGE,
            Self::ApiError { .. }
            | Self::MalformedResponse { .. }
            | Self::Internal(_)
            | Self::Io(_)
            | Self::Yaml(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TransportFailure {
                message,
                status: Some(status),
                code,
            } => Self::ApiError {
                status,
                message,
                code,
            },
            CoreError::TransportFailure { message, .. } => Self::ConnectionFailed { message },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::NotFound { entity, identifier } => Self::NotFound { entity, identifier },
            CoreError::MalformedResponse { entity, message } => {
                Self::MalformedResponse { entity, message }
            }
            CoreError::ValidationFailed { message } => Self::Validation {
                field: "argument".into(),
                reason: message,
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile, env } => Self::NoCredentials { profile, env },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_bearing_transport_failure_is_an_api_error() {
        let err = CliError::from(CoreError::TransportFailure {
            message: "conflict".into(),
            status: Some(409),
            code: None,
        });
        assert!(matches!(err, CliError::ApiError { status: 409, .. }));
        assert_eq!(err.exit_code(), exit_code::CONFLICT);
    }

    #[test]
    fn statusless_transport_failure_is_a_connection_error() {
        let err = CliError::from(CoreError::TransportFailure {
            message: "connection refused".into(),
            status: None,
            code: None,
        });
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn not_found_keeps_its_target() {
        let err = CliError::from(CoreError::NotFound {
            entity: "post".into(),
            identifier: "p9".into(),
        });
        assert_eq!(err.to_string(), "post 'p9' not found");
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn missing_token_env_is_an_auth_error() {
        let err = CliError::from(ConfigError::NoCredentials {
            profile: "prod".into(),
            env: "PROD_TOKEN".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }
}
