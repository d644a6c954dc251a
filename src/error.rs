//! Crate-wide error taxonomy (spec.md §7).
//!
//! Every subsystem defines its own `thiserror` enum; [`ServerError`]
//! aggregates them at the point where a handler result must become a
//! JSON-RPC error object. The mapping from variant to reserved error code
//! happens once, here, rather than being re-derived at each call site.

use thiserror::Error;

use crate::protocol::{ErrorCode, JsonRpcErrorData};
use crate::resources::{CacheError, RegistryError, ValidationError, WatcherError};
use crate::security::SecurityError;
use crate::tools::ToolError;

/// Configuration load/parse/validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {path}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file: {path}")]
    ParseError {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration file not found: {path}")]
    NotFound { path: std::path::PathBuf },

    #[error("configuration validation failed: {message}")]
    ValidationError { message: String },
}

/// Session lifecycle failures.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session capacity reached ({max} sessions)")]
    CapacityReached { max: usize },

    #[error("session not found: {id}")]
    NotFound { id: String },

    #[error("session already initialised")]
    AlreadyInitialised,

    #[error("session not initialised")]
    NotInitialised,

    #[error("unsupported protocol version: {version}")]
    UnsupportedProtocolVersion { version: String },
}

/// Aggregated error type covering every subsystem, with a single
/// conversion point into the wire error object.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Watcher(#[from] WatcherError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Security(#[from] SecurityError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Maps this error onto the reserved JSON-RPC error code ranges
    /// (spec.md §3, §7). Internal detail (paths, stack-specific text)
    /// stays out of `message`; nothing here leaks beyond what the error's
    /// `Display` already carries, which is written defensively per
    /// variant.
    #[must_use]
    pub fn to_error_data(&self) -> JsonRpcErrorData {
        let code = match self {
            Self::Config(_) | Self::Internal(_) => ErrorCode::InternalError,
            Self::Session(SessionError::CapacityReached { .. }) => ErrorCode::RateLimited,
            Self::Session(SessionError::NotFound { .. }) => ErrorCode::NotFound,
            Self::Session(
                SessionError::AlreadyInitialised
                | SessionError::NotInitialised
                | SessionError::UnsupportedProtocolVersion { .. },
            ) => ErrorCode::InvalidRequest,
            Self::Registry(RegistryError::NotFound { .. }) => ErrorCode::NotFound,
            Self::Registry(_) | Self::Validation(_) => ErrorCode::InvalidParams,
            Self::Cache(_) | Self::Watcher(_) => ErrorCode::InternalError,
            Self::Tool(ToolError::NotFound { .. }) => ErrorCode::NotFound,
            Self::Tool(ToolError::Timeout { .. }) => ErrorCode::Timeout,
            Self::Tool(_) => ErrorCode::InternalError,
            Self::Security(SecurityError::InvalidCredentials | SecurityError::InvalidToken) => {
                ErrorCode::Unauthorized
            }
            Self::Security(SecurityError::PermissionDenied { .. }) => ErrorCode::Forbidden,
        };
        JsonRpcErrorData::new(code, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_reached_maps_to_rate_limited() {
        let err = ServerError::Session(SessionError::CapacityReached { max: 1000 });
        assert_eq!(err.to_error_data().code, ErrorCode::RateLimited.code());
    }

    #[test]
    fn not_initialised_maps_to_invalid_request() {
        let err = ServerError::Session(SessionError::NotInitialised);
        assert_eq!(err.to_error_data().code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn invalid_credentials_maps_to_unauthorized() {
        let err = ServerError::Security(SecurityError::InvalidCredentials);
        assert_eq!(err.to_error_data().code, ErrorCode::Unauthorized.code());
    }

    #[test]
    fn permission_denied_maps_to_forbidden() {
        let err = ServerError::Security(SecurityError::PermissionDenied {
            permission: "tools:call".to_string(),
        });
        assert_eq!(err.to_error_data().code, ErrorCode::Forbidden.code());
    }
}
