//! Error types for parc-daemon

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Collaborator wiring error
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict with current state (e.g. flare no longer active)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Write-once flag was already set
    #[error("Already set: {0}")]
    AlreadySet(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),
}

/// Errors from external collaborators (push, LLM, directory, fasts)
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Collaborator is not configured or not reachable
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Collaborator rejected the request
    #[error("Rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Per-operation deadline elapsed
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Network or protocol failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// PARC operation errors; each variant is one wire-level error kind
#[derive(Debug, Error)]
pub enum RescueError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Flare cooldown active, {remaining_secs}s remaining")]
    CooldownActive { remaining_secs: u64 },

    #[error("No active fast")]
    NoActiveFast,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Flare is no longer active")]
    FlareInactive,

    #[error("Cannot hype your own flare")]
    SelfHypeForbidden,

    #[error("Daily hype quota exhausted ({used} of {cap})")]
    QuotaExhausted { used: u64, cap: u32 },

    #[error("Only the flare owner can do that")]
    NotOwner,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dependency error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RescueError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            RescueError::InvalidInput(_) => "INVALID_INPUT",
            RescueError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            RescueError::NoActiveFast => "NO_ACTIVE_FAST",
            RescueError::NotFound(_) => "NOT_FOUND",
            RescueError::FlareInactive => "FLARE_INACTIVE",
            RescueError::SelfHypeForbidden => "SELF_HYPE_FORBIDDEN",
            RescueError::QuotaExhausted { .. } => "QUOTA_EXHAUSTED",
            RescueError::NotOwner => "NOT_OWNER",
            RescueError::Storage(StorageError::NotFound(_)) => "NOT_FOUND",
            RescueError::Storage(_)
            | RescueError::Collaborator(_)
            | RescueError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            RescueError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RescueError::SelfHypeForbidden | RescueError::NotOwner => StatusCode::FORBIDDEN,
            RescueError::CooldownActive { .. } | RescueError::QuotaExhausted { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            RescueError::NoActiveFast | RescueError::FlareInactive => StatusCode::CONFLICT,
            RescueError::NotFound(_) | RescueError::Storage(StorageError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            RescueError::Storage(_)
            | RescueError::Collaborator(_)
            | RescueError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Remediation hint for state errors
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            RescueError::CooldownActive { remaining_secs } => Some(json!({
                "remaining_secs": remaining_secs,
                "remaining_human": human_duration(*remaining_secs),
            })),
            RescueError::QuotaExhausted { used, cap } => Some(json!({
                "used": used,
                "cap": cap,
                "remaining": u64::from(*cap).saturating_sub(*used),
            })),
            _ => None,
        }
    }
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing caller identity
    #[error("Authentication required")]
    Unauthenticated,

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rescue operation failed
    #[error(transparent)]
    Rescue(#[from] RescueError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self {
            ApiError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", None),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", None),
            ApiError::Rescue(e) => (e.status(), e.kind(), e.details()),
            ApiError::Storage(StorageError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", None)
            }
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", None),
        };

        // Internal failures stay opaque to clients
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Format a second count for display, e.g. "3h 22m"
pub fn human_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for rescue operations
pub type RescueResult<T> = Result<T, RescueError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescue_error_status_codes() {
        let cases = [
            (RescueError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (RescueError::SelfHypeForbidden, StatusCode::FORBIDDEN),
            (RescueError::NotOwner, StatusCode::FORBIDDEN),
            (RescueError::NoActiveFast, StatusCode::CONFLICT),
            (RescueError::FlareInactive, StatusCode::CONFLICT),
            (
                RescueError::CooldownActive { remaining_secs: 60 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                RescueError::QuotaExhausted { used: 20, cap: 20 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (RescueError::NotFound("f".into()), StatusCode::NOT_FOUND),
            (
                RescueError::Storage(StorageError::Query("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                RescueError::Collaborator(CollaboratorError::Transport("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_kinds() {
        assert_eq!(RescueError::NoActiveFast.kind(), "NO_ACTIVE_FAST");
        assert_eq!(
            RescueError::Storage(StorageError::NotFound("f".into())).kind(),
            "NOT_FOUND"
        );
        assert_eq!(RescueError::Internal("x".into()).kind(), "INTERNAL");
    }

    #[test]
    fn test_state_errors_carry_hints() {
        let details = RescueError::CooldownActive {
            remaining_secs: 3 * 3600 + 22 * 60,
        }
        .details()
        .unwrap();
        assert_eq!(details["remaining_human"], "3h 22m");

        let details = RescueError::QuotaExhausted { used: 20, cap: 20 }
            .details()
            .unwrap();
        assert_eq!(details["used"], 20);
        assert_eq!(details["remaining"], 0);
    }

    #[test]
    fn test_human_duration() {
        assert_eq!(human_duration(59), "59s");
        assert_eq!(human_duration(61), "1m 1s");
        assert_eq!(human_duration(86_399), "23h 59m");
    }
}
