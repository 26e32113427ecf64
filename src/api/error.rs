use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::warn;

use crate::error::{EngineError, ErrorKind, Rejection, StateSnapshot};

/// Failure of an API call
#[derive(Debug)]
pub enum ApiError {
    Rejected(Rejection),
    NotFound(String),
    BadRequest(String),
    /// A collaborator (indexer, transport) failed
    Upstream(String),
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        ApiError::Rejected(rejection)
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        ApiError::Rejected(error.into())
    }
}

pub fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::ClaimNotFound(_)
        | EngineError::LoanNotFound(_)
        | EngineError::AuctionNotFound(_) => return StatusCode::NOT_FOUND,
        EngineError::Unauthorized { .. } => return StatusCode::FORBIDDEN,
        _ => {}
    }

    match error.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::StateConflict => StatusCode::CONFLICT,
        ErrorKind::Economic => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Consistency => StatusCode::OK,
        ErrorKind::Transport => StatusCode::BAD_GATEWAY,
        ErrorKind::SystemicRisk | ErrorKind::Oracle => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
    snapshot: StateSnapshot,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Rejected(Rejection { error, snapshot }) => (
                status_for(&error),
                ErrorBody {
                    error: error.to_string(),
                    kind: error.kind().as_str(),
                    snapshot,
                },
            ),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: format!("{} not found", what),
                    kind: ErrorKind::Validation.as_str(),
                    snapshot: StateSnapshot::None,
                },
            ),
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message,
                    kind: ErrorKind::Validation.as_str(),
                    snapshot: StateSnapshot::None,
                },
            ),
            ApiError::Upstream(message) => {
                warn!(error = %message, "Upstream collaborator failed");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorBody {
                        error: message,
                        kind: "upstream",
                        snapshot: StateSnapshot::None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&EngineError::ClaimNotFound("c".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&EngineError::AuctionAlreadySettled("a".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&EngineError::CircuitBreakerTripped),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&EngineError::BorrowerBlacklisted("0xa".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&EngineError::Unauthorized {
                actor: "m".into(),
                action: "resume".into()
            }),
            StatusCode::FORBIDDEN
        );
    }
}
