//! API error handling for consistent JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::protocol::codes;
use crate::session::SessionError;

/// API error type that converts to the protocol's JSON error envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::UnknownSession(_) => {
                Self::new(StatusCode::NOT_FOUND, codes::UNKNOWN_SESSION, message)
            }
            SessionError::SequenceMismatch { .. } => {
                Self::new(StatusCode::CONFLICT, codes::SEQUENCE_MISMATCH, message)
            }
            SessionError::UnsupportedType(_) => {
                Self::new(StatusCode::BAD_REQUEST, codes::UNSUPPORTED_TYPE, message)
            }
            SessionError::TooLarge { .. } => {
                Self::new(StatusCode::BAD_REQUEST, codes::TOO_LARGE, message)
            }
            SessionError::FinalizeFailed(_) => {
                Self::new(StatusCode::BAD_GATEWAY, codes::FINALIZE_FAILED, message)
            }
            SessionError::Storage(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, codes::STORAGE, message)
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_mapping() {
        let err = ApiError::from(SessionError::UnknownSession("x".to_string()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, codes::UNKNOWN_SESSION);

        let err = ApiError::from(SessionError::SequenceMismatch { expected: 1, got: 3 });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, codes::SEQUENCE_MISMATCH);

        let err = ApiError::from(SessionError::FinalizeFailed("boom".to_string()));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }
}
