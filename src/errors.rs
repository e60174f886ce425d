use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Concurrent modification of {0}")]
    ConcurrentModification(Uuid),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn db_error(err: sea_orm::error::DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// Errors worth retrying at the orchestration layer. Auth and validation
    /// failures are final by contract; so is an invalid transition.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::ExternalServiceError(_))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_) | ServiceError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::AuthError(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::InvalidTransition(_) => StatusCode::CONFLICT,
            ServiceError::ConcurrentModification(_) => StatusCode::CONFLICT,
            ServiceError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn category(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "Not Found",
            ServiceError::ValidationError(_) | ServiceError::BadRequest(_) => "Bad Request",
            ServiceError::AuthError(_) => "Unauthorized",
            ServiceError::Forbidden(_) => "Forbidden",
            ServiceError::InvalidTransition(_) | ServiceError::ConcurrentModification(_) => {
                "Conflict"
            }
            ServiceError::ExternalServiceError(_) => "Bad Gateway",
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                "Internal Server Error"
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Do not leak database internals to clients.
        let message = match &self {
            ServiceError::DatabaseError(_) => "database operation failed".to_string(),
            other => other.to_string(),
        };
        let body = ErrorResponse {
            error: self.category().to_string(),
            message,
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(ServiceError::ExternalServiceError("courier down".into()).is_retryable());
        assert!(!ServiceError::AuthError("bad signature".into()).is_retryable());
        assert!(!ServiceError::ValidationError("empty cart".into()).is_retryable());
        assert!(!ServiceError::InvalidTransition("delivered -> unpaid".into()).is_retryable());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ServiceError::NotFound("order".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ConcurrentModification(Uuid::new_v4()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ExternalServiceError("gateway".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
