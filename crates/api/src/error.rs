//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use projections::ProjectionError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Saga service error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        metrics::counter!("api_errors_total", "status" => status.as_u16().to_string()).increment(1);
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::NotFound { .. } => StatusCode::NOT_FOUND,
        SagaError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        SagaError::Conflict(_) | SagaError::StaleWrite(_) => StatusCode::CONFLICT,
        SagaError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SagaError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SagaError::Internal(_) => {
            tracing::error!(error = %err, "internal saga error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    fn status_of(err: SagaError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn saga_errors_map_to_statuses() {
        assert_eq!(status_of(SagaError::not_found("Order", 1)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(SagaError::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(SagaError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(SagaError::StaleWrite("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(SagaError::UpstreamUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(SagaError::InsufficientStock {
                product_id: ProductId::new(10),
                requested: 5,
                available: 1,
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(SagaError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
