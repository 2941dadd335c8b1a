//! Error-to-response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use aaq_core::Error;

/// Result alias for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Wrapper turning core errors into structured HTTP responses
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) | Error::ContentQuotaExceeded { .. } => StatusCode::FORBIDDEN,
            Error::NotFound(_) | Error::TraceNotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::Validation(_) | Error::EmbeddingRejected(_) | Error::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            Error::UpstreamUnavailable(_) | Error::CircuitBreakerOpen => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Database(_) | Error::Cache(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, "request rejected");
        }
        let body = json!({
            "error_code": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError(Error::Unauthenticated("x".into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError(Error::Forbidden("x".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError(Error::QuotaExceeded { workspace_id: 1 }).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError(Error::AlreadyExists("x".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(Error::Validation("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(Error::Timeout("x".into())).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
