//! # AAQ Server
//!
//! Axum HTTP surface over the `aaq-core` services. The router is exposed so
//! integration tests can drive it with in-memory backends via
//! `tower::ServiceExt::oneshot`.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Router;
use std::time::Duration;

/// Enforce the overall request deadline; expiry surfaces 504
#[must_use]
pub fn with_request_deadline(router: Router, deadline: Duration) -> Router {
    router.layer(axum::middleware::from_fn(
        move |req: axum::extract::Request, next: axum::middleware::Next| async move {
            match tokio::time::timeout(deadline, next.run(req)).await {
                Ok(response) => response,
                Err(_) => (
                    StatusCode::GATEWAY_TIMEOUT,
                    axum::Json(serde_json::json!({
                        "error_code": "timeout",
                        "message": "request deadline exceeded",
                    })),
                )
                    .into_response(),
            }
        },
    ))
}
