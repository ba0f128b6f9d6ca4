// Shared HTTP response types and the plain HTTP routes.

use axum::Json;
use axum::response::IntoResponse;

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    // Human-readable error string for consistent JSON error responses.
    pub error: String,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
