//! Health check HTTP route handlers
//!
//! - `GET /health` - simple liveness check
//! - `GET /health/ready` - readiness check (verifies the database)

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use sqlx::PgPool;

/// Shared state for health check handlers
#[derive(Clone)]
pub struct HealthState {
    /// Database connection pool
    pub db: PgPool,
}

/// Create the health check router
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/ready", get(readiness))
        .with_state(state)
}

/// Liveness probe: the process is up and serving requests
async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe: the database answers a trivial query
async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ready", "database": "connected"})),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "unavailable", "database": e.to_string()})),
        ),
    }
}
