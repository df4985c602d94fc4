// src/routes/health.rs
//! Liveness endpoints for the KitchenSights API.
//!
//! `/health` is used by container orchestrators and CI pipelines to verify
//! that the service is up; `/` identifies the application. It is a sibling
//! module in the `routes` directory and follows the Explicit Module Boundary
//! Pattern (EMBP):
//! - Internal to this file: endpoint handlers and their response types
//! - Exports to the gateway (`mod.rs`): a subrouter containing both routes

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// JSON response body for the `/` endpoint.
#[derive(Serialize)]
struct RootResponse {
    status: &'static str,
    app: &'static str,
}

/// Handle `GET /health`.
///
/// Does not touch the database.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok",
        app: "kitchensights",
    })
}

/// Create a subrouter containing the `/health` and `/` routes.
///
/// Generic over the application state so it merges cleanly with the gateway
/// router, whatever the state type (e.g., `(PgPool, Config)`).
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/", get(root))
}
