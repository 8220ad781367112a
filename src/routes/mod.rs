//! HTTP route handlers.
//!
//! The agent may use any path. `GET` is a liveness probe; `POST` carries one
//! envelope and runs one cycle. The cycle handler applies the body size cap
//! itself so an oversized envelope still gets a next command.

pub mod cycle;
pub mod probe;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the agent-facing router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(probe::probe).post(cycle::cycle))
        .route("/{*path}", get(probe::probe).post(cycle::cycle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
