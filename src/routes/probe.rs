//! Liveness probe.

use axum::extract::State;
use axum::response::Html;

use crate::AppState;

/// `GET /` (any path): returns the stock acknowledgment markup.
///
/// No session state is touched, so probes never interfere with a cycle.
pub async fn probe(State(state): State<AppState>) -> Html<String> {
    Html(state.config.server.acknowledgement.clone())
}
