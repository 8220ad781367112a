//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::http::HeaderName;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::console::Console;
use crate::session::Session;

/// Shared application state for the console server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Validated name of the response header carrying the next command.
    pub command_header: HeaderName,
    /// The single agent session. Held for the whole cycle, which serializes
    /// cycles: a second request waits here before its envelope is decoded.
    pub session: Arc<Mutex<Session>>,
    /// Handle to the operator console task.
    pub console: Console,
    /// Number of cycles started since launch.
    pub cycles: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: Config, console: Console, autocomplete: bool) -> Result<Self, String> {
        let command_header = config.command_header()?;
        let autocomplete = autocomplete || config.server.autocomplete_on_start;
        Ok(Self {
            config: Arc::new(config),
            command_header,
            session: Arc::new(Mutex::new(Session::new(autocomplete))),
            console,
            cycles: Arc::new(AtomicU64::new(0)),
        })
    }
}
