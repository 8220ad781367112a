#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::unused_async)]

//! psconsole library — the operator side of a single-agent HTTP(S) shell.
//!
//! - `envelope` — inbound envelope decoding, outbound command encoding
//! - `session` — working directory, autocomplete flag and vocabulary
//! - `command` — operator line parsing (`upload` / `download` / shell)
//! - `transfer` — upload encoding and atomic download persistence
//! - `dispatch` — one cycle: envelope in, body and next command out
//! - `console` — operator terminal task
//! - `certificate` — self-signed credential lifecycle for `--ssl`
//! - `config` — configuration loading
//! - `routes` — axum handlers
//! - `transport` — plain and TLS listeners

pub mod certificate;
pub mod command;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod envelope;
pub mod routes;
pub mod session;
pub mod state;
pub mod transfer;
pub mod transport;
pub mod util;

// Re-export key types at crate root for convenience.
pub use certificate::CertificateStore;
pub use config::Config;
pub use console::Console;
pub use dispatch::{Operator, Reply};
pub use envelope::{Envelope, EnvelopeKind};
pub use session::Session;
pub use state::AppState;
