//! Per-process session state for the single connected agent.
//!
//! Holds the agent's last reported working directory (which drives the
//! prompt), the autocomplete vocabulary, and the flag that turns the next
//! cycle into an implicit vocabulary request.

use crate::envelope::{Envelope, EnvelopeKind, Tone};

/// Payload text selected for display on the operator console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub text: String,
    pub tone: Tone,
}

#[derive(Debug, Default)]
pub struct Session {
    current_directory: String,
    vocabulary: Vec<String>,
    autocomplete_pending: bool,
}

impl Session {
    pub fn new(autocomplete_pending: bool) -> Self {
        Self {
            autocomplete_pending,
            ..Self::default()
        }
    }

    pub fn current_directory(&self) -> &str {
        &self.current_directory
    }

    /// Last vocabulary reported by the agent, in the order it was sent.
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn autocomplete_pending(&self) -> bool {
        self.autocomplete_pending
    }

    /// Schedule a vocabulary refresh for the next cycle.
    pub fn request_autocomplete(&mut self) {
        self.autocomplete_pending = true;
    }

    /// Read and clear the pending flag.
    pub(crate) fn take_autocomplete_pending(&mut self) -> bool {
        std::mem::take(&mut self.autocomplete_pending)
    }

    /// Operator prompt for the current directory.
    pub fn prompt(&self) -> String {
        format!("PS {}> ", self.current_directory)
    }

    /// Vocabulary entries starting with `prefix`.
    pub fn completions<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        completions(&self.vocabulary, prefix)
    }

    /// Fold one envelope into the session and decide what, if anything, the
    /// operator should see.
    ///
    /// Payloads equal to the reported working directory are the agent echoing
    /// its prompt and are suppressed. Vocabulary envelopes are never shown.
    pub fn observe(&mut self, envelope: &Envelope) -> Option<Surface> {
        if envelope.kind == EnvelopeKind::AutocompleteResult {
            self.vocabulary = envelope
                .payload
                .split_whitespace()
                .map(str::to_string)
                .collect();
            if let Some(pwd) = &envelope.working_directory {
                self.current_directory = pwd.trim().to_string();
            }
            return None;
        }

        self.current_directory = envelope.directory_source().trim().to_string();

        let tone = envelope.kind.tone()?;
        if envelope.transferred_file.is_some() || envelope.payload.trim().is_empty() {
            return None;
        }
        let echoes_prompt = envelope
            .working_directory
            .as_deref()
            .is_some_and(|pwd| pwd.trim() == envelope.payload.trim());
        if echoes_prompt {
            return None;
        }

        Some(Surface {
            text: envelope.payload.clone(),
            tone,
        })
    }
}

/// Entries of `vocabulary` starting with `prefix`, in vocabulary order.
pub fn completions<'a>(
    vocabulary: &'a [String],
    prefix: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    vocabulary
        .iter()
        .map(String::as_str)
        .filter(move |word| word.starts_with(prefix))
}
