//! Small helpers shared across modules.

use std::borrow::Cow;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// Expand a leading `~` to `$HOME` in an operator-local path.
///
/// - `"~"` → `"/home/user"`
/// - `"~/loot/a.txt"` → `"/home/user/loot/a.txt"`
/// - Anything else passes through unchanged.
pub fn expand_tilde(path: &str) -> Cow<'_, str> {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Cow::Owned(format!("{}{}", home, &path[1..]));
        }
    }
    Cow::Borrowed(path)
}

/// Operator-local path with `~` expanded.
pub fn local_path(path: &str) -> PathBuf {
    PathBuf::from(expand_tilde(path).as_ref())
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
