//! File transfer sub-protocol layered on the command channel.
//!
//! - **Upload** (operator → agent): the local file is base64-encoded and sent
//!   as the whole response body of the cycle that carries the `upload` command.
//! - **Download** (agent → operator): a `D0WNL04D` envelope carries the file;
//!   it is decoded and written to the operator-local destination.
//!
//! ## Atomicity
//!
//! Downloads are written to a temp file next to the destination and renamed
//! into place, so a failed write never leaves a truncated file behind.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tracing::info;

use crate::envelope::TransferredFile;
use crate::util;

/// Monotonic counter to uniquify temp file names.
static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("source file not found: {}", .0.display())]
    MissingLocalFile(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
}

/// Read a local file and base64-encode it for an upload response body.
pub async fn encode_upload(path: &Path) -> Result<String, TransferError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TransferError::MissingLocalFile(path.to_path_buf())
        } else {
            TransferError::Read {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    info!(
        path = %path.display(),
        size = bytes.len(),
        sha256 = %util::sha256_hex(&bytes),
        "Upload prepared"
    );
    Ok(STANDARD.encode(bytes))
}

/// Decode a transferred file and persist it at its destination.
///
/// Returns the path that was written.
pub async fn persist_download(file: &TransferredFile) -> Result<PathBuf, TransferError> {
    let path = util::local_path(&file.destination);
    let write_error = |reason: String| TransferError::Write {
        path: path.clone(),
        reason,
    };

    let bytes = STANDARD
        .decode(file.content.trim())
        .map_err(|e| write_error(format!("invalid base64 content: {e}")))?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let seq = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_path = parent.join(format!(".psconsole_tmp_{}_{}", std::process::id(), seq));

    if let Err(e) = tokio::fs::write(&temp_path, &bytes).await {
        return Err(write_error(e.to_string()));
    }
    if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(write_error(format!("rename failed: {e}")));
    }

    info!(
        path = %path.display(),
        size = bytes.len(),
        sha256 = %util::sha256_hex(&bytes),
        "Download written"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transferred(destination: &Path, content: &str) -> TransferredFile {
        TransferredFile {
            destination: destination.to_string_lossy().into_owned(),
            content: content.to_string(),
            status: "done".to_string(),
        }
    }

    #[tokio::test]
    async fn test_download_writes_decoded_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("out.bin");
        let written = persist_download(&transferred(&dst, "QUJD")).await.unwrap();
        assert_eq!(written, dst);
        assert_eq!(std::fs::read(&dst).unwrap(), b"ABC");
    }

    #[tokio::test]
    async fn test_download_overwrites_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("out.txt");
        std::fs::write(&dst, "old contents that are longer").unwrap();
        persist_download(&transferred(&dst, "bmV3")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "new");
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_download_missing_directory_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("no/such/dir/out.bin");
        let err = persist_download(&transferred(&dst, "QUJD")).await.unwrap_err();
        assert!(matches!(err, TransferError::Write { .. }));
    }

    #[tokio::test]
    async fn test_download_invalid_base64_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("out.bin");
        let err = persist_download(&transferred(&dst, "!!not base64!!"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Write { .. }));
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("my file.txt");
        let err = encode_upload(&missing).await.unwrap_err();
        assert!(matches!(err, TransferError::MissingLocalFile(p) if p == missing));
    }

    #[tokio::test]
    async fn test_download_then_upload_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("blob.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let encoded = STANDARD.encode(&content);

        persist_download(&transferred(&dst, &encoded)).await.unwrap();
        let uploaded = encode_upload(&dst).await.unwrap();
        assert_eq!(STANDARD.decode(uploaded).unwrap(), content);
    }
}
