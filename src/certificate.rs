//! Self-signed TLS credential lifecycle for `--ssl`.
//!
//! Credentials live at `<cert_dir>/cacert.pem` and `<cert_dir>/private.pem`.
//! At startup the console checks them once: missing, unreadable or expired
//! (per [`ExpiryPolicy`]) credentials are regenerated, then bound for the
//! rest of the process lifetime. There is no mid-session rotation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

use crate::config::TlsConfig;
use crate::util;

pub const CERT_FILE: &str = "cacert.pem";
pub const KEY_FILE: &str = "private.pem";

/// When a stored certificate counts as expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Expired only on the calendar day of `notAfter` (UTC). A credential is
    /// still reported valid after that day.
    ExactDay,
    /// Expired on or after the calendar day of `notAfter` (UTC).
    #[default]
    OnOrAfter,
}

impl ExpiryPolicy {
    pub fn is_expired(self, not_after: OffsetDateTime, now: OffsetDateTime) -> bool {
        match self {
            Self::ExactDay => now.date() == not_after.date(),
            Self::OnOrAfter => now.date() >= not_after.date(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),
    #[error("invalid PEM in {}: {reason}", path.display())]
    Pem { path: PathBuf, reason: String },
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),
}

/// On-disk credential pair plus the rules for renewing it.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    dir: PathBuf,
    common_name: String,
    validity: time::Duration,
    policy: ExpiryPolicy,
}

impl CertificateStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        common_name: impl Into<String>,
        validity: time::Duration,
        policy: ExpiryPolicy,
    ) -> Self {
        Self {
            dir: dir.into(),
            common_name: common_name.into(),
            validity,
            policy,
        }
    }

    pub fn from_config(config: &TlsConfig) -> Self {
        let secs = i64::try_from(config.validity_secs).unwrap_or(i64::MAX);
        Self::new(
            &config.cert_dir,
            &config.common_name,
            time::Duration::seconds(secs),
            config.expiry_policy,
        )
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(CERT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    pub fn has_valid_credential(&self) -> bool {
        self.has_valid_credential_at(OffsetDateTime::now_utc())
    }

    /// Both files exist, the certificate parses, and it is not expired at `now`.
    pub fn has_valid_credential_at(&self, now: OffsetDateTime) -> bool {
        let (cert_path, key_path) = (self.cert_path(), self.key_path());
        if !cert_path.exists() || !key_path.exists() {
            return false;
        }
        let not_after = match std::fs::read_to_string(&cert_path)
            .map_err(|e| e.to_string())
            .and_then(|pem| CertificateParams::from_ca_cert_pem(&pem).map_err(|e| e.to_string()))
        {
            Ok(params) => params.not_after,
            Err(e) => {
                warn!("Unreadable certificate {}: {e}", cert_path.display());
                return false;
            }
        };
        !self.policy.is_expired(not_after, now)
    }

    /// Write a fresh self-signed certificate and key, replacing any existing pair.
    pub fn generate(&self) -> Result<(), CertificateError> {
        self.generate_at(OffsetDateTime::now_utc())
    }

    pub fn generate_at(&self, now: OffsetDateTime) -> Result<(), CertificateError> {
        let mut params = CertificateParams::new(vec![self.common_name.clone()])?;
        let mut name = DistinguishedName::new();
        name.push(DnType::OrganizationName, "psconsole");
        name.push(DnType::CommonName, self.common_name.as_str());
        params.distinguished_name = name;
        params.not_before = now;
        params.not_after = now + self.validity;
        let not_after = params.not_after;

        let key_pair = KeyPair::generate()?;
        let cert = params.self_signed(&key_pair)?;

        std::fs::create_dir_all(&self.dir).map_err(|source| CertificateError::Io {
            path: self.dir.clone(),
            source,
        })?;
        write_file(&self.cert_path(), cert.pem().as_bytes())?;
        write_file(&self.key_path(), key_pair.serialize_pem().as_bytes())?;
        restrict_permissions(&self.key_path())?;

        info!(
            path = %self.cert_path().display(),
            not_after = %not_after,
            sha256 = %util::sha256_hex(cert.der()),
            "Generated self-signed certificate"
        );
        Ok(())
    }

    /// Regenerate unless the stored pair is valid.
    pub fn ensure(&self) -> Result<(), CertificateError> {
        if self.has_valid_credential() {
            info!("Reusing certificate {}", self.cert_path().display());
            Ok(())
        } else {
            self.generate()
        }
    }

    /// Build a TLS acceptor from the stored pair.
    pub fn acceptor(&self) -> Result<TlsAcceptor, CertificateError> {
        let cert_path = self.cert_path();
        let key_path = self.key_path();
        let cert_pem = read_file(&cert_path)?;
        let key_pem = read_file(&key_path)?;

        let certs = CertificateDer::pem_slice_iter(&cert_pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CertificateError::Pem {
                path: cert_path.clone(),
                reason: e.to_string(),
            })?;
        let Some(leaf) = certs.first() else {
            return Err(CertificateError::Pem {
                path: cert_path,
                reason: "no certificate found".to_string(),
            });
        };
        info!(sha256 = %util::sha256_hex(leaf), "TLS certificate loaded");

        let key = PrivateKeyDer::from_pem_slice(&key_pem).map_err(|e| CertificateError::Pem {
            path: key_path,
            reason: e.to_string(),
        })?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, CertificateError> {
    std::fs::read(path).map_err(|source| CertificateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), CertificateError> {
    std::fs::write(path, contents).map_err(|source| CertificateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), CertificateError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|source| {
        CertificateError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), CertificateError> {
    Ok(())
}
