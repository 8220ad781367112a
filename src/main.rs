#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # psconsole
//!
//! Operator console for a single remote PowerShell agent that polls over
//! HTTP(S).
//!
//! The agent POSTs an envelope (JSON with base64 fields) to any path; the
//! console shows the result, prompts the operator, and answers with the next
//! command base64-encoded in a response header. `upload` and `download` ride
//! the same channel.
//!
//! ## Usage
//!
//! ```text
//! psconsole <host> <port> [--ssl] [--autocomplete] [--config <path>]
//! ```
//!
//! ## API surface
//!
//! | Method | Path   | Description                                  |
//! |--------|--------|----------------------------------------------|
//! | GET    | any    | Liveness probe, returns the acknowledgement  |
//! | POST   | any    | One cycle: envelope in, next command out     |
//!
//! ## Architecture
//!
//! ```text
//! main.rs          — entry point, CLI, banner, signals, startup
//! config.rs        — TOML + env-var configuration
//! certificate.rs   — self-signed credential for --ssl
//! transport.rs     — plain and TLS listeners
//! routes/
//!   probe.rs       — GET (any path)
//!   cycle.rs       — POST (any path)
//! envelope.rs      — wire envelope codec
//! session.rs       — per-agent state
//! command.rs       — operator line parsing
//! dispatch.rs      — cycle logic
//! transfer.rs      — upload/download file handling
//! console.rs       — operator terminal task
//! ```

use clap::Parser;
use colored::Colorize;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use psconsole::console::Terminal;
use psconsole::{routes, transport, AppState, CertificateStore, Config, Console};

const BANNER: &str = r"
 ____  ____   ____ ___  _   _ ____   ___  _     _____
|  _ \/ ___| / ___/ _ \| \ | / ___| / _ \| |   | ____|
| |_) \___ \| |  | | | |  \| \___ \| | | | |   |  _|
|  __/ ___) | |__| |_| | |\  |___) | |_| | |___| |___
|_|   |____/ \____\___/|_| \_|____/ \___/|_____|_____|
";

/// Operator console for a single HTTP(S) PowerShell agent.
#[derive(Parser)]
#[command(name = "psconsole", version)]
struct Cli {
    /// Listen host.
    host: String,
    /// Listen port.
    port: u16,
    /// Serve over TLS with a self-signed certificate.
    #[arg(long)]
    ssl: bool,
    /// Fetch the agent's PowerShell vocabulary for completion on the first cycle.
    #[arg(long)]
    autocomplete: bool,
    /// Path to TOML config file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    println!("{}", BANNER.yellow());
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    info!("psconsole v{} starting", env!("CARGO_PKG_VERSION"));

    let tls = if cli.ssl {
        let certs = CertificateStore::from_config(&config.tls);
        match certs.ensure().and_then(|()| certs.acceptor()) {
            Ok(acceptor) => Some(acceptor),
            Err(e) => fail(&e.to_string()),
        }
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let terminal = match Terminal::new() {
        Ok(terminal) => terminal,
        Err(e) => fail(&format!("Failed to open the terminal: {e}")),
    };
    let (console, _console_task) = Console::spawn(terminal, shutdown.clone());
    let state = match AppState::new(config, console, cli.autocomplete) {
        Ok(state) => state,
        Err(e) => fail(&e),
    };
    let app = routes::router(state);

    let listener = match TcpListener::bind((cli.host.as_str(), cli.port)).await {
        Ok(listener) => listener,
        Err(e) => fail(&format!("Failed to bind {}:{}: {e}", cli.host, cli.port)),
    };
    let now = OffsetDateTime::now_utc()
        .format(&Rfc2822)
        .unwrap_or_default();
    println!("{now} Server UP - {}:{}", cli.host, cli.port);
    info!(tls = cli.ssl, "Listening on {}:{}", cli.host, cli.port);

    if let Err(e) = transport::serve(listener, app, tls, shutdown).await {
        warn!("Server error: {e}");
    }

    println!(" received, shutting down the web server");
    info!("Goodbye");
    // The console task may be parked in a blocking stdin read, which would
    // stall runtime teardown.
    std::process::exit(0);
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM: {e}");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
    shutdown.cancel();
}

fn fail(message: &str) -> ! {
    eprintln!("{}", format!("[!] {message}").red());
    std::process::exit(1);
}
