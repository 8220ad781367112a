//! HTTP and HTTPS listeners for the agent channel.
//!
//! Plain HTTP goes through `axum::serve`. With `--ssl` each accepted socket
//! is wrapped by the rustls acceptor and driven by a hyper HTTP/1 connection.
//! Both stop as soon as the shutdown token fires; in-flight cycles are
//! dropped rather than drained, since one may be parked on operator input.

use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Serve `app` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    tls: Option<TlsAcceptor>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    match tls {
        None => {
            tokio::select! {
                result = axum::serve(listener, app).into_future() => result,
                () = shutdown.cancelled() => Ok(()),
            }
        }
        Some(acceptor) => serve_tls(listener, app, acceptor, shutdown).await,
    }
}

async fn serve_tls(
    listener: TcpListener,
    app: Router,
    acceptor: TlsAcceptor,
    shutdown: CancellationToken,
) -> io::Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    // Per-connection accept errors (e.g. EMFILE) must not end the loop.
                    warn!("Accept failed: {e}");
                    continue;
                }
            },
            () = shutdown.cancelled() => return Ok(()),
        };
        tokio::spawn(handle_tls_connection(
            stream,
            peer,
            acceptor.clone(),
            app.clone(),
            shutdown.clone(),
        ));
    }
}

async fn handle_tls_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    app: Router,
    shutdown: CancellationToken,
) {
    let tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(e) => {
            debug!(%peer, "TLS handshake failed: {e}");
            return;
        }
    };
    info!(%peer, "TLS connection established");

    let service = TowerToHyperService::new(app);
    let connection = http1::Builder::new().serve_connection(TokioIo::new(tls), service);
    tokio::select! {
        result = connection => {
            if let Err(e) = result {
                debug!(%peer, "Connection closed with error: {e}");
            }
        }
        () = shutdown.cancelled() => {}
    }
}
