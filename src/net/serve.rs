//! Serve a router on a bound listener, with or without TLS.

use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Grace period for in-flight requests once shutdown is signalled.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve `router` until the shutdown signal fires.
pub async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    tls: Option<RustlsConfig>,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;

    match tls {
        None => {
            tracing::info!(listener = name, address = %addr, "Listening (plain)");
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.recv().await;
                })
                .await?;
        }
        Some(tls) => {
            tracing::info!(listener = name, address = %addr, "Listening (TLS)");
            let handle = Handle::new();
            let signal = handle.clone();
            tokio::spawn(async move {
                let _ = shutdown.recv().await;
                signal.graceful_shutdown(Some(DRAIN_TIMEOUT));
            });

            axum_server::from_tcp_rustls(listener.into_std()?, tls)
                .handle(handle)
                .serve(router.into_make_service())
                .await?;
        }
    }

    tracing::info!(listener = name, "Listener stopped");
    Ok(())
}
