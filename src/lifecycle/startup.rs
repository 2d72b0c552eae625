//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the threshold store and build the sink registry
//! - Build the tail engine and subscription gateway
//! - Start the liveness sweep
//! - Bind the API and socket listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)
//! - Shutdown order: terminate subscribers, stop listeners, close sinks

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{RelayConfig, TlsConfig};
use crate::dispatch::Dispatcher;
use crate::gateway::{LivenessSweep, SubscriptionGateway};
use crate::http::{api_router, socket_router, AppState};
use crate::lifecycle::{signals, Shutdown};
use crate::net;
use crate::sinks::{LogPaths, Namespace, SinkRegistry};
use crate::store::{JsonThresholdStore, StoreError, ThresholdStore};
use crate::tail::TailEngine;

/// Upper bound on waiting for each background task at shutdown.
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open threshold store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to create log directory '{path}': {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind {listener} listener on '{address}': {source}")]
    Bind {
        listener: &'static str,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load TLS for {listener} listener: {source}")]
    Tls {
        listener: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// A started relay.
pub struct RunningRelay {
    api_addr: SocketAddr,
    socket_addr: SocketAddr,
    registry: Arc<SinkRegistry>,
    gateway: Arc<SubscriptionGateway>,
    signal: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningRelay {
    /// Address the REST API is listening on.
    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    /// Address the websocket listener is listening on.
    pub fn socket_addr(&self) -> SocketAddr {
        self.socket_addr
    }

    pub fn registry(&self) -> &Arc<SinkRegistry> {
        &self.registry
    }

    pub fn gateway(&self) -> &Arc<SubscriptionGateway> {
        &self.gateway
    }

    /// Run until SIGINT/SIGTERM, then shut down.
    pub async fn run_until_signal(self) {
        signals::shutdown_signal().await;
        self.shutdown().await;
    }

    /// Ordered shutdown: subscribers, listeners and sweep, then sinks.
    pub async fn shutdown(self) {
        tracing::info!("Relay shutting down");

        let terminated = self.gateway.terminate_all();
        self.signal.trigger();

        for task in self.tasks {
            if tokio::time::timeout(TASK_DRAIN_TIMEOUT, task).await.is_err() {
                tracing::warn!("Background task did not stop in time");
            }
        }

        self.registry.close_all().await;
        tracing::info!(terminated_subscribers = terminated, "Shutdown complete");
    }
}

/// Build every subsystem from `config` and start serving.
pub async fn start(config: RelayConfig) -> Result<RunningRelay, StartupError> {
    let store: Arc<dyn ThresholdStore> = match &config.store.path {
        Some(path) => Arc::new(JsonThresholdStore::open(path).await?),
        None => Arc::new(JsonThresholdStore::in_memory()),
    };

    let paths = LogPaths::from_config(&config.paths);
    for namespace in [Namespace::Service, Namespace::Request] {
        let dir = paths.dir(namespace);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| StartupError::Directory {
                path: dir.display().to_string(),
                source,
            })?;
    }

    let registry = Arc::new(SinkRegistry::new(
        paths.clone(),
        store.clone(),
        config.sinks.echo_to_console,
    ));
    let engine = Arc::new(TailEngine::new(&config.tail));
    let gateway = Arc::new(SubscriptionGateway::new(engine, paths));

    let state = AppState {
        registry: registry.clone(),
        dispatcher: Dispatcher::new(registry.clone()),
        store,
        gateway: gateway.clone(),
    };

    let signal = Shutdown::new();
    let mut tasks = Vec::new();

    let sweep = LivenessSweep::new(gateway.clone(), &config.liveness);
    tasks.push(tokio::spawn(sweep.run(signal.subscribe())));

    let api_listener = bind("api", &config.server.bind_address).await?;
    let socket_listener = bind("socket", &config.socket.bind_address).await?;
    let api_addr = local_addr("api", &api_listener, &config.server.bind_address)?;
    let socket_addr = local_addr("socket", &socket_listener, &config.socket.bind_address)?;

    let api_tls = load_tls("api", config.server.tls.as_ref()).await?;
    let socket_tls = load_tls("socket", config.socket.tls.as_ref()).await?;

    tasks.push(spawn_listener(
        "api",
        api_listener,
        api_router(&config.server, state.clone()),
        api_tls,
        &signal,
    ));
    tasks.push(spawn_listener(
        "socket",
        socket_listener,
        socket_router(state),
        socket_tls,
        &signal,
    ));

    tracing::info!(
        api_address = %api_addr,
        socket_address = %socket_addr,
        services_dir = %config.paths.services_dir,
        requests_dir = %config.paths.requests_dir,
        "Relay started"
    );

    Ok(RunningRelay {
        api_addr,
        socket_addr,
        registry,
        gateway,
        signal,
        tasks,
    })
}

async fn bind(listener: &'static str, address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            listener,
            address: address.to_string(),
            source,
        })
}

fn local_addr(
    listener: &'static str,
    bound: &TcpListener,
    address: &str,
) -> Result<SocketAddr, StartupError> {
    bound.local_addr().map_err(|source| StartupError::Bind {
        listener,
        address: address.to_string(),
        source,
    })
}

async fn load_tls(
    listener: &'static str,
    tls: Option<&TlsConfig>,
) -> Result<Option<RustlsConfig>, StartupError> {
    match tls {
        Some(tls) => net::load_tls_config(tls)
            .await
            .map(Some)
            .map_err(|source| StartupError::Tls { listener, source }),
        None => Ok(None),
    }
}

fn spawn_listener(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    tls: Option<RustlsConfig>,
    signal: &Shutdown,
) -> JoinHandle<()> {
    let shutdown = signal.subscribe();
    tokio::spawn(async move {
        if let Err(e) = net::serve(name, listener, router, tls, shutdown).await {
            tracing::error!(listener = name, error = %e, "Listener failed");
        }
    })
}
