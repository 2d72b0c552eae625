//! Subscription gateway: bind live subscribers to tail watches.
//!
//! # Data Flow
//! ```text
//! subscribe(namespace, entity)
//!     → validate entity name, resolve <namespace dir>/<entity>.log
//!     → tail engine start_watch (NotFound / NotAFile → rejected)
//!     → connection.rs (Connecting → Active), registered by ConnectionId
//!     → socket task forwards lines, answers control signals
//!
//! liveness.rs (every interval)
//!     → sweep_once: not alive → terminate, else clear flag and ping
//!
//! release(connection)
//!     → CAS Active → Closing (first caller only)
//!     → stop_watch (errors logged, swallowed) → Closed
//! ```
//!
//! # Design Decisions
//! - One watch per subscriber; subscribers never share a line stream
//! - Teardown is claimed by compare-and-swap so sweep and socket never race
//! - The socket itself stays in the HTTP layer; the gateway only signals it

pub mod connection;
pub mod liveness;

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::observability::metrics;
use crate::sinks::{LogPaths, Namespace, SinkError};
use crate::tail::{LineReceiver, TailEngine, TailError};

pub use connection::{Connection, ConnectionId, Control, SubscriptionState};
pub use liveness::LivenessSweep;

/// Errors that reject a subscription.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    InvalidEntityName(SinkError),

    #[error(transparent)]
    Tail(#[from] TailError),
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidEntityName(e) => e.kind(),
            GatewayError::Tail(e) => e.kind(),
        }
    }
}

/// An accepted subscription, handed to the task that drives the socket.
pub struct Subscription {
    pub connection: Arc<Connection>,
    pub lines: LineReceiver,
    pub control: mpsc::UnboundedReceiver<Control>,
}

/// Outcome of one liveness sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub terminated: usize,
}

pub struct SubscriptionGateway {
    engine: Arc<TailEngine>,
    paths: LogPaths,
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl SubscriptionGateway {
    pub fn new(engine: Arc<TailEngine>, paths: LogPaths) -> Self {
        Self {
            engine,
            paths,
            connections: DashMap::new(),
        }
    }

    /// Start a watch on the entity's log file and register the subscriber.
    pub async fn subscribe(
        &self,
        namespace: Namespace,
        entity: &str,
    ) -> Result<Subscription, GatewayError> {
        let path = self
            .paths
            .sink_path(namespace, entity)
            .map_err(GatewayError::InvalidEntityName)?;

        let (watch_id, lines) = self.engine.start_watch(&path).await?;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(Connection::new(namespace, entity, watch_id, control_tx));
        connection.activate();
        self.connections.insert(connection.id(), connection.clone());
        metrics::record_active_subscriptions(self.connections.len());

        tracing::info!(
            connection_id = %connection.id(),
            watch_id = %watch_id,
            namespace = %namespace,
            entity = %entity,
            "Subscriber connected"
        );

        Ok(Subscription {
            connection,
            lines,
            control: control_rx,
        })
    }

    /// Tear down a subscription. Returns `false` if another path already did.
    pub fn release(&self, connection: &Connection, reason: &'static str) -> bool {
        if !connection.begin_closing() {
            return false;
        }

        self.connections.remove(&connection.id());
        if let Err(e) = self.engine.stop_watch(connection.watch_id()) {
            tracing::warn!(
                connection_id = %connection.id(),
                watch_id = %connection.watch_id(),
                error = %e,
                "Failed to stop watch"
            );
        }
        connection.mark_closed();

        metrics::record_active_subscriptions(self.connections.len());
        metrics::record_subscription_terminated(reason);
        tracing::info!(
            connection_id = %connection.id(),
            namespace = %connection.namespace(),
            entity = %connection.entity(),
            reason,
            "Subscriber released"
        );
        true
    }

    /// Terminate connections that missed the last probe and probe the rest.
    pub fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for connection in self.snapshot() {
            if connection.state() != SubscriptionState::Active {
                continue;
            }
            if connection.take_alive() {
                connection.signal(Control::Ping);
                report.probed += 1;
            } else {
                connection.signal(Control::Terminate);
                if self.release(&connection, "liveness") {
                    report.terminated += 1;
                }
            }
        }

        report
    }

    /// Terminate every connection.
    pub fn terminate_all(&self) -> usize {
        let mut terminated = 0;
        for connection in self.snapshot() {
            connection.signal(Control::Terminate);
            if self.release(&connection, "shutdown") {
                terminated += 1;
            }
        }
        terminated
    }

    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
