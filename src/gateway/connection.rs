//! Subscriber connection state machine.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track subscription state (Connecting → Active → Closing → Closed)
//! - Hold the liveness flag flipped by pongs and cleared by the sweep
//! - Carry control signals (ping, terminate) to the socket task

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use tokio::sync::mpsc;

use crate::sinks::Namespace;
use crate::tail::WatchId;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Subscription lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for SubscriptionState {
    fn from(val: u8) -> Self {
        match val {
            0 => SubscriptionState::Connecting,
            1 => SubscriptionState::Active,
            2 => SubscriptionState::Closing,
            _ => SubscriptionState::Closed,
        }
    }
}

/// Instruction from the gateway to the task driving the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Send a liveness probe.
    Ping,
    /// Drop the socket without a close handshake.
    Terminate,
}

/// One subscriber bound to one tail watch.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    namespace: Namespace,
    entity: String,
    watch_id: WatchId,
    alive: AtomicBool,
    state: AtomicU8,
    control: mpsc::UnboundedSender<Control>,
}

impl Connection {
    pub fn new(
        namespace: Namespace,
        entity: &str,
        watch_id: WatchId,
        control: mpsc::UnboundedSender<Control>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            namespace,
            entity: entity.to_string(),
            watch_id,
            alive: AtomicBool::new(true),
            state: AtomicU8::new(SubscriptionState::Connecting as u8),
            control,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn watch_id(&self) -> WatchId {
        self.watch_id
    }

    pub fn state(&self) -> SubscriptionState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Record a pong from the subscriber.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Clear the liveness flag, returning whether it was set.
    pub(crate) fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn activate(&self) -> bool {
        self.transition(SubscriptionState::Connecting, SubscriptionState::Active)
    }

    /// Claim the teardown. Only the first caller gets `true`.
    pub(crate) fn begin_closing(&self) -> bool {
        self.transition(SubscriptionState::Active, SubscriptionState::Closing)
            || self.transition(SubscriptionState::Connecting, SubscriptionState::Closing)
    }

    pub(crate) fn mark_closed(&self) {
        self.state.store(SubscriptionState::Closed as u8, Ordering::Release);
    }

    fn transition(&self, from: SubscriptionState, to: SubscriptionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Send a control signal; ignored once the socket task has gone.
    pub(crate) fn signal(&self, control: Control) {
        let _ = self.control.send(control);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (Connection, mpsc::UnboundedReceiver<Control>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(Namespace::Service, "svc", WatchId::new(), tx), rx)
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn state_machine_closes_once() {
        let (conn, _rx) = connection();
        assert_eq!(conn.state(), SubscriptionState::Connecting);

        assert!(conn.activate());
        assert!(!conn.activate());
        assert_eq!(conn.state(), SubscriptionState::Active);

        assert!(conn.begin_closing());
        assert!(!conn.begin_closing());
        assert_eq!(conn.state(), SubscriptionState::Closing);

        conn.mark_closed();
        assert_eq!(conn.state(), SubscriptionState::Closed);
        assert!(!conn.begin_closing());
    }

    #[test]
    fn liveness_flag() {
        let (conn, mut rx) = connection();
        assert!(conn.is_alive());
        assert!(conn.take_alive());
        assert!(!conn.take_alive());
        conn.mark_alive();
        assert!(conn.is_alive());

        conn.signal(Control::Ping);
        assert_eq!(rx.try_recv().unwrap(), Control::Ping);
    }
}
