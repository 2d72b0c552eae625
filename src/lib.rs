//! Log relay: durable per-entity log sinks with live websocket tails.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌───────────────────────────────────────────────────────┐
//!                  │                       LOG RELAY                        │
//!                  │                                                        │
//!   POST /v1/logs  │  ┌─────────┐   ┌──────────┐   ┌───────────────────┐   │
//!  ────────────────┼─▶│  http   │──▶│ dispatch │──▶│  sinks registry   │───┼──▶ services/<name>.log
//!                  │  │  (api)  │   └──────────┘   │ threshold filter  │───┼──▶ requests/<id>.log
//!                  │  └────┬────┘                  └─────────▲─────────┘   │
//!                  │       │ levels CRUD                     │ thresholds  │
//!                  │       ▼                                 │             │
//!                  │  ┌──────────┐                           │             │
//!                  │  │  store   │───────────────────────────┘             │
//!                  │  └──────────┘                                         │
//!                  │                                                        │
//!   ws subscriber  │  ┌─────────┐   ┌──────────┐   ┌───────────────────┐   │
//!  ◀───────────────┼──│  http   │◀──│ gateway  │◀──│   tail engine     │◀──┼─── file growth
//!                  │  │(socket) │   │ liveness │   │ notify + polling  │   │
//!                  │  └─────────┘   └──────────┘   └───────────────────┘   │
//!                  │                                                        │
//!                  │  config · observability · lifecycle · net              │
//!                  └───────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod dispatch;
pub mod gateway;
pub mod severity;
pub mod sinks;
pub mod store;
pub mod tail;

// Transport
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::RelayConfig;
pub use dispatch::{DispatchError, Dispatcher};
pub use lifecycle::{start, RunningRelay, Shutdown};
pub use severity::Severity;
