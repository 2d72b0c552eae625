//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Open store → Build registry, engine, gateway → Start sweep → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Terminate subscribers → Stop listeners → Close sinks
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: store first, then core, then listeners
//! - Shutdown has timeout: tasks that do not drain are abandoned

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start, RunningRelay, StartupError};
