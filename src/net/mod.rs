//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Bound TCP listener
//!     → tls.rs (optional rustls config from PEM files)
//!     → serve.rs (axum::serve, or axum-server with TLS)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Listeners are bound by the caller so ephemeral ports can be reported
//! - TLS is optional per listener and handled transparently
//! - Both paths drain on the shared shutdown broadcast

pub mod serve;
pub mod tls;

pub use serve::serve;
pub use tls::load_tls_config;
