//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! API listener
//!     → server.rs (Axum router, middleware)
//!     → logs.rs (ingest entries, open/close sinks)
//!     → levels.rs (threshold CRUD, applied to live sinks)
//!     → response.rs (envelope, error → status)
//!
//! Socket listener
//!     → websocket.rs (upgrade, subscription loop)
//! ```

pub mod levels;
pub mod logs;
pub mod response;
pub mod server;
pub mod websocket;

pub use response::{ApiError, ApiResult, Envelope};
pub use server::{api_router, socket_router, AppState, X_REQUEST_ID};
