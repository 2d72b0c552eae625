//! Sink subsystem: per-service and per-request log files.
//!
//! # Data Flow
//! ```text
//! write(namespace, entity, correlating id, message, level)
//!     → registry.rs (get-or-create sink, one per key)
//!         → store lookup for the threshold (fallback: warn)
//!         → paths.rs (<namespace dir>/<entity>.log)
//!     → sink.rs (threshold filter, format, append, flush)
//! ```
//!
//! # Design Decisions
//! - Two disjoint namespaces, each with its own directory
//! - Thresholds live in an atomic so reconfiguration never blocks writers
//! - Files are opened in append mode and never truncated
//! - Sinks know nothing about subscribers; tails follow the path

pub mod paths;
pub mod registry;
pub mod sink;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

pub use paths::{validate_entity_name, LogPaths};
pub use registry::SinkRegistry;
pub use sink::Sink;

/// Sink namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Service,
    Request,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Service => "service",
            Namespace::Request => "request",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Entity name cannot be used as a file name.
    #[error("invalid entity name '{name}': {reason}")]
    InvalidEntityName { name: String, reason: &'static str },

    /// Directory creation, open, append or flush failed.
    #[error("IO failure on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sink was closed while the write was in flight.
    #[error("{namespace} sink '{name}' is closed")]
    Closed { namespace: Namespace, name: String },

    /// Threshold lookup failed.
    #[error("threshold lookup failed: {0}")]
    Store(#[from] StoreError),
}

impl SinkError {
    pub fn kind(&self) -> &'static str {
        match self {
            SinkError::InvalidEntityName { .. } => "InvalidEntityNameError",
            SinkError::Io { .. } => "IOFailure",
            SinkError::Closed { .. } => "SinkClosedError",
            SinkError::Store(e) => e.kind(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SinkError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;
