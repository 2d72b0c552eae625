//! Tail engine: follow log files and emit appended lines.
//!
//! # Data Flow
//! ```text
//! start_watch(path)
//!     → stat (NotFound / NotAFile), remember EOF offset and file identity
//!     → spawn one task per watch
//!         wake on notify event or poll tick
//!         → follower.rs (stat, detect truncation/replacement, read new bytes)
//!         → complete lines → bounded channel → subscriber
//! stop_watch(id)
//!     → remove handle, cancel task (drops notify watcher)
//! ```
//!
//! # Design Decisions
//! - No replay: reading starts at the end of file
//! - Change notification is an accelerator; the poll tick is the guarantee
//! - Partial lines are held until their newline arrives
//! - Closing the channel is the teardown signal in both directions

pub mod engine;
pub mod follower;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use uuid::Uuid;

pub use engine::{LineReceiver, TailEngine};
pub use follower::Follower;

/// Opaque watch identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(Uuid);

impl WatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for WatchId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Errors that can occur in tail operations.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("Log file '{}' not found", .0.display())]
    NotFound(PathBuf),

    #[error("Log file '{}' is not a file", .0.display())]
    NotAFile(PathBuf),

    #[error("Watcher with the id '{0}' not found")]
    WatchNotFound(WatchId),

    #[error("IO failure on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TailError {
    pub fn kind(&self) -> &'static str {
        match self {
            TailError::NotFound(_) | TailError::WatchNotFound(_) => "NotFoundError",
            TailError::NotAFile(_) => "NotAFileError",
            TailError::Io { .. } => "IOFailure",
        }
    }
}

/// Result type for tail operations.
pub type TailResult<T> = Result<T, TailError>;
