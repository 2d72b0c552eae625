//! Threshold store: durable `(entity name -> severity threshold)` records.
//!
//! # Data Flow
//! ```text
//! HTTP config routes
//!     → validate (name required, ≤128 chars, level valid)
//!     → ThresholdStore::upsert_threshold
//!     → SinkRegistry::apply_threshold (same request)
//!
//! SinkRegistry::ensure_sink
//!     → ThresholdStore::get_threshold(entity | __REQUEST__)
//!     → fallback: warn
//! ```
//!
//! # Design Decisions
//! - Trait seam so the registry never depends on a concrete backend
//! - Listing is ordered by entity name
//! - Validation lives here so every backend enforces the same rules

pub mod json;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::severity::{Severity, SeverityError};

pub use json::JsonThresholdStore;

/// Entity key whose threshold applies to every request sink.
pub const REQUEST_DEFAULT_KEY: &str = "__REQUEST__";

/// Longest accepted entity name.
pub const MAX_ENTITY_NAME_LEN: usize = 128;

/// A persisted threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRecord {
    pub entity_name: String,
    pub level: Severity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors that can occur in threshold store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required parameter was missing or empty.
    #[error("Parameter '{0}' not set")]
    RequiredParameter(&'static str),

    /// A parameter exceeded its maximum length.
    #[error("Parameter '{field}' can only be {max} characters long")]
    TooLong { field: &'static str, max: usize },

    #[error(transparent)]
    InvalidLevel(#[from] SeverityError),

    /// No record exists for the entity.
    #[error("Log level for '{0}' not found")]
    NotFound(String),

    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::RequiredParameter(_) => "RequiredParameterNotSetError",
            StoreError::TooLong { .. } => "ParameterTooLongError",
            StoreError::InvalidLevel(e) => e.kind(),
            StoreError::NotFound(_) => "NotFoundError",
            StoreError::Io(_) | StoreError::Serialization(_) => "IOFailure",
        }
    }

    /// True for errors caused by caller input rather than the backend.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::RequiredParameter(_) | StoreError::TooLong { .. } | StoreError::InvalidLevel(_)
        )
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable configuration of per-entity thresholds.
#[async_trait]
pub trait ThresholdStore: Send + Sync {
    /// Look up the threshold configured for `entity`.
    async fn get_threshold(&self, entity: &str) -> StoreResult<Option<ThresholdRecord>>;

    /// All records, ordered by entity name.
    async fn list_thresholds(&self) -> StoreResult<Vec<ThresholdRecord>>;

    /// Insert or update the threshold for `entity`.
    async fn upsert_threshold(&self, entity: &str, level: Severity) -> StoreResult<ThresholdRecord>;

    /// Remove the record for `entity`, returning it.
    async fn delete_threshold(&self, entity: &str) -> StoreResult<ThresholdRecord>;
}

/// Validate raw upsert input and return the parsed pair.
pub fn validate_upsert(entity: Option<&str>, level: Option<&str>) -> StoreResult<(String, Severity)> {
    let entity = validate_entity(entity)?;
    let level = match level {
        Some(level) if !level.is_empty() => level.parse::<Severity>()?,
        _ => return Err(StoreError::RequiredParameter("level")),
    };
    Ok((entity, level))
}

fn validate_entity(entity: Option<&str>) -> StoreResult<String> {
    match entity {
        Some(entity) if !entity.is_empty() => {
            if entity.chars().count() > MAX_ENTITY_NAME_LEN {
                return Err(StoreError::TooLong {
                    field: "service",
                    max: MAX_ENTITY_NAME_LEN,
                });
            }
            Ok(entity.to_string())
        }
        _ => Err(StoreError::RequiredParameter("service")),
    }
}
