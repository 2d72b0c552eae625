//! Backing file layout.

use std::path::{Path, PathBuf};

use crate::config::PathsConfig;
use crate::sinks::{Namespace, SinkError, SinkResult};
use crate::store::MAX_ENTITY_NAME_LEN;

/// Resolves `(namespace, entity)` to `<namespace dir>/<entity>.log`.
#[derive(Debug, Clone)]
pub struct LogPaths {
    services_dir: PathBuf,
    requests_dir: PathBuf,
}

impl LogPaths {
    pub fn new(services_dir: impl Into<PathBuf>, requests_dir: impl Into<PathBuf>) -> Self {
        Self {
            services_dir: services_dir.into(),
            requests_dir: requests_dir.into(),
        }
    }

    pub fn from_config(config: &PathsConfig) -> Self {
        Self::new(&config.services_dir, &config.requests_dir)
    }

    pub fn dir(&self, namespace: Namespace) -> &Path {
        match namespace {
            Namespace::Service => &self.services_dir,
            Namespace::Request => &self.requests_dir,
        }
    }

    /// Path of the backing file, after validating the entity name.
    pub fn sink_path(&self, namespace: Namespace, entity: &str) -> SinkResult<PathBuf> {
        validate_entity_name(entity)?;
        Ok(self.dir(namespace).join(format!("{}.log", entity)))
    }
}

/// Reject names that would not map to a single file inside the namespace directory.
pub fn validate_entity_name(name: &str) -> SinkResult<()> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.chars().count() > MAX_ENTITY_NAME_LEN {
        "longer than 128 characters"
    } else if name == "." || name == ".." {
        "reserved path component"
    } else if name.contains(['/', '\\', '\0']) {
        "contains a path separator or NUL"
    } else {
        return Ok(());
    };

    Err(SinkError::InvalidEntityName {
        name: name.to_string(),
        reason,
    })
}
