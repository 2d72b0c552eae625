//! In-memory threshold store with optional JSON file persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::severity::Severity;
use crate::store::{validate_upsert, StoreError, StoreResult, ThresholdRecord, ThresholdStore};

/// Threshold store backed by an ordered map.
///
/// When a persistence path is set, the whole map is rewritten to that file
/// after every mutation and read back by [`JsonThresholdStore::open`].
#[derive(Debug, Default)]
pub struct JsonThresholdStore {
    records: RwLock<BTreeMap<String, ThresholdRecord>>,
    persistence_path: Option<PathBuf>,
}

impl JsonThresholdStore {
    /// Create an empty, memory-only store.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed store, loading existing records if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut records = BTreeMap::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<ThresholdRecord> = serde_json::from_slice(&bytes)?;
                for record in list {
                    records.insert(record.entity_name.clone(), record);
                }
                tracing::info!(path = %path.display(), count = records.len(), "Loaded thresholds");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "Threshold file not found, starting empty");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            records: RwLock::new(records),
            persistence_path: Some(path),
        })
    }

    async fn persist(&self, records: &BTreeMap<String, ThresholdRecord>) -> StoreResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let list: Vec<&ThresholdRecord> = records.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl ThresholdStore for JsonThresholdStore {
    async fn get_threshold(&self, entity: &str) -> StoreResult<Option<ThresholdRecord>> {
        Ok(self.records.read().await.get(entity).cloned())
    }

    async fn list_thresholds(&self) -> StoreResult<Vec<ThresholdRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn upsert_threshold(&self, entity: &str, level: Severity) -> StoreResult<ThresholdRecord> {
        let (entity, level) = validate_upsert(Some(entity), Some(level.as_str()))?;

        let mut records = self.records.write().await;
        let now = Utc::now();
        let record = match records.get(&entity) {
            Some(existing) => ThresholdRecord {
                level,
                updated_at: now,
                ..existing.clone()
            },
            None => ThresholdRecord {
                entity_name: entity.clone(),
                level,
                created_at: now,
                updated_at: now,
            },
        };
        let previous = records.insert(entity, record.clone());

        if let Err(e) = self.persist(&records).await {
            // Keep memory and disk in agreement.
            match previous {
                Some(previous) => records.insert(previous.entity_name.clone(), previous),
                None => records.remove(&record.entity_name),
            };
            return Err(e);
        }
        Ok(record)
    }

    async fn delete_threshold(&self, entity: &str) -> StoreResult<ThresholdRecord> {
        let mut records = self.records.write().await;
        let removed = records
            .remove(entity)
            .ok_or_else(|| StoreError::NotFound(entity.to_string()))?;

        if let Err(e) = self.persist(&records).await {
            records.insert(removed.entity_name.clone(), removed);
            return Err(e);
        }
        Ok(removed)
    }
}
