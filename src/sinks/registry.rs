//! Sink registry.
//!
//! # Responsibilities
//! - Get-or-create sinks keyed by `(namespace, entity)`
//! - Resolve the initial threshold from the store
//! - Apply runtime threshold changes to live sinks
//! - Close sinks on request and at shutdown
//!
//! # Design Decisions
//! - Each key maps to a shared `OnceCell`: the map insert is atomic and the
//!   async construction runs once, so concurrent first writers share one sink
//! - A failed construction leaves the cell empty; the next caller tries again
//! - `__REQUEST__` thresholds broadcast over a snapshot of the request map

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::observability::metrics;
use crate::severity::Severity;
use crate::sinks::{LogPaths, Namespace, Sink, SinkError, SinkResult};
use crate::store::{ThresholdStore, REQUEST_DEFAULT_KEY};

type SinkSlot = Arc<OnceCell<Arc<Sink>>>;

/// Registry of live sinks in both namespaces.
pub struct SinkRegistry {
    services: DashMap<String, SinkSlot>,
    requests: DashMap<String, SinkSlot>,
    paths: LogPaths,
    store: Arc<dyn ThresholdStore>,
    echo: bool,
}

impl SinkRegistry {
    pub fn new(paths: LogPaths, store: Arc<dyn ThresholdStore>, echo: bool) -> Self {
        Self {
            services: DashMap::new(),
            requests: DashMap::new(),
            paths,
            store,
            echo,
        }
    }

    pub fn paths(&self) -> &LogPaths {
        &self.paths
    }

    fn map(&self, namespace: Namespace) -> &DashMap<String, SinkSlot> {
        match namespace {
            Namespace::Service => &self.services,
            Namespace::Request => &self.requests,
        }
    }

    /// Return the live sink for `(namespace, entity)`, creating it if needed.
    pub async fn ensure_sink(&self, namespace: Namespace, entity: &str) -> SinkResult<Arc<Sink>> {
        let path = self.paths.sink_path(namespace, entity)?;

        // Clone the slot out so no shard lock is held across the await below.
        let slot = self
            .map(namespace)
            .entry(entity.to_string())
            .or_default()
            .value()
            .clone();

        let result = slot
            .get_or_try_init(|| async move {
                let threshold = self.resolve_threshold(namespace, entity).await?;
                let sink = Sink::open(namespace, entity, path, threshold, self.echo).await?;
                sink.write_open_marker().await?;

                metrics::record_sink_opened(namespace);
                tracing::info!(
                    namespace = %namespace,
                    entity = %entity,
                    threshold = %threshold,
                    "Sink created"
                );
                Ok::<_, SinkError>(Arc::new(sink))
            })
            .await;

        match result {
            Ok(sink) => Ok(sink.clone()),
            Err(e) => {
                // Drop the empty slot unless a newer caller already replaced it.
                self.map(namespace)
                    .remove_if(entity, |_, current| Arc::ptr_eq(current, &slot) && !slot.initialized());
                Err(e)
            }
        }
    }

    async fn resolve_threshold(&self, namespace: Namespace, entity: &str) -> SinkResult<Severity> {
        let key = match namespace {
            Namespace::Service => entity,
            Namespace::Request => REQUEST_DEFAULT_KEY,
        };
        let record = self.store.get_threshold(key).await?;
        Ok(record.map(|r| r.level).unwrap_or_default())
    }

    /// Look up a live sink without creating one.
    pub fn get(&self, namespace: Namespace, entity: &str) -> Option<Arc<Sink>> {
        self.map(namespace)
            .get(entity)
            .and_then(|slot| slot.value().get().cloned())
    }

    /// Write an entry, creating the sink on demand.
    ///
    /// A sink closed between lookup and append is resolved again, so a
    /// concurrent `close_sink` only ever costs the writer a fresh sink.
    ///
    /// Returns `Ok(false)` when the entry was below the sink's threshold.
    pub async fn write(
        &self,
        namespace: Namespace,
        entity: &str,
        correlating_id: &str,
        message: &str,
        level: Severity,
    ) -> SinkResult<bool> {
        loop {
            let sink = self.ensure_sink(namespace, entity).await?;
            match sink.append(correlating_id, message, level).await {
                Err(SinkError::Closed { .. }) => {
                    tracing::debug!(namespace = %namespace, entity = %entity, "Sink closed under writer, resolving again");
                }
                result => return result,
            }
        }
    }

    /// Close and forget a sink. No-op if it is not open.
    pub async fn close_sink(&self, namespace: Namespace, entity: &str) -> SinkResult<()> {
        let Some((_, slot)) = self.map(namespace).remove(entity) else {
            return Ok(());
        };
        let Some(sink) = slot.get() else {
            return Ok(());
        };

        let result = sink.close().await;
        metrics::record_sink_closed(namespace);
        tracing::info!(namespace = %namespace, entity = %entity, "Sink closed");
        result
    }

    /// Set the threshold of matching live sinks. Returns how many were updated.
    ///
    /// For the request namespace, [`REQUEST_DEFAULT_KEY`] updates every open
    /// request sink.
    pub fn set_threshold(&self, namespace: Namespace, entity: &str, level: Severity) -> usize {
        let targets: Vec<Arc<Sink>> = match namespace {
            Namespace::Request if entity == REQUEST_DEFAULT_KEY => self
                .requests
                .iter()
                .filter_map(|slot| slot.value().get().cloned())
                .collect(),
            _ => self.get(namespace, entity).into_iter().collect(),
        };

        for sink in &targets {
            sink.set_threshold(level);
        }

        tracing::info!(
            namespace = %namespace,
            entity = %entity,
            level = %level,
            updated = targets.len(),
            "Threshold applied to live sinks"
        );
        targets.len()
    }

    /// Route a configured threshold to the right namespace.
    pub fn apply_threshold(&self, entity: &str, level: Severity) -> usize {
        if entity == REQUEST_DEFAULT_KEY {
            self.set_threshold(Namespace::Request, entity, level)
        } else {
            self.set_threshold(Namespace::Service, entity, level)
        }
    }

    /// Names of the open sinks in `namespace`, sorted.
    pub fn open_sinks(&self, namespace: Namespace) -> Vec<String> {
        let mut names: Vec<String> = self
            .map(namespace)
            .iter()
            .filter(|slot| slot.value().initialized())
            .map(|slot| slot.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Close every open sink in both namespaces.
    pub async fn close_all(&self) {
        for namespace in [Namespace::Service, Namespace::Request] {
            let names: Vec<String> = self.map(namespace).iter().map(|e| e.key().clone()).collect();
            for name in names {
                if let Err(e) = self.close_sink(namespace, &name).await {
                    tracing::warn!(namespace = %namespace, entity = %name, error = %e, "Failed to close sink");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonThresholdStore;
    use tempfile::TempDir;

    async fn registry_with(store: JsonThresholdStore) -> (SinkRegistry, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let paths = LogPaths::new(dir.path().join("services"), dir.path().join("requests"));
        (SinkRegistry::new(paths, Arc::new(store), false), dir)
    }

    #[tokio::test]
    async fn test_default_threshold_is_warn() {
        let (registry, _dir) = registry_with(JsonThresholdStore::in_memory()).await;
        let sink = registry.ensure_sink(Namespace::Service, "svc1").await.unwrap();
        assert_eq!(sink.threshold(), Severity::Warn);
        assert!(sink.path().exists());
    }

    #[tokio::test]
    async fn test_thresholds_come_from_store() {
        let store = JsonThresholdStore::in_memory();
        store.upsert_threshold("svc1", Severity::Debug).await.unwrap();
        store.upsert_threshold(REQUEST_DEFAULT_KEY, Severity::Silly).await.unwrap();
        let (registry, _dir) = registry_with(store).await;

        let service = registry.ensure_sink(Namespace::Service, "svc1").await.unwrap();
        let other = registry.ensure_sink(Namespace::Service, "svc2").await.unwrap();
        let request = registry.ensure_sink(Namespace::Request, "101").await.unwrap();

        assert_eq!(service.threshold(), Severity::Debug);
        assert_eq!(other.threshold(), Severity::Warn);
        assert_eq!(request.threshold(), Severity::Silly);
    }

    #[tokio::test]
    async fn test_write_filters_and_autocreates() {
        let store = JsonThresholdStore::in_memory();
        store.upsert_threshold("svc1", Severity::Info).await.unwrap();
        let (registry, _dir) = registry_with(store).await;

        assert!(!registry
            .write(Namespace::Service, "svc1", "101", "debug detail", Severity::Debug)
            .await
            .unwrap());
        assert!(registry
            .write(Namespace::Service, "svc1", "101", "hello", Severity::Info)
            .await
            .unwrap());

        let sink = registry.get(Namespace::Service, "svc1").unwrap();
        let content = tokio::fs::read_to_string(sink.path()).await.unwrap();
        assert!(content.contains("[STARTUP] - [info]: Service log file opened"));
        assert!(content.contains("[101] - [info]: hello"));
        assert!(!content.contains("debug detail"));
    }

    #[tokio::test]
    async fn test_concurrent_first_writes_share_one_sink() {
        let store = JsonThresholdStore::in_memory();
        store.upsert_threshold("busy", Severity::Info).await.unwrap();
        let (registry, _dir) = registry_with(store).await;
        let registry = Arc::new(registry);

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .write(Namespace::Service, "busy", &i.to_string(), "entry", Severity::Error)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let sink = registry.get(Namespace::Service, "busy").unwrap();
        let content = tokio::fs::read_to_string(sink.path()).await.unwrap();
        assert_eq!(content.matches("Service log file opened").count(), 1);
        assert_eq!(content.matches("]: entry").count(), 16);
        assert_eq!(registry.open_sinks(Namespace::Service), vec!["busy"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_writes_racing_close_never_fail() {
        let (registry, _dir) = registry_with(JsonThresholdStore::in_memory()).await;
        let registry = Arc::new(registry);

        let closer = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..2000 {
                    registry.close_sink(Namespace::Service, "svc").await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut writers = Vec::new();
        for w in 0..8 {
            let registry = registry.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..300 {
                    registry
                        .write(Namespace::Service, "svc", &format!("{}-{}", w, i), "entry", Severity::Error)
                        .await
                        .unwrap();
                }
            }));
        }

        for writer in writers {
            writer.await.unwrap();
        }
        closer.await.unwrap();

        let path = registry.paths().sink_path(Namespace::Service, "svc").unwrap();
        let content = tokio::fs::read_to_string(path).await.unwrap();
        assert_eq!(content.matches("]: entry").count(), 8 * 300);
    }

    #[tokio::test]
    async fn test_request_default_broadcasts() {
        let (registry, _dir) = registry_with(JsonThresholdStore::in_memory()).await;
        let a = registry.ensure_sink(Namespace::Request, "101").await.unwrap();
        let b = registry.ensure_sink(Namespace::Request, "102").await.unwrap();
        let svc = registry.ensure_sink(Namespace::Service, "svc").await.unwrap();

        let updated = registry.set_threshold(Namespace::Request, REQUEST_DEFAULT_KEY, Severity::Debug);
        assert_eq!(updated, 2);
        assert_eq!(a.threshold(), Severity::Debug);
        assert_eq!(b.threshold(), Severity::Debug);
        assert_eq!(svc.threshold(), Severity::Warn);

        assert_eq!(registry.apply_threshold("svc", Severity::Error), 1);
        assert_eq!(svc.threshold(), Severity::Error);
        assert_eq!(registry.apply_threshold("missing", Severity::Error), 0);
    }

    #[tokio::test]
    async fn test_close_sink() {
        let (registry, _dir) = registry_with(JsonThresholdStore::in_memory()).await;
        registry.close_sink(Namespace::Service, "never-opened").await.unwrap();

        let sink = registry.ensure_sink(Namespace::Service, "svc").await.unwrap();
        registry.close_sink(Namespace::Service, "svc").await.unwrap();

        assert!(registry.get(Namespace::Service, "svc").is_none());
        assert!(sink.is_closed().await);
        assert!(sink.path().exists());

        // A new sink under the same name appends to the same file.
        let reopened = registry.ensure_sink(Namespace::Service, "svc").await.unwrap();
        assert!(!Arc::ptr_eq(&sink, &reopened));
        assert!(!reopened.is_closed().await);
    }

    #[tokio::test]
    async fn test_invalid_entity_creates_nothing() {
        let (registry, _dir) = registry_with(JsonThresholdStore::in_memory()).await;
        let err = registry.ensure_sink(Namespace::Request, "../escape").await.unwrap_err();
        assert!(matches!(err, SinkError::InvalidEntityName { .. }));
        assert!(registry.open_sinks(Namespace::Request).is_empty());
    }

    #[tokio::test]
    async fn test_failed_creation_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the directory should be.
        let blocker = dir.path().join("services");
        std::fs::write(&blocker, b"").unwrap();
        let paths = LogPaths::new(&blocker, dir.path().join("requests"));
        let registry = SinkRegistry::new(paths, Arc::new(JsonThresholdStore::in_memory()), false);

        let err = registry.ensure_sink(Namespace::Service, "svc").await.unwrap_err();
        assert_eq!(err.kind(), "IOFailure");
        assert!(registry.get(Namespace::Service, "svc").is_none());
        assert!(registry.map(Namespace::Service).is_empty());
    }

    #[tokio::test]
    async fn test_close_all() {
        let (registry, _dir) = registry_with(JsonThresholdStore::in_memory()).await;
        let a = registry.ensure_sink(Namespace::Service, "a").await.unwrap();
        let b = registry.ensure_sink(Namespace::Request, "1").await.unwrap();

        registry.close_all().await;

        assert!(a.is_closed().await);
        assert!(b.is_closed().await);
        assert!(registry.open_sinks(Namespace::Service).is_empty());
        assert!(registry.open_sinks(Namespace::Request).is_empty());
    }
}
