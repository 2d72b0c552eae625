//! Watch registry and per-watch follow tasks.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dashmap::DashMap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::TailConfig;
use crate::observability::metrics;
use crate::tail::{Follower, TailError, TailResult, WatchId};

/// Receiving end of a watch: one `String` per appended line, in file order.
pub type LineReceiver = mpsc::Receiver<String>;

/// Engine-side handle of a running watch.
///
/// Dropping the handle aborts the task, which drops the notify watcher and
/// the line sender, so every removal path releases the watch's resources.
struct WatchHandle {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Follows many files concurrently, one task per watch.
pub struct TailEngine {
    watches: DashMap<WatchId, WatchHandle>,
    poll_interval: Duration,
    channel_capacity: usize,
}

impl TailEngine {
    pub fn new(config: &TailConfig) -> Self {
        Self {
            watches: DashMap::new(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            channel_capacity: config.channel_capacity,
        }
    }

    /// Start following `path` from its current end.
    pub async fn start_watch(&self, path: impl AsRef<Path>) -> TailResult<(WatchId, LineReceiver)> {
        let path = path.as_ref().to_path_buf();

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TailError::NotFound(path));
            }
            Err(source) => return Err(TailError::Io { path, source }),
        };
        if !metadata.is_file() {
            return Err(TailError::NotAFile(path));
        }

        let id = WatchId::new();
        let follower = Follower::at_end(path.clone(), &metadata)
            .await
            .map_err(|source| TailError::Io {
                path: path.clone(),
                source,
            })?;
        let (line_tx, line_rx) = mpsc::channel(self.channel_capacity);

        let task = tokio::spawn(follow(id, follower, line_tx, self.poll_interval));

        self.watches.insert(
            id,
            WatchHandle {
                path: path.clone(),
                task,
            },
        );
        metrics::record_active_watches(self.watches.len());
        tracing::info!(watch_id = %id, path = %path.display(), "Watch started");

        Ok((id, line_rx))
    }

    /// Stop a watch and release its task, watcher and file.
    pub fn stop_watch(&self, id: WatchId) -> TailResult<()> {
        let (_, handle) = self
            .watches
            .remove(&id)
            .ok_or(TailError::WatchNotFound(id))?;

        tracing::info!(watch_id = %id, path = %handle.path.display(), "Watch stopped");
        drop(handle);
        metrics::record_active_watches(self.watches.len());
        Ok(())
    }

    pub fn active_watches(&self) -> usize {
        self.watches.len()
    }

    pub fn is_watching(&self, id: WatchId) -> bool {
        self.watches.contains_key(&id)
    }
}

/// Change notifications for one file, if the platform backend is available.
///
/// The channel holds at most one pending wakeup; a burst of events while the
/// task is reading collapses into a single extra read.
fn change_notifier(path: &Path) -> Option<(RecommendedWatcher, mpsc::Receiver<()>)> {
    let (tx, rx) = mpsc::channel(1);
    let watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                    // Full means a wakeup is already queued.
                    let _ = tx.try_send(());
                }
            }
            Err(e) => tracing::debug!(error = %e, "Watch backend error"),
        },
        Config::default(),
    );

    match watcher {
        Ok(mut watcher) => match watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => Some((watcher, rx)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Change notification unavailable, polling only");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "Change notification unavailable, polling only");
            None
        }
    }
}

async fn follow(
    id: WatchId,
    mut follower: Follower,
    lines: mpsc::Sender<String>,
    poll_interval: Duration,
) {
    // Held for the lifetime of the task; dropping it unregisters the OS watch.
    let (_watcher, mut changes) = match change_notifier(follower.path()) {
        Some((watcher, changes)) => (Some(watcher), Some(changes)),
        None => (None, None),
    };

    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = lines.closed() => {
                tracing::debug!(watch_id = %id, "Subscriber gone, ending watch task");
                break;
            }
            _ = ticker.tick() => {}
            Some(()) = async {
                match changes.as_mut() {
                    Some(changes) => changes.recv().await,
                    None => std::future::pending().await,
                }
            } => {}
        }

        let new_lines = match follower.read_new_lines().await {
            Ok(new_lines) => new_lines,
            Err(e) => {
                tracing::warn!(
                    watch_id = %id,
                    path = %follower.path().display(),
                    error = %e,
                    "Failed to read followed file"
                );
                continue;
            }
        };

        for line in new_lines {
            if lines.send(line).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn engine() -> TailEngine {
        TailEngine::new(&TailConfig {
            poll_interval_ms: 20,
            channel_capacity: 64,
        })
    }

    async fn next_line(rx: &mut LineReceiver) -> String {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for line")
            .expect("watch channel closed")
    }

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = engine().start_watch(dir.path().join("nope.log")).await.unwrap_err();
        assert!(matches!(err, TailError::NotFound(_)));
        assert_eq!(err.kind(), "NotFoundError");
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = engine().start_watch(dir.path()).await.unwrap_err();
        assert!(matches!(err, TailError::NotAFile(_)));
        assert_eq!(err.kind(), "NotAFileError");
    }

    #[tokio::test]
    async fn test_delivers_only_lines_appended_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, "before 1\nbefore 2\n").unwrap();

        let engine = engine();
        let (id, mut rx) = engine.start_watch(&path).await.unwrap();

        append(&path, "after 1\nafter 2\n");
        append(&path, "after 3\n");

        assert_eq!(next_line(&mut rx).await, "after 1");
        assert_eq!(next_line(&mut rx).await, "after 2");
        assert_eq!(next_line(&mut rx).await, "after 3");

        engine.stop_watch(id).unwrap();
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, "").unwrap();

        let engine = engine();
        let (_id, mut rx) = engine.start_watch(&path).await.unwrap();

        append(&path, "half");
        let early = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(early.is_err(), "partial line must not be emitted");

        append(&path, " done\n");
        assert_eq!(next_line(&mut rx).await, "half done");
    }

    #[tokio::test]
    async fn test_many_watches_on_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, "").unwrap();

        let engine = engine();
        let (a, mut rx_a) = engine.start_watch(&path).await.unwrap();
        let (b, mut rx_b) = engine.start_watch(&path).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(engine.active_watches(), 2);

        append(&path, "shared\n");
        assert_eq!(next_line(&mut rx_a).await, "shared");
        assert_eq!(next_line(&mut rx_b).await, "shared");
    }

    #[tokio::test]
    async fn test_stop_is_not_found_the_second_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, "").unwrap();

        let engine = engine();
        let (id, mut rx) = engine.start_watch(&path).await.unwrap();

        engine.stop_watch(id).unwrap();
        assert!(!engine.is_watching(id));
        assert_eq!(engine.active_watches(), 0);

        let err = engine.stop_watch(id).unwrap_err();
        assert!(matches!(err, TailError::WatchNotFound(_)));
        assert_eq!(err.kind(), "NotFoundError");

        // The stream ends once the task is gone.
        let end = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        assert!(matches!(
            engine().stop_watch(WatchId::new()),
            Err(TailError::WatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_follows_longer_rewrite_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, "old\nline\n").unwrap();

        let engine = engine();
        let (_id, mut rx) = engine.start_watch(&path).await.unwrap();

        std::fs::write(&path, "first new line\nsecond new line\n").unwrap();
        assert_eq!(next_line(&mut rx).await, "first new line");
        assert_eq!(next_line(&mut rx).await, "second new line");
    }

    #[tokio::test]
    async fn test_event_burst_delivers_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, "").unwrap();

        let engine = engine();
        let (_id, mut rx) = engine.start_watch(&path).await.unwrap();

        for i in 0..200 {
            append(&path, &format!("burst {}\n", i));
        }
        for i in 0..200 {
            assert_eq!(next_line(&mut rx).await, format!("burst {}", i));
        }
    }

    #[tokio::test]
    async fn test_follows_truncate_then_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        std::fs::write(&path, "a fairly long historical line\n").unwrap();

        let engine = engine();
        let (_id, mut rx) = engine.start_watch(&path).await.unwrap();

        std::fs::write(&path, "rewritten\n").unwrap();
        assert_eq!(next_line(&mut rx).await, "rewritten");
    }
}
