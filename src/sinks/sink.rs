//! A single threshold-filtered, append-only log file.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::observability::metrics;
use crate::severity::Severity;
use crate::sinks::{Namespace, SinkError, SinkResult};

/// Format one log line (without the trailing newline).
///
/// Line breaks inside the correlating id or the message are written as `\n`
/// and `\r`, so every entry stays on one physical line.
pub fn format_line(
    timestamp: DateTime<Utc>,
    correlating_id: &str,
    level: Severity,
    message: &str,
) -> String {
    format!(
        "[{}] - [{}] - [{}]: {}",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        escape_line_breaks(correlating_id),
        level,
        escape_line_breaks(message)
    )
}

fn escape_line_breaks(text: &str) -> Cow<'_, str> {
    if !text.contains(['\n', '\r']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace('\r', "\\r").replace('\n', "\\n"))
}

/// Marker text and correlating id written when a sink opens or closes.
pub(crate) fn open_marker(namespace: Namespace) -> (&'static str, &'static str) {
    match namespace {
        Namespace::Service => ("STARTUP", "Service log file opened"),
        Namespace::Request => ("logger-service", "Request log file created"),
    }
}

pub(crate) fn close_marker(namespace: Namespace) -> (&'static str, &'static str) {
    match namespace {
        Namespace::Service => ("SHUTDOWN", "Service log file closed"),
        Namespace::Request => ("logger-service", "Request log file closed"),
    }
}

/// An open sink.
#[derive(Debug)]
pub struct Sink {
    namespace: Namespace,
    name: String,
    path: PathBuf,
    /// Threshold rank, see [`Severity::rank`].
    threshold: AtomicU8,
    /// `None` once closed.
    file: Mutex<Option<File>>,
    echo: bool,
}

impl Sink {
    /// Create the namespace directory if needed and open the backing file for append.
    pub async fn open(
        namespace: Namespace,
        name: &str,
        path: PathBuf,
        threshold: Severity,
        echo: bool,
    ) -> SinkResult<Self> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| SinkError::io(dir, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| SinkError::io(&path, e))?;

        tracing::debug!(
            namespace = %namespace,
            entity = %name,
            path = %path.display(),
            threshold = %threshold,
            "Sink opened"
        );

        Ok(Self {
            namespace,
            name: name.to_string(),
            path,
            threshold: AtomicU8::new(threshold.rank()),
            file: Mutex::new(Some(file)),
            echo,
        })
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn threshold(&self) -> Severity {
        Severity::from_rank(self.threshold.load(Ordering::Relaxed)).unwrap_or_default()
    }

    pub fn set_threshold(&self, level: Severity) {
        let previous = self.threshold.swap(level.rank(), Ordering::Relaxed);
        tracing::debug!(
            namespace = %self.namespace,
            entity = %self.name,
            from = ?Severity::from_rank(previous),
            to = %level,
            "Sink threshold changed"
        );
    }

    /// Append an entry if it passes the threshold.
    ///
    /// Returns `Ok(false)` when the entry was filtered out.
    pub async fn append(&self, correlating_id: &str, message: &str, level: Severity) -> SinkResult<bool> {
        if !level.is_at_least(self.threshold()) {
            metrics::record_entry(self.namespace, level, "dropped");
            return Ok(false);
        }

        let line = format_line(Utc::now(), correlating_id, level, message);

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or_else(|| SinkError::Closed {
            namespace: self.namespace,
            name: self.name.clone(),
        })?;

        let mut bytes = line.into_bytes();
        bytes.push(b'\n');
        file.write_all(&bytes)
            .await
            .map_err(|e| SinkError::io(&self.path, e))?;
        file.flush().await.map_err(|e| SinkError::io(&self.path, e))?;
        drop(guard);

        if self.echo {
            bytes.pop();
            tracing::info!(
                target: "log_relay::echo",
                namespace = %self.namespace,
                entity = %self.name,
                "{}",
                String::from_utf8_lossy(&bytes)
            );
        }

        metrics::record_entry(self.namespace, level, "written");
        Ok(true)
    }

    pub(crate) async fn write_open_marker(&self) -> SinkResult<bool> {
        let (correlating_id, message) = open_marker(self.namespace);
        self.append(correlating_id, message, Severity::Info).await
    }

    /// Write the close marker, flush and release the file handle.
    ///
    /// Closing an already closed sink is a no-op.
    pub async fn close(&self) -> SinkResult<()> {
        let (correlating_id, message) = close_marker(self.namespace);
        match self.append(correlating_id, message, Severity::Info).await {
            Ok(_) | Err(SinkError::Closed { .. }) => {}
            Err(e) => {
                // Still release the handle below.
                tracing::warn!(
                    namespace = %self.namespace,
                    entity = %self.name,
                    error = %e,
                    "Failed to write close marker"
                );
            }
        }

        let Some(mut file) = self.file.lock().await.take() else {
            return Ok(());
        };
        file.flush().await.map_err(|e| SinkError::io(&self.path, e))?;
        file.sync_all().await.map_err(|e| SinkError::io(&self.path, e))?;

        tracing::debug!(namespace = %self.namespace, entity = %self.name, "Sink closed");
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        self.file.lock().await.is_none()
    }
}
