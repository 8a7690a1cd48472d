//! Best-effort snapshot persistence.
//!
//! Writes go through a [`SnapshotWriter`] task that applies patches in the
//! order they were queued. Patches that pile up while a write is in flight are
//! merged into one write.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tabrec_common::error::RecorderError;
use tabrec_common::protocol::PersistedSnapshot;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    async fn load(&self) -> Result<PersistedSnapshot, RecorderError>;

    /// Write only the keys present in `patch`.
    async fn apply(&self, patch: PersistedSnapshot) -> Result<(), RecorderError>;
}

#[derive(Default)]
pub struct MemoryStorage {
    snapshot: Mutex<PersistedSnapshot>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: PersistedSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> PersistedSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SnapshotStorage for MemoryStorage {
    async fn load(&self) -> Result<PersistedSnapshot, RecorderError> {
        Ok(self.snapshot())
    }

    async fn apply(&self, patch: PersistedSnapshot) -> Result<(), RecorderError> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(patch);
        Ok(())
    }
}

/// JSON file on disk, replaced atomically on every write.
pub struct FileStorage {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<PersistedSnapshot, RecorderError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(PersistedSnapshot::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersistedSnapshot::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SnapshotStorage for FileStorage {
    async fn load(&self) -> Result<PersistedSnapshot, RecorderError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn apply(&self, patch: PersistedSnapshot) -> Result<(), RecorderError> {
        let _guard = self.lock.lock().await;
        let mut snapshot = match self.read().await {
            Ok(snapshot) => snapshot,
            Err(RecorderError::Serialization(e)) => {
                warn!(
                    "Snapshot file {} is corrupt, rewriting it: {}",
                    self.path.display(),
                    e
                );
                PersistedSnapshot::default()
            }
            Err(e) => return Err(e),
        };
        snapshot.merge(patch);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string(&snapshot)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

enum WriteOp {
    Apply(PersistedSnapshot),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct SnapshotWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl SnapshotWriter {
    pub fn spawn(storage: Arc<dyn SnapshotStorage>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(storage, rx));
        Self { tx }
    }

    /// Queue a patch. Never waits for the write.
    pub fn write(&self, patch: PersistedSnapshot) {
        if self.tx.send(WriteOp::Apply(patch)).is_err() {
            warn!("Snapshot writer stopped, dropping write");
        }
    }

    /// Resolves once everything queued before this call has been written.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteOp::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_writer(storage: Arc<dyn SnapshotStorage>, mut rx: mpsc::UnboundedReceiver<WriteOp>) {
    while let Some(op) = rx.recv().await {
        let mut pending = match op {
            WriteOp::Apply(patch) => patch,
            WriteOp::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        let mut waiting = None;
        let mut merged = 0usize;
        while let Ok(next) = rx.try_recv() {
            match next {
                WriteOp::Apply(patch) => {
                    pending.merge(patch);
                    merged += 1;
                }
                WriteOp::Flush(done) => {
                    waiting = Some(done);
                    break;
                }
            }
        }
        if merged > 0 {
            debug!("Coalesced {} snapshot patches into one write", merged + 1);
        }

        if let Err(e) = storage.apply(pending).await {
            warn!("Failed to persist snapshot: {}", e);
        }

        if let Some(done) = waiting {
            let _ = done.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabrec_common::protocol::{LogEntry, LogLevel, now};

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            timestamp: now(),
            level: LogLevel::Log,
            message: message.into(),
            source_url: "https://example.com/".into(),
            user_agent: "test".into(),
        }
    }

    #[tokio::test]
    async fn test_writer_applies_in_order() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = SnapshotWriter::spawn(storage.clone());

        writer.write(PersistedSnapshot {
            is_recording: Some(true),
            console_logs: Some(vec![entry("a")]),
            network_logs: Some(vec![]),
        });
        writer.write(PersistedSnapshot {
            console_logs: Some(vec![entry("a"), entry("b")]),
            ..Default::default()
        });
        writer.write(PersistedSnapshot {
            is_recording: Some(false),
            ..Default::default()
        });
        writer.flush().await;

        let stored = storage.snapshot();
        assert_eq!(stored.is_recording, Some(false));
        let messages: Vec<_> = stored
            .console_logs
            .unwrap()
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested").join("snapshot.json"));

        assert_eq!(storage.load().await.unwrap(), PersistedSnapshot::default());

        storage.apply(PersistedSnapshot::pristine()).await.unwrap();
        storage
            .apply(PersistedSnapshot {
                console_logs: Some(vec![entry("kept")]),
                ..Default::default()
            })
            .await
            .unwrap();

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded.is_recording, Some(false));
        assert_eq!(loaded.console_logs.unwrap()[0].message, "kept");
        assert_eq!(loaded.network_logs, Some(vec![]));
    }

    #[tokio::test]
    async fn test_file_storage_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{not json").unwrap();
        let storage = FileStorage::new(&path);
        assert!(storage.load().await.is_err());
    }

    #[tokio::test]
    async fn test_file_storage_recovers_from_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{truncated").unwrap();
        let storage = Arc::new(FileStorage::new(&path));

        let writer = SnapshotWriter::spawn(storage.clone());
        writer.write(PersistedSnapshot {
            console_logs: Some(vec![entry("after crash")]),
            ..Default::default()
        });
        writer.flush().await;

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded.console_logs.unwrap()[0].message, "after crash");
        assert_eq!(loaded.is_recording, None);
    }
}
