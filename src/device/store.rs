use super::types::ConnectionRecord;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct KnownBridgesFile {
    version: u32,
    bridges: Vec<ConnectionRecord>,
}

/// JSON file holding the bridges connected in previous runs
#[derive(Debug, Clone)]
pub struct KnownDeviceStore {
    path: PathBuf,
}

impl KnownDeviceStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load records; a missing file means nothing was connected yet
    pub async fn load(&self) -> Result<Vec<ConnectionRecord>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No known bridge file at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let file: KnownBridgesFile = serde_json::from_str(&contents)?;
        debug!(
            "Read {} known bridge(s) from {} (version {})",
            file.bridges.len(),
            self.path.display(),
            file.version
        );
        Ok(file.bridges)
    }

    /// Write all records, replacing the file atomically
    pub async fn save(&self, records: &[ConnectionRecord]) -> Result<()> {
        let file = KnownBridgesFile {
            version: STORE_VERSION,
            bridges: records.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &self.path).await?;

        debug!("Saved {} known bridge(s) to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// Background writer: applies registry snapshots in arrival order.
///
/// On cancellation the newest queued snapshot is still written.
pub async fn persistence_worker(
    mut rx: mpsc::UnboundedReceiver<Vec<ConnectionRecord>>,
    store: KnownDeviceStore,
    cancel: CancellationToken,
) {
    info!("Known bridge persistence worker started");

    loop {
        let snapshot = tokio::select! {
            _ = cancel.cancelled() => {
                if let Some(snapshot) = latest(&mut rx, None) {
                    persist(&store, &snapshot).await;
                }
                break;
            }
            received = rx.recv() => match received {
                Some(snapshot) => latest(&mut rx, Some(snapshot)),
                None => break,
            },
        };

        if let Some(snapshot) = snapshot {
            persist(&store, &snapshot).await;
        }
    }

    info!("Known bridge persistence worker stopped");
}

/// Only the newest snapshot matters
fn latest(
    rx: &mut mpsc::UnboundedReceiver<Vec<ConnectionRecord>>,
    mut snapshot: Option<Vec<ConnectionRecord>>,
) -> Option<Vec<ConnectionRecord>> {
    while let Ok(newer) = rx.try_recv() {
        snapshot = Some(newer);
    }
    snapshot
}

async fn persist(store: &KnownDeviceStore, snapshot: &[ConnectionRecord]) {
    if let Err(e) = store.save(snapshot).await {
        error!(
            "Failed to persist known bridges to {}: {}",
            store.path().display(),
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use chrono::Utc;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnownDeviceStore::new(dir.path().join("bridges.json"));

        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("bridges.json");
        let record = ConnectionRecord {
            device: DeviceInfo::new("192.168.0.20", "ecb5fafffe000123"),
            last_connected_at: Utc::now(),
        };

        KnownDeviceStore::new(&path)
            .save(std::slice::from_ref(&record))
            .await
            .unwrap();

        let reopened = KnownDeviceStore::new(&path);
        assert_eq!(reopened.load().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_worker_writes_latest_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnownDeviceStore::new(dir.path().join("bridges.json"));
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(persistence_worker(
            rx,
            store.clone(),
            CancellationToken::new(),
        ));

        let record = ConnectionRecord {
            device: DeviceInfo::new("10.1.1.1", "one"),
            last_connected_at: Utc::now(),
        };
        tx.send(vec![record.clone()]).unwrap();
        drop(tx);
        worker.await.unwrap();

        assert_eq!(store.load().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_cancelled_worker_flushes_pending_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnownDeviceStore::new(dir.path().join("bridges.json"));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let first = ConnectionRecord {
            device: DeviceInfo::new("10.1.1.1", "one"),
            last_connected_at: Utc::now(),
        };
        let second = ConnectionRecord {
            device: DeviceInfo::new("10.1.1.2", "two"),
            last_connected_at: Utc::now(),
        };
        tx.send(vec![first.clone()]).unwrap();
        tx.send(vec![first.clone(), second.clone()]).unwrap();
        cancel.cancel();

        persistence_worker(rx, store.clone(), cancel).await;

        assert_eq!(store.load().await.unwrap(), vec![first, second]);
    }
}
