use super::types::{ConnectionRecord, DeviceInfo};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Bridges seen by discovery plus every bridge connected before.
///
/// Mutation happens from the control loop only; clones can be read from any
/// thread and always observe a consistent snapshot.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    persist_tx: Option<mpsc::UnboundedSender<Vec<ConnectionRecord>>>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    discovered: Vec<DeviceInfo>,
    records: Vec<ConnectionRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose connection records are forwarded to a persistence worker
    pub fn with_persistence(persist_tx: mpsc::UnboundedSender<Vec<ConnectionRecord>>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            persist_tx: Some(persist_tx),
        }
    }

    /// Seed connection records loaded from disk, dropping duplicate identities
    pub fn load_records(&self, records: Vec<ConnectionRecord>) {
        let mut inner = self.inner.write();
        for record in records {
            match inner
                .records
                .iter_mut()
                .find(|existing| existing.device == record.device)
            {
                Some(existing) => {
                    if record.last_connected_at > existing.last_connected_at {
                        existing.last_connected_at = record.last_connected_at;
                    }
                }
                None => inner.records.push(record),
            }
        }
        info!("Loaded {} known bridge(s)", inner.records.len());
    }

    /// Replace the devices of the current discovery session
    pub fn record_discovered(&self, devices: &[DeviceInfo]) {
        let mut inner = self.inner.write();
        inner.discovered.clear();
        for device in devices {
            if !inner.discovered.contains(device) {
                inner.discovered.push(device.clone());
            }
        }
        debug!("Discovery session holds {} bridge(s)", inner.discovered.len());
    }

    /// Insert a connection record or refresh its timestamp
    pub fn upsert(&self, device: &DeviceInfo, connected_at: DateTime<Utc>) {
        let snapshot = {
            let mut inner = self.inner.write();
            match inner.records.iter_mut().find(|r| &r.device == device) {
                Some(record) => record.last_connected_at = connected_at,
                None => inner.records.push(ConnectionRecord {
                    device: device.clone(),
                    last_connected_at: connected_at,
                }),
            }
            inner.records.clone()
        };
        debug!("Recorded connection to {}", device);
        self.persist(snapshot);
    }

    /// Drop every record for `unique_id`; unknown ids are ignored
    pub fn forget(&self, unique_id: &str) -> bool {
        let snapshot = {
            let mut inner = self.inner.write();
            let before = inner.records.len();
            inner.records.retain(|r| r.device.unique_id() != unique_id);
            if inner.records.len() == before {
                return false;
            }
            inner.records.clone()
        };
        info!("Forgot bridge {}", unique_id);
        self.persist(snapshot);
        true
    }

    pub fn most_recently_connected(&self) -> Option<ConnectionRecord> {
        self.inner
            .read()
            .records
            .iter()
            .max_by_key(|r| r.last_connected_at)
            .cloned()
    }

    /// Discovered bridges in discovery order, followed by known bridges not
    /// seen in the current session
    pub fn all(&self) -> Vec<DeviceInfo> {
        let inner = self.inner.read();
        let mut devices = inner.discovered.clone();
        for record in &inner.records {
            if !devices.contains(&record.device) {
                devices.push(record.device.clone());
            }
        }
        devices
    }

    pub fn records(&self) -> Vec<ConnectionRecord> {
        self.inner.read().records.clone()
    }

    pub fn has_connected_before(&self) -> bool {
        !self.inner.read().records.is_empty()
    }

    fn persist(&self, snapshot: Vec<ConnectionRecord>) {
        if let Some(tx) = &self.persist_tx {
            if tx.send(snapshot).is_err() {
                warn!("Known bridge persistence worker is gone, change not saved");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bridge(n: u8) -> DeviceInfo {
        DeviceInfo::new(format!("10.0.0.{}", n), format!("bridge-{}", n))
    }

    #[test]
    fn test_upsert_updates_instead_of_duplicating() {
        let registry = DeviceRegistry::new();
        let first = Utc::now();
        let later = first + Duration::seconds(30);

        registry.upsert(&bridge(1), first);
        registry.upsert(&bridge(1), later);

        let records = registry.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].last_connected_at, later);
    }

    #[test]
    fn test_most_recently_connected() {
        let registry = DeviceRegistry::new();
        assert!(registry.most_recently_connected().is_none());

        let now = Utc::now();
        registry.upsert(&bridge(1), now - Duration::minutes(5));
        registry.upsert(&bridge(2), now);
        registry.upsert(&bridge(3), now - Duration::hours(1));

        let latest = registry.most_recently_connected().unwrap();
        assert_eq!(latest.device, bridge(2));
    }

    #[test]
    fn test_forget_unknown_is_noop() {
        let registry = DeviceRegistry::new();
        registry.upsert(&bridge(1), Utc::now());

        assert!(!registry.forget("missing"));
        assert_eq!(registry.records().len(), 1);

        assert!(registry.forget("bridge-1"));
        assert!(registry.most_recently_connected().is_none());
    }

    #[test]
    fn test_all_keeps_discovery_order_and_appends_known() {
        let registry = DeviceRegistry::new();
        registry.upsert(&bridge(9), Utc::now());
        registry.record_discovered(&[bridge(3), bridge(1), bridge(3), bridge(9)]);

        assert_eq!(registry.all(), vec![bridge(3), bridge(1), bridge(9)]);

        registry.record_discovered(&[bridge(2)]);
        assert_eq!(registry.all(), vec![bridge(2), bridge(9)]);
    }

    #[tokio::test]
    async fn test_changes_are_forwarded_for_persistence() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = DeviceRegistry::with_persistence(tx);

        registry.upsert(&bridge(1), Utc::now());
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.len(), 1);

        registry.forget("bridge-1");
        let snapshot = rx.recv().await.unwrap();
        assert!(snapshot.is_empty());

        // Forgetting an unknown id does not produce a write
        registry.forget("bridge-1");
        assert!(rx.try_recv().is_err());
    }
}
