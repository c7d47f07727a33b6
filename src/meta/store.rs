//! Short-lived store for WebSocket handshake metadata.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::bare::HeaderSet;
use crate::observability::metrics;

/// Random bytes per meta ID (hex-encoded to twice as many characters).
pub const META_ID_BYTES: usize = 32;

/// Default lifetime of an unconsumed entry.
pub const DEFAULT_META_TTL: Duration = Duration::from_secs(30);

/// Remote handshake headers captured for a socket tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaResponse {
    pub headers: HeaderSet,
}

/// One pending meta handshake.
#[derive(Debug, Clone)]
pub struct MetaEntry {
    pub id: String,
    pub created_at: Instant,
    pub response: Option<MetaResponse>,
}

impl MetaEntry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.created_at + ttl < now
    }
}

/// Shared ID → metadata map.
///
/// Cheap to clone; clones share the same entries. Every operation is a
/// single map call, so a sweep racing a `consume` simply decides which of
/// the two removes the entry.
#[derive(Debug, Clone)]
pub struct MetaStore {
    entries: Arc<DashMap<String, MetaEntry>>,
    ttl: Duration,
}

impl Default for MetaStore {
    fn default() -> Self {
        Self::new(DEFAULT_META_TTL)
    }
}

impl MetaStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Register a new empty entry and return its ID.
    pub fn create(&self) -> String {
        let mut bytes = [0u8; META_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let id: String = bytes.iter().map(|b| format!("{b:02x}")).collect();

        self.entries.insert(
            id.clone(),
            MetaEntry {
                id: id.clone(),
                created_at: Instant::now(),
                response: None,
            },
        );
        metrics::record_meta_entries(self.entries.len());
        id
    }

    /// Store remote response headers under a live ID.
    ///
    /// Unknown or expired IDs are ignored, as is a second attach to the same
    /// entry. Returns whether the headers were stored.
    pub fn attach_response(&self, id: &str, headers: HeaderSet) -> bool {
        match self.entries.get_mut(id) {
            Some(mut entry) if entry.response.is_none() => {
                entry.response = Some(MetaResponse { headers });
                true
            }
            Some(_) => {
                tracing::debug!(meta_id = %id, "Meta entry already has a response");
                false
            }
            None => false,
        }
    }

    /// Remove an entry and return its headers, if any were attached.
    pub fn consume(&self, id: &str) -> Option<HeaderSet> {
        let removed = self.entries.remove(id);
        metrics::record_meta_entries(self.entries.len());
        removed
            .and_then(|(_, entry)| entry.response)
            .map(|response| response.headers)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry older than the TTL at `now`. Returns how many went.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(self.ttl, now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Expired meta entries");
            metrics::record_meta_expired(removed);
            metrics::record_meta_entries(self.entries.len());
        }
        removed
    }

    /// Run the sweep loop until `shutdown` fires.
    pub async fn run_sweeper(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(
            interval_ms = interval.as_millis() as u64,
            ttl_secs = self.ttl.as_secs(),
            "Meta sweeper starting"
        );
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_expired(Instant::now());
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Meta sweeper stopping");
                    break;
                }
            }
        }
    }

    /// Spawn [`MetaStore::run_sweeper`] on the current runtime.
    pub fn start_sweeper(
        &self,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.clone().run_sweeper(interval, shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;

    fn headers() -> HeaderSet {
        let mut set = HeaderSet::new();
        set.insert("sec-websocket-accept", "XYZ");
        set
    }

    #[tokio::test]
    async fn ids_are_hex_and_unique() {
        let store = MetaStore::default();
        let a = store.create();
        let b = store.create();
        assert_eq!(a.len(), META_ID_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn attach_then_consume_once() {
        let store = MetaStore::default();
        let id = store.create();

        assert!(store.attach_response(&id, headers()));
        assert_eq!(store.consume(&id), Some(headers()));
        assert_eq!(store.consume(&id), None);
        assert!(!store.contains(&id));
    }

    #[tokio::test]
    async fn response_is_write_once() {
        let store = MetaStore::default();
        let id = store.create();
        assert!(store.attach_response(&id, headers()));

        let mut other = HeaderSet::new();
        other.insert("sec-websocket-accept", "ABC");
        assert!(!store.attach_response(&id, other));
        assert_eq!(store.consume(&id), Some(headers()));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_errors() {
        let store = MetaStore::default();
        assert!(!store.attach_response("missing", headers()));
        assert_eq!(store.consume("missing"), None);

        let id = store.create();
        assert_eq!(store.consume(&id), None, "never attached");
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired_entries() {
        let store = MetaStore::new(Duration::from_secs(30));
        let old = store.create();
        time::advance(Duration::from_secs(20)).await;
        let young = store.create();
        time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.sweep_expired(Instant::now()), 1);
        assert!(!store.contains(&old));
        assert!(store.contains(&young));
        assert!(!store.attach_response(&old, headers()), "late attach is dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_expires_abandoned_entries() {
        let store = MetaStore::new(Duration::from_secs(30));
        let shutdown = Shutdown::new();
        let handle = store.start_sweeper(Duration::from_secs(1), shutdown.subscribe());

        let id = store.create();
        time::sleep(Duration::from_secs(29)).await;
        assert!(store.contains(&id));

        time::sleep(Duration::from_secs(3)).await;
        assert!(!store.contains(&id));

        shutdown.trigger();
        handle.await.unwrap();
    }
}
