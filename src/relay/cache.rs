use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::mapping::RelayMapping;
use super::store::RelayStore;

/// Read replica of the relay mapping used on the forwarding path.
///
/// The snapshot is swapped wholesale on refresh and never edited in place,
/// so readers only hold the lock long enough to clone the `Arc`.
#[derive(Default)]
pub struct RelayCache {
    snapshot: RwLock<Arc<RelayMapping>>,
    periodic_started: AtomicBool,
}

impl RelayCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<RelayMapping> {
        self.snapshot.read().clone()
    }

    pub fn lookup(&self, source_id: &str) -> Vec<u64> {
        self.snapshot.read().destinations(source_id).to_vec()
    }

    pub fn replace(&self, mapping: RelayMapping) {
        *self.snapshot.write() = Arc::new(mapping);
    }

    /// Reloads the snapshot from `store`. The file is read on the blocking
    /// pool; if that task fails the previous snapshot stays in place.
    pub async fn refresh(&self, store: &Arc<RelayStore>) {
        match store.run_blocking(|store| Ok(store.load())).await {
            Ok(mapping) => {
                debug!(
                    "relay cache refreshed sources={} links={}",
                    mapping.len(),
                    mapping.link_count()
                );
                self.replace(mapping);
            }
            Err(err) => warn!("keeping previous relay snapshot: {err}"),
        }
    }

    /// Starts the periodic refresh unless an earlier call already did.
    /// Returns the task handle only for the call that started it.
    pub fn start_periodic_refresh(
        self: &Arc<Self>,
        store: Arc<RelayStore>,
        interval: Duration,
    ) -> Option<JoinHandle<()>> {
        if self.periodic_started.swap(true, Ordering::SeqCst) {
            debug!("periodic relay refresh already running");
            return None;
        }
        Some(self.spawn_periodic_refresh(store, interval))
    }

    /// Reloads the cache from `store` every `interval` until the runtime
    /// shuts down. The first tick fires immediately.
    fn spawn_periodic_refresh(
        self: &Arc<Self>,
        store: Arc<RelayStore>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        info!(
            "starting relay cache refresh every {} seconds",
            interval.as_secs()
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                cache.refresh(&store).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;

    use super::RelayCache;
    use crate::relay::store::RelayStore;

    #[test]
    fn starts_empty() {
        let cache = RelayCache::new();
        assert!(cache.snapshot().is_empty());
        assert!(cache.lookup("1").is_empty());
    }

    #[tokio::test]
    async fn refresh_replaces_instead_of_merging() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(RelayStore::new(dir.path().join("config.json")));
        let cache = RelayCache::new();

        store.add_destination("1", 10).expect("add");
        cache.refresh(&store).await;
        assert_eq!(cache.lookup("1"), vec![10]);

        fs::write(store.path(), r#"{"relayChannels": {"2": [20]}}"#).expect("rewrite");
        cache.refresh(&store).await;

        assert!(cache.lookup("1").is_empty());
        assert_eq!(cache.lookup("2"), vec![20]);
    }

    #[tokio::test]
    async fn held_snapshot_is_unaffected_by_refresh() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(RelayStore::new(dir.path().join("config.json")));
        let cache = RelayCache::new();

        let before = cache.snapshot();
        store.add_destination("1", 10).expect("add");
        cache.refresh(&store).await;

        assert!(before.is_empty());
        assert_eq!(cache.snapshot().destinations("1"), &[10]);
    }

    #[tokio::test]
    async fn periodic_refresh_picks_up_file_edits() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(RelayStore::new(dir.path().join("config.json")));
        let cache = Arc::new(RelayCache::new());

        fs::write(store.path(), r#"{"relayChannels": {}}"#).expect("write file");
        let handle = cache
            .start_periodic_refresh(store.clone(), Duration::from_millis(20))
            .expect("first start spawns the task");

        // Swap the file in atomically so the refresh task never reads a half-written file.
        let staged = dir.path().join("staged.json");
        fs::write(&staged, r#"{"relayChannels": {"5": [50]}}"#).expect("stage file");
        fs::rename(&staged, store.path()).expect("swap file");

        let mut found = false;
        for _ in 0..50 {
            if cache.lookup("5") == vec![50] {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(found, "periodic refresh never observed the file edit");
    }

    #[tokio::test]
    async fn periodic_refresh_survives_corrupt_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(RelayStore::new(dir.path().join("config.json")));
        let cache = Arc::new(RelayCache::new());

        fs::write(store.path(), "garbage").expect("write garbage");
        let handle = cache
            .start_periodic_refresh(store.clone(), Duration::from_millis(20))
            .expect("first start spawns the task");
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(!handle.is_finished());
        handle.abort();
        assert!(cache.lookup("1").is_empty());
    }

    #[tokio::test]
    async fn periodic_refresh_starts_only_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(RelayStore::new(dir.path().join("config.json")));
        let cache = Arc::new(RelayCache::new());

        let first = cache.start_periodic_refresh(store.clone(), Duration::from_secs(30));
        let second = cache.start_periodic_refresh(store.clone(), Duration::from_secs(30));
        let third = cache.start_periodic_refresh(store, Duration::from_millis(5));

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(third.is_none());
        if let Some(handle) = first {
            handle.abort();
        }
    }
}
