//! Profile storage contract and an in-memory implementation.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use ngm_core::{ConfigHandle, ProfileTarget};

use crate::error::ProfileStoreError;

/// Destination for scraped profiles.
///
/// Called once per successful scrape cycle with the target identity, the
/// nominal sample timestamp (unix seconds) and the raw payload. Errors are
/// logged by the caller and never stop scheduling.
pub trait ProfileStore: Send + Sync {
    fn add_profile(
        &self,
        target: &ProfileTarget,
        ts: i64,
        data: &[u8],
    ) -> Result<(), ProfileStoreError>;
}

/// A stored profile sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProfile {
    pub ts: i64,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct Profiles {
    by_target: HashMap<ProfileTarget, Vec<StoredProfile>>,
    closed: bool,
}

/// Process-lifetime profile storage.
///
/// Samples older than the configured retention, relative to the newest
/// sample of the same target, are pruned on insert.
pub struct MemProfileStore {
    inner: Mutex<Profiles>,
    config: ConfigHandle,
}

impl MemProfileStore {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            inner: Mutex::new(Profiles::default()),
            config,
        }
    }

    /// Samples stored for `target`, in insertion order.
    pub fn profiles(&self, target: &ProfileTarget) -> Vec<StoredProfile> {
        self.inner
            .lock()
            .by_target
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    pub fn targets(&self) -> Vec<ProfileTarget> {
        let mut targets: Vec<ProfileTarget> =
            self.inner.lock().by_target.keys().cloned().collect();
        targets.sort();
        targets
    }

    /// Total number of stored samples across all targets.
    pub fn len(&self) -> usize {
        self.inner.lock().by_target.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject all further writes. Stored samples stay readable.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        debug!("profile store closed");
    }
}

impl ProfileStore for MemProfileStore {
    fn add_profile(
        &self,
        target: &ProfileTarget,
        ts: i64,
        data: &[u8],
    ) -> Result<(), ProfileStoreError> {
        let retention = self.config.current().data_retention().as_secs();
        let cutoff = ts.saturating_sub(i64::try_from(retention).unwrap_or(i64::MAX));

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(ProfileStoreError::Closed);
        }
        let samples = inner.by_target.entry(target.clone()).or_default();
        samples.retain(|p| p.ts >= cutoff);
        samples.push(StoredProfile {
            ts,
            data: data.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ngm_core::ContinuousProfilingConfig;

    fn test_store(retention: u64) -> MemProfileStore {
        MemProfileStore::new(ConfigHandle::new(ContinuousProfilingConfig {
            data_retention_seconds: retention,
            ..Default::default()
        }))
    }

    #[test]
    fn stores_samples_per_target_in_order() {
        let store = test_store(3600);
        let heap = ProfileTarget::new("heap", "tidb", "a:1");
        let cpu = ProfileTarget::new("profile", "tidb", "a:1");

        store.add_profile(&heap, 100, b"h1").unwrap();
        store.add_profile(&cpu, 100, b"c1").unwrap();
        store.add_profile(&heap, 160, b"h2").unwrap();

        let samples = store.profiles(&heap);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].data, b"h1");
        assert_eq!(samples[1].ts, 160);
        assert_eq!(store.len(), 3);
        assert_eq!(store.targets(), vec![heap, cpu]);
    }

    #[test]
    fn prunes_samples_outside_retention() {
        let store = test_store(60);
        let target = ProfileTarget::new("heap", "tidb", "a:1");

        store.add_profile(&target, 0, b"old").unwrap();
        store.add_profile(&target, 30, b"mid").unwrap();
        store.add_profile(&target, 90, b"new").unwrap();

        let ts: Vec<i64> = store.profiles(&target).iter().map(|p| p.ts).collect();
        assert_eq!(ts, vec![30, 90]);
    }

    #[test]
    fn retention_follows_config_updates() {
        let config = ConfigHandle::new(ContinuousProfilingConfig::default());
        let store = MemProfileStore::new(config.clone());
        let target = ProfileTarget::new("heap", "tidb", "a:1");

        store.add_profile(&target, 0, b"old").unwrap();
        store.add_profile(&target, 1_000, b"mid").unwrap();
        assert_eq!(store.profiles(&target).len(), 2);

        config
            .update_with(|c| c.data_retention_seconds = c.interval_seconds)
            .unwrap();
        store.add_profile(&target, 1_030, b"new").unwrap();

        let ts: Vec<i64> = store.profiles(&target).iter().map(|p| p.ts).collect();
        assert_eq!(ts, vec![1_000, 1_030]);
    }

    #[test]
    fn closed_store_rejects_writes() {
        let store = test_store(60);
        let target = ProfileTarget::new("heap", "tidb", "a:1");
        store.add_profile(&target, 1, b"x").unwrap();

        store.close();
        assert!(matches!(
            store.add_profile(&target, 2, b"y"),
            Err(ProfileStoreError::Closed)
        ));
        assert_eq!(store.profiles(&target).len(), 1);
    }

    #[test]
    fn unknown_target_has_no_samples() {
        let store = test_store(60);
        assert!(store.profiles(&ProfileTarget::new("heap", "pd", "b:2")).is_empty());
        assert!(store.is_empty());
    }
}
