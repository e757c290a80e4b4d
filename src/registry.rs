use std::hash::Hash;

use dashmap::DashMap;
use tracing::debug;

use crate::snapshot::Snapshot;
use crate::speed::{RateTracker, TrackerConfig};

/// Rate trackers keyed by progress source. Each key's tracker is only touched
/// under its shard lock, so callers on different threads never interleave an update.
pub struct TrackerRegistry<K: Eq + Hash> {
    config: TrackerConfig,
    trackers: DashMap<K, RateTracker>,
}

impl<K: Eq + Hash + Clone> TrackerRegistry<K> {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config, trackers: DashMap::new() }
    }

    pub fn current_rate(&self, key: &K, snap: &Snapshot) -> f64 {
        if let Some(mut tracker) = self.trackers.get_mut(key) {
            return tracker.current_rate(snap);
        }
        let mut tracker = self
            .trackers
            .entry(key.clone())
            .or_insert_with(|| RateTracker::new(self.config.clone()));
        tracker.current_rate(snap)
    }

    /// Last smoothed value for `key`, if a tracker exists.
    pub fn average(&self, key: &K) -> Option<f64> {
        self.trackers.get(key).map(|t| t.average())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.trackers.contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<RateTracker> {
        self.trackers.remove(key).map(|(_, t)| t)
    }

    pub fn keys(&self) -> Vec<K> {
        self.trackers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn clear(&self) {
        debug!(count = self.trackers.len(), "Dropping all rate trackers");
        self.trackers.clear();
    }
}

impl<K: Eq + Hash + Clone> Default for TrackerRegistry<K> {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
