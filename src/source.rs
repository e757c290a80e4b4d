use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crate::snapshot::Snapshot;
use crate::speed::{RateTracker, TrackerConfig};

/// A shared progress counter. Writers bump the value from any thread; a display
/// loop takes snapshots and asks the attached tracker for the current rate.
#[derive(Debug)]
pub struct Progress {
    value: AtomicI64,
    next_id: AtomicU64,
    first: AtomicBool,
    finished: AtomicBool,
    // held by `reset` and `snapshot_at` so a snapshot never mixes two runs
    run_edge: Mutex<()>,
    config: TrackerConfig,
    tracker: Mutex<Option<RateTracker>>,
}

impl Progress {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            value: AtomicI64::new(0),
            next_id: AtomicU64::new(0),
            first: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            run_edge: Mutex::new(()),
            config,
            tracker: Mutex::new(None),
        }
    }

    pub fn add(&self, n: i64) -> i64 {
        self.value.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Starts a new run at `value`; the next snapshot is flagged as first.
    pub fn reset(&self, value: i64) {
        let _edge = lock(&self.run_edge);
        self.value.store(value, Ordering::Relaxed);
        self.finished.store(false, Ordering::Release);
        self.first.store(true, Ordering::Release);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, time: Instant) -> Snapshot {
        let _edge = lock(&self.run_edge);
        let id = self.next_id.fetch_add(1, Ordering::AcqRel) + 1;
        Snapshot {
            id,
            time,
            value: self.value(),
            is_first: self.first.swap(false, Ordering::AcqRel),
            is_finished: self.is_finished(),
        }
    }

    /// Rate for a snapshot of this source. Several readers of one render frame
    /// can pass the same snapshot; only the first of them adds a sample.
    pub fn rate(&self, snap: &Snapshot) -> f64 {
        let mut guard = self.lock_tracker();
        guard
            .get_or_insert_with(|| RateTracker::new(self.config.clone()))
            .current_rate(snap)
    }

    /// Takes a fresh snapshot and returns it with its rate.
    pub fn tick(&self) -> (Snapshot, f64) {
        let snap = self.snapshot();
        let rate = self.rate(&snap);
        (snap, rate)
    }

    pub fn has_tracker(&self) -> bool {
        self.lock_tracker().is_some()
    }

    fn lock_tracker(&self) -> MutexGuard<'_, Option<RateTracker>> {
        lock(&self.tracker)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panic mid-update leaves plain numbers behind, still usable
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
