use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ewma::{AverageKind, MovingAverage, DEFAULT_AGE};
use crate::snapshot::{SequenceId, Snapshot};

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Snapshots closer than this to the last sample do not produce a new one.
    #[serde(with = "millis")]
    pub min_interval: Duration,
    pub average: AverageKind,
    pub age: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            average: AverageKind::default(),
            age: DEFAULT_AGE,
        }
    }
}

impl TrackerConfig {
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_average(mut self, average: AverageKind) -> Self {
        self.average = average;
        self
    }

    pub fn with_age(mut self, age: f64) -> Self {
        self.age = age;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Tracking,
    Finished,
}

#[derive(Copy, Clone, Debug)]
struct Point {
    value: i64,
    time: Instant,
}

#[derive(Copy, Clone, Debug)]
struct Run {
    start: Point,
    previous: Point,
}

/// Turns an ordered stream of snapshots into a smoothed rate in units per second.
///
/// Zero doubles as "no estimate yet": it is returned on a reset, before the
/// first sample lands, and whenever elapsed time is not positive.
pub struct RateTracker {
    config: TrackerConfig,
    average: Box<dyn MovingAverage>,
    run: Option<Run>,
    last_id: SequenceId,
    finished: bool,
}

impl RateTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let average = config.average.build(config.age);
        Self { config, average, run: None, last_id: 0, finished: false }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> TrackerState {
        match self.run {
            None => TrackerState::Uninitialized,
            Some(_) if self.finished => TrackerState::Finished,
            Some(_) => TrackerState::Tracking,
        }
    }

    /// Current smoothed value without feeding a snapshot.
    pub fn average(&self) -> f64 {
        self.average.value()
    }

    pub fn current_rate(&mut self, snap: &Snapshot) -> f64 {
        let run = match self.run {
            Some(run) if !snap.is_first && snap.id >= self.last_id => run,
            _ => {
                self.reset(snap);
                return 0.0;
            }
        };
        self.finished = snap.is_finished;

        if snap.id == self.last_id {
            trace!(id = snap.id, "duplicate snapshot");
            return self.average.value();
        }

        if snap.is_finished {
            let rate = lifetime_rate(run.start, snap);
            trace!(id = snap.id, rate, "finished, lifetime average");
            return rate;
        }

        let dur = snap.time.saturating_duration_since(run.previous.time);
        if dur < self.config.min_interval || dur.is_zero() {
            trace!(id = snap.id, elapsed_ms = dur.as_millis() as u64, "debounced");
            return self.average.value();
        }

        let diff = (snap.value as f64 - run.previous.value as f64).abs();
        let sample = diff / dur.as_secs_f64();
        self.run = Some(Run { start: run.start, previous: Point { value: snap.value, time: snap.time } });
        self.last_id = snap.id;
        self.average.add(sample);
        let rate = self.average.value();
        trace!(id = snap.id, sample, rate, "sampled");
        rate
    }

    fn reset(&mut self, snap: &Snapshot) {
        trace!(id = snap.id, previous_id = self.last_id, value = snap.value, "reset");
        let point = Point { value: snap.value, time: snap.time };
        self.run = Some(Run { start: point, previous: point });
        self.last_id = snap.id;
        self.finished = snap.is_finished;
        self.average = self.config.average.build(self.config.age);
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl fmt::Debug for RateTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateTracker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("last_id", &self.last_id)
            .field("average", &self.average.value())
            .finish()
    }
}

fn lifetime_rate(start: Point, snap: &Snapshot) -> f64 {
    let elapsed = snap.time.saturating_duration_since(start.time);
    if elapsed.is_zero() {
        return 0.0;
    }
    let rate = (snap.value as f64 - start.value as f64).abs() / elapsed.as_secs_f64();
    if rate.is_finite() {
        rate
    } else {
        0.0
    }
}
