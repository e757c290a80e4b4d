//! Smoothed rate estimation for progress counters.
//!
//! A [`RateTracker`] consumes ordered [`Snapshot`]s of a counter and answers
//! "how fast is it moving" with an exponentially weighted average of
//! instantaneous rates, debounced to a minimum sampling interval. When the
//! source reports completion it switches to the lifetime average instead.

pub mod element;
pub mod ewma;
pub mod registry;
pub mod replay;
pub mod snapshot;
pub mod source;
pub mod speed;

pub use element::{float_speed, SpeedElement, Units};
pub use ewma::{AverageKind, MovingAverage, SimpleEwma, VariableEwma};
pub use registry::TrackerRegistry;
pub use snapshot::{SequenceId, Snapshot};
pub use source::Progress;
pub use speed::{RateTracker, TrackerConfig, TrackerState, DEFAULT_MIN_INTERVAL};
