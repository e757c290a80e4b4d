use std::io::BufRead;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::snapshot::{SequenceId, Snapshot};
use crate::speed::{RateTracker, TrackerConfig};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("reading recording")]
    Io(#[from] std::io::Error),
}

/// One recorded snapshot; `t_ms` is relative to the start of the recording.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: SequenceId,
    pub t_ms: u64,
    pub value: i64,
    #[serde(default)]
    pub first: bool,
    #[serde(default)]
    pub finished: bool,
}

impl Record {
    pub fn to_snapshot(&self, origin: Instant) -> Snapshot {
        Snapshot {
            id: self.id,
            time: origin + Duration::from_millis(self.t_ms),
            value: self.value,
            is_first: self.first,
            is_finished: self.finished,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RateRow {
    pub id: SequenceId,
    pub t_ms: u64,
    pub value: i64,
    pub rate: f64,
}

pub fn parse_records<R: BufRead>(reader: R) -> Result<Vec<Record>, ReplayError> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let rec = serde_json::from_str::<Record>(trimmed)
            .map_err(|source| ReplayError::Parse { line: idx + 1, source })?;
        out.push(rec);
    }
    debug!(records = out.len(), "Parsed recording");
    Ok(out)
}

pub fn run(records: &[Record], config: TrackerConfig) -> Vec<RateRow> {
    let origin = Instant::now();
    let mut tracker = RateTracker::new(config);
    records
        .iter()
        .map(|rec| RateRow {
            id: rec.id,
            t_ms: rec.t_ms,
            value: rec.value,
            rate: tracker.current_rate(&rec.to_snapshot(origin)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDING: &str = r#"
# id, time, value
{"id": 1, "t_ms": 0, "value": 0, "first": true}
{"id": 2, "t_ms": 1000, "value": 100}
{"id": 3, "t_ms": 1100, "value": 400}
{"id": 3, "t_ms": 1100, "value": 400}

{"id": 4, "t_ms": 10000, "value": 1000, "finished": true}
"#;

    #[test]
    fn parses_and_skips_comments() {
        let recs = parse_records(RECORDING.as_bytes()).unwrap();
        assert_eq!(recs.len(), 5);
        assert!(recs[0].first);
        assert!(!recs[1].first);
        assert!(recs[4].finished);
    }

    #[test]
    fn replays_through_tracker() {
        let recs = parse_records(RECORDING.as_bytes()).unwrap();
        let rows = run(&recs, TrackerConfig::default());
        let rates: Vec<f64> = rows.iter().map(|r| r.rate).collect();
        assert_eq!(rates, vec![0.0, 100.0, 100.0, 100.0, 100.0]);
    }

    #[test]
    fn parse_error_carries_line() {
        let input = "{\"id\": 1, \"t_ms\": 0, \"value\": 0}\nnot json\n";
        match parse_records(input.as_bytes()) {
            Err(ReplayError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rows_serialize() {
        let row = RateRow { id: 2, t_ms: 1000, value: 10, rate: 10.0 };
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":2,"t_ms":1000,"value":10,"rate":10.0}"#);
    }
}
