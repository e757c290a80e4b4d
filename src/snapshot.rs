use std::time::Instant;

pub type SequenceId = u64;

/// One observation of a progress counter.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub id: SequenceId,
    pub time: Instant,
    pub value: i64,
    pub is_first: bool,
    pub is_finished: bool,
}

impl Snapshot {
    pub fn new(id: SequenceId, time: Instant, value: i64) -> Self {
        Self { id, time, value, is_first: false, is_finished: false }
    }

    pub fn first(mut self) -> Self {
        self.is_first = true;
        self
    }

    pub fn finished(mut self) -> Self {
        self.is_finished = true;
        self
    }
}
