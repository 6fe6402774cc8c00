//! Samples sent to the server but not yet reflected in a snapshot.

use shared::{InputSample, PENDING_QUEUE_CAPACITY};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PendingError {
    #[error("sample {seq} does not follow the last pending sample {last}")]
    OutOfOrder { seq: u64, last: u64 },
}

/// Ordered queue of unacknowledged samples.
///
/// Sequence numbers are strictly increasing. When the server stops
/// acknowledging, the queue keeps at most `capacity` samples and drops the
/// oldest; every drop is counted so it can be reported as poor connection
/// quality.
#[derive(Debug, Clone)]
pub struct PendingQueue {
    samples: VecDeque<InputSample>,
    capacity: usize,
    /// Highest seq ever pushed, survives acknowledgement
    last_seq: u64,
    overflowed: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::with_capacity(PENDING_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            last_seq: 0,
            overflowed: 0,
        }
    }

    pub fn push(&mut self, sample: InputSample) -> Result<(), PendingError> {
        if sample.seq <= self.last_seq {
            return Err(PendingError::OutOfOrder {
                seq: sample.seq,
                last: self.last_seq,
            });
        }

        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
            self.overflowed += 1;
        }

        self.last_seq = sample.seq;
        self.samples.push_back(sample);
        Ok(())
    }

    /// Drops every sample with `seq <= last_processed_seq`. Returns how many were dropped.
    pub fn acknowledge(&mut self, last_processed_seq: u64) -> usize {
        let before = self.samples.len();
        while self
            .samples
            .front()
            .is_some_and(|sample| sample.seq <= last_processed_seq)
        {
            self.samples.pop_front();
        }
        before - self.samples.len()
    }

    pub fn get(&self, seq: u64) -> Option<&InputSample> {
        self.samples.iter().find(|sample| sample.seq == seq)
    }

    /// Samples in ascending seq order.
    pub fn iter(&self) -> impl Iterator<Item = &InputSample> {
        self.samples.iter()
    }

    /// The newest `count` samples, oldest first.
    pub fn newest(&self, count: usize) -> impl Iterator<Item = &InputSample> {
        self.samples
            .iter()
            .skip(self.samples.len().saturating_sub(count))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Total samples dropped unacknowledged because the queue was full.
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.last_seq = 0;
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}
