//! Connection statistics and quality rating.

use std::fmt;

/// Smoothing factor for the round-trip and loss averages.
const SMOOTHING: f64 = 0.1;

const DEGRADED_RTT_MS: f64 = 150.0;
const POOR_RTT_MS: f64 = 300.0;
const DEGRADED_LOSS: f64 = 0.02;
const POOR_LOSS: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionQuality {
    Good,
    Degraded,
    Poor,
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionQuality::Good => "good",
            ConnectionQuality::Degraded => "degraded",
            ConnectionQuality::Poor => "poor",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub inputs_sent: u64,
    /// Inputs thrown away by simulated upstream loss.
    pub inputs_dropped: u64,
    pub snapshots_received: u64,
    /// Snapshot sequence numbers that never arrived.
    pub snapshots_missed: u64,
    /// Snapshots that arrived after a newer one.
    pub snapshots_stale: u64,
    pub corrections: u64,
    pub last_correction: f64,
    pub max_correction: f64,
    /// Pending samples dropped unacknowledged.
    pub pending_overflow: u64,
    /// Smoothed input-to-acknowledgement time in milliseconds.
    pub rtt_ms: Option<f64>,
    loss_average: f64,
    last_snapshot_seq: Option<u64>,
    overflowing: bool,
}

impl NetworkStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a snapshot that was newer than every previous one.
    pub fn record_snapshot(&mut self, seq: u64) {
        let missed = match self.last_snapshot_seq {
            Some(last) => seq.saturating_sub(last + 1),
            None => 0,
        };
        self.last_snapshot_seq = Some(seq);
        self.snapshots_received += 1;
        self.snapshots_missed += missed;

        let lost_fraction = missed as f64 / (missed + 1) as f64;
        self.loss_average += SMOOTHING * (lost_fraction - self.loss_average);
    }

    pub fn record_stale_snapshot(&mut self) {
        self.snapshots_stale += 1;
    }

    pub fn record_rtt(&mut self, sample_ms: f64) {
        if !sample_ms.is_finite() || sample_ms < 0.0 {
            return;
        }
        self.rtt_ms = Some(match self.rtt_ms {
            Some(rtt) => rtt + SMOOTHING * (sample_ms - rtt),
            None => sample_ms,
        });
    }

    pub fn record_correction(&mut self, distance: f64) {
        self.corrections += 1;
        self.last_correction = distance;
        self.max_correction = self.max_correction.max(distance);
    }

    /// Updates the overflow condition from the pending queue. Overflow stays
    /// reported until the queue has drained below half its capacity.
    pub fn record_pending(&mut self, len: usize, capacity: usize, overflowed_total: u64) {
        if overflowed_total > self.pending_overflow {
            self.pending_overflow = overflowed_total;
            self.overflowing = true;
        } else if len < capacity / 2 {
            self.overflowing = false;
        }
    }

    /// Smoothed fraction of snapshots lost downstream.
    pub fn loss_rate(&self) -> f64 {
        self.loss_average
    }

    pub fn connection_quality(&self) -> ConnectionQuality {
        let rtt = self.rtt_ms.unwrap_or(0.0);

        if self.overflowing || self.loss_average >= POOR_LOSS || rtt >= POOR_RTT_MS {
            ConnectionQuality::Poor
        } else if self.loss_average >= DEGRADED_LOSS || rtt >= DEGRADED_RTT_MS {
            ConnectionQuality::Degraded
        } else {
            ConnectionQuality::Good
        }
    }
}
