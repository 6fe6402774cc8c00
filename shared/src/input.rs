//! Input samples and the server-side checks applied to them.

use crate::{MAX_INPUT_LEAD, MAX_LOOK_YAW};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MovementFlags {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl MovementFlags {
    pub fn is_idle(&self) -> bool {
        !(self.forward || self.backward || self.left || self.right)
    }
}

/// One sampled frame of player controls.
///
/// `seq` starts at 1 and increases by one per sample on each connection.
/// `client_timestamp` is for diagnostics only; the simulation never reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSample {
    pub seq: u64,
    pub flags: MovementFlags,
    pub look_yaw: f64,
    pub client_timestamp: i64,
}

/// Why the server discarded a sample. Discarding never affects other players.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputRejection {
    #[error("sequence number 0 is never issued")]
    ZeroSequence,
    #[error("sample {seq} already covered by last processed {last}")]
    Stale { seq: u64, last: u64 },
    #[error("sample {seq} is too far ahead of last processed {last}")]
    SequenceTooFarAhead { seq: u64, last: u64 },
    #[error("look yaw is not a finite number")]
    NonFiniteYaw,
    #[error("look yaw {0} outside the accepted range")]
    YawOutOfRange(f64),
}

impl InputRejection {
    /// Stale and duplicate samples are routine under retransmission and
    /// reordering; everything else means the sender is misbehaving.
    pub fn is_expected(&self) -> bool {
        matches!(self, InputRejection::Stale { .. })
    }
}

/// Decides whether `sample` may be applied on top of `last_processed_seq`.
pub fn validate_input(sample: &InputSample, last_processed_seq: u64) -> Result<(), InputRejection> {
    if sample.seq == 0 {
        return Err(InputRejection::ZeroSequence);
    }
    if sample.seq <= last_processed_seq {
        return Err(InputRejection::Stale {
            seq: sample.seq,
            last: last_processed_seq,
        });
    }
    if sample.seq - last_processed_seq > MAX_INPUT_LEAD {
        return Err(InputRejection::SequenceTooFarAhead {
            seq: sample.seq,
            last: last_processed_seq,
        });
    }
    if !sample.look_yaw.is_finite() {
        return Err(InputRejection::NonFiniteYaw);
    }
    if sample.look_yaw.abs() > MAX_LOOK_YAW {
        return Err(InputRejection::YawOutOfRange(sample.look_yaw));
    }
    Ok(())
}
