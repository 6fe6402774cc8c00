//! Wire protocol between client and server.
//!
//! Every datagram carries exactly one bincode-encoded [`Packet`].

use crate::input::InputSample;
use crate::movement::Pose;
use crate::snapshot::{PlayerId, StateSnapshot};
use crate::MAX_DATAGRAM_SIZE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bumped whenever a shared constant or the packet layout changes. Client and
/// server running different movement constants would drift apart forever.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    // Client -> server
    Connect {
        protocol_version: u32,
    },
    Input(InputSample),
    Disconnect,

    // Server -> client
    Connected {
        player_id: PlayerId,
        spawn: Pose,
        tick_rate_hz: u32,
    },
    Snapshot(StateSnapshot),
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode packet: {0}")]
    Decode(#[source] bincode::Error),
    #[error("encoded packet is {size} bytes, over the datagram limit")]
    TooLarge { size: usize },
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let data = bincode::serialize(packet).map_err(ProtocolError::Encode)?;
    if data.len() > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::TooLarge { size: data.len() });
    }
    Ok(data)
}

pub fn decode(data: &[u8]) -> Result<Packet, ProtocolError> {
    bincode::deserialize(data).map_err(ProtocolError::Decode)
}
