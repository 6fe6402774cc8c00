//! Snapshot types broadcast by the server once per tick.

use crate::math::{Quat, Vec3};
use crate::movement::Pose;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type PlayerId = u32;

/// A single gameplay-defined value riding along in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PayloadValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Gameplay fields (alive, visible, power state, ...) attached to a player.
///
/// The synchronization code carries this around without looking inside, so
/// new gameplay features never change the fixed snapshot fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameplayPayload(BTreeMap<String, PayloadValue>);

impl GameplayPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: PayloadValue) -> Option<PayloadValue> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PayloadValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Public view of one player's authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub position: Vec3,
    pub orientation: Quat,
    pub speed_multiplier: f64,
    /// Highest input sequence the server has applied for this player.
    pub last_processed_seq: u64,
    pub payload: GameplayPayload,
}

impl PlayerSnapshot {
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }
}

/// Every connected player's state at one server tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Tick counter, one per server tick. Unrelated to input sequence numbers.
    pub seq: u64,
    /// Server wall clock in milliseconds.
    pub timestamp: i64,
    pub players: BTreeMap<PlayerId, PlayerSnapshot>,
}

impl StateSnapshot {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSnapshot> {
        self.players.get(&id)
    }
}
