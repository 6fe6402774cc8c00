//! Short history of server snapshots for smoothing remote players.

use shared::{PlayerId, PlayerSnapshot, StateSnapshot, SNAPSHOT_BUFFER_SIZE};
use std::collections::VecDeque;

/// Fixed-capacity ring of the most recent snapshots, oldest first.
///
/// Only remote players are drawn from here. The local player is always shown
/// at its predicted pose.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<StateSnapshot>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::with_capacity(SNAPSHOT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a snapshot, returning the evicted oldest one when full.
    pub fn push(&mut self, snapshot: StateSnapshot) -> Option<StateSnapshot> {
        let evicted = if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front()
        } else {
            None
        };
        self.snapshots.push_back(snapshot);
        evicted
    }

    pub fn latest(&self) -> Option<&StateSnapshot> {
        self.snapshots.back()
    }

    pub fn previous(&self) -> Option<&StateSnapshot> {
        let len = self.snapshots.len();
        if len < 2 {
            return None;
        }
        self.snapshots.get(len - 2)
    }

    /// A remote player's entries in the two newest snapshots, `(older, newer)`.
    pub fn interpolation_pair(
        &self,
        player_id: PlayerId,
    ) -> Option<(&PlayerSnapshot, &PlayerSnapshot)> {
        let older = self.previous()?.player(player_id)?;
        let newer = self.latest()?.player(player_id)?;
        Some((older, newer))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateSnapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new()
    }
}
