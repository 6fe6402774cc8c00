//! One authoritative server tick, without any I/O.

use crate::client_manager::ClientManager;
use crate::game::{ApplyReport, GameState};
use shared::StateSnapshot;

/// Result of one tick: the snapshot to broadcast plus input statistics.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: StateSnapshot,
    pub inputs: ApplyReport,
}

/// Owns the snapshot counter. Each call to [`TickLoop::step`] produces exactly
/// one snapshot whose `seq` is the previous one plus one.
#[derive(Debug, Default)]
pub struct TickLoop {
    snapshot_seq: u64,
}

impl TickLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the most recently produced snapshot (0 before the first tick).
    pub fn snapshot_seq(&self) -> u64 {
        self.snapshot_seq
    }

    /// Drains every client's inbox into the authoritative state, then
    /// assembles the snapshot of all players.
    ///
    /// A player without samples this tick keeps its state unchanged.
    pub fn step(
        &mut self,
        clients: &mut ClientManager,
        game: &mut GameState,
        timestamp: i64,
    ) -> TickReport {
        let mut inputs = ApplyReport::default();

        for (player_id, samples) in clients.drain_inboxes() {
            if samples.is_empty() {
                continue;
            }
            inputs += game.apply_inputs(player_id, samples);
        }

        self.snapshot_seq += 1;
        let snapshot = StateSnapshot {
            seq: self.snapshot_seq,
            timestamp,
            players: game.snapshot_players(),
        };

        TickReport { snapshot, inputs }
    }
}
