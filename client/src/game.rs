//! Client-side prediction and reconciliation for the local player
//!
//! The local player is always displayed at its predicted pose: the last
//! authoritative pose from the server with every unacknowledged sample folded
//! on top through the shared movement function. Remote players are taken from
//! snapshots as-is.

use crate::pending::{PendingError, PendingQueue};
use crate::snapshot_buffer::SnapshotBuffer;
use log::{debug, trace};
use shared::{
    advance, CollisionContext, InputSample, ObstacleMap, PlayerId, PlayerSnapshot, Pose,
    StateSnapshot,
};

/// Below this distance a reconciliation is not counted as a visible correction.
pub const CORRECTION_EPSILON: f64 = 1e-6;

/// What the local player is rendered at, plus what it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalPredictedState {
    /// Authoritative pose from the most recent snapshot (or the spawn pose).
    pub base: Pose,
    /// `base` with every pending sample applied.
    pub predicted: Pose,
}

/// Result of handing a snapshot to [`ClientGameState::apply_server_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Not newer than a snapshot already seen; ignored entirely.
    Stale { seq: u64, latest: u64 },
    /// Buffered, but the local player is not in it yet.
    NotSpawned,
    Reconciled {
        /// Pending samples confirmed by this snapshot.
        acknowledged: usize,
        /// Pending samples replayed on top of the authoritative pose.
        replayed: usize,
        /// How far the displayed position moved because of this snapshot.
        correction: f64,
        /// Client timestamp of the newest acknowledged sample, if still known.
        acknowledged_sent_at: Option<i64>,
    },
}

impl ReconcileOutcome {
    pub fn is_correction(&self) -> bool {
        matches!(self, ReconcileOutcome::Reconciled { correction, .. } if *correction > CORRECTION_EPSILON)
    }
}

pub struct ClientGameState {
    player_id: Option<PlayerId>,
    local: LocalPredictedState,
    pending: PendingQueue,
    snapshots: SnapshotBuffer,
    /// Last multiplier the server reported for us; used for prediction and replay.
    speed_multiplier: f64,
    obstacles: Option<ObstacleMap>,
    latest_snapshot_seq: u64,
}

impl ClientGameState {
    /// State without collision context. Prediction only clamps to world bounds.
    pub fn new() -> Self {
        Self {
            player_id: None,
            local: LocalPredictedState::default(),
            pending: PendingQueue::new(),
            snapshots: SnapshotBuffer::new(),
            speed_multiplier: 1.0,
            obstacles: None,
            latest_snapshot_seq: 0,
        }
    }

    /// State predicting against the client's own copy of the maze.
    pub fn with_obstacles(obstacles: ObstacleMap) -> Self {
        Self {
            obstacles: Some(obstacles),
            ..Self::new()
        }
    }

    /// Starts a fresh session as `player_id` at the server-assigned spawn.
    pub fn on_connected(&mut self, player_id: PlayerId, spawn: Pose) {
        self.player_id = Some(player_id);
        self.local = LocalPredictedState {
            base: spawn,
            predicted: spawn,
        };
        self.pending.clear();
        self.snapshots.clear();
        self.speed_multiplier = 1.0;
        self.latest_snapshot_seq = 0;
    }

    fn collision(&self) -> Option<&dyn CollisionContext> {
        self.obstacles
            .as_ref()
            .map(|obstacles| obstacles as &dyn CollisionContext)
    }

    /// Applies a freshly sampled input to the predicted pose and keeps it
    /// pending until the server confirms it. The flags are applied exactly as
    /// given.
    pub fn apply_prediction(&mut self, sample: InputSample) -> Result<Pose, PendingError> {
        let predicted = advance(
            self.local.predicted,
            &sample,
            self.speed_multiplier,
            self.collision(),
        );
        self.pending.push(sample)?;
        self.local.predicted = predicted;
        Ok(predicted)
    }

    /// Buffers an authoritative snapshot and reconciles the local player against it.
    ///
    /// Confirmed samples are dropped, the base pose is replaced with the
    /// server's, and the remaining samples are replayed in order.
    pub fn apply_server_snapshot(&mut self, snapshot: StateSnapshot) -> ReconcileOutcome {
        if snapshot.seq <= self.latest_snapshot_seq {
            return ReconcileOutcome::Stale {
                seq: snapshot.seq,
                latest: self.latest_snapshot_seq,
            };
        }
        self.latest_snapshot_seq = snapshot.seq;

        let local_entry = self
            .player_id
            .and_then(|id| snapshot.player(id))
            .cloned();
        self.snapshots.push(snapshot);

        match local_entry {
            Some(entry) => self.reconcile(&entry),
            None => ReconcileOutcome::NotSpawned,
        }
    }

    fn reconcile(&mut self, entry: &PlayerSnapshot) -> ReconcileOutcome {
        let shown_before = self.local.predicted;
        let acknowledged_sent_at = self
            .pending
            .get(entry.last_processed_seq)
            .map(|sample| sample.client_timestamp);

        let acknowledged = self.pending.acknowledge(entry.last_processed_seq);
        self.speed_multiplier = entry.speed_multiplier;

        let base = entry.pose();
        let collision = self.collision();
        let mut predicted = base;
        for sample in self.pending.iter() {
            predicted = advance(predicted, sample, self.speed_multiplier, collision);
        }
        let replayed = self.pending.len();

        self.local = LocalPredictedState { base, predicted };

        let correction = shown_before.position.distance(&predicted.position);
        if correction > CORRECTION_EPSILON {
            debug!(
                "Reconciled with correction {:.4} ({} acknowledged, {} replayed)",
                correction, acknowledged, replayed
            );
        } else {
            trace!(
                "Reconciled cleanly ({} acknowledged, {} replayed)",
                acknowledged,
                replayed
            );
        }

        ReconcileOutcome::Reconciled {
            acknowledged,
            replayed,
            correction,
            acknowledged_sent_at,
        }
    }

    /// Players other than us from the newest snapshot, untouched.
    pub fn remote_players(&self) -> impl Iterator<Item = (PlayerId, &PlayerSnapshot)> {
        let local = self.player_id;
        self.snapshots
            .latest()
            .into_iter()
            .flat_map(|snapshot| snapshot.players.iter())
            .filter(move |(id, _)| Some(**id) != local)
            .map(|(id, player)| (*id, player))
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn predicted_pose(&self) -> Pose {
        self.local.predicted
    }

    pub fn local_state(&self) -> &LocalPredictedState {
        &self.local
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    pub fn snapshots(&self) -> &SnapshotBuffer {
        &self.snapshots
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    pub fn latest_snapshot_seq(&self) -> u64 {
        self.latest_snapshot_seq
    }

    /// Door and dynamic wall changes from the maze subsystem land here.
    pub fn obstacles_mut(&mut self) -> Option<&mut ObstacleMap> {
        self.obstacles.as_mut()
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}
