//! Authoritative player state.
//!
//! Only the tick mutates what lives here. Network code never touches a
//! player's pose directly; it can only enqueue samples in the client's inbox.

use log::{debug, info};
use shared::{
    advance, validate_input, GameplayPayload, InputSample, Layout, ObstacleMap, PayloadValue,
    PlayerId, PlayerSnapshot, Pose, Vec3,
};
use std::collections::BTreeMap;
use std::ops::AddAssign;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthoritativePlayerState {
    pub pose: Pose,
    /// Set by gameplay effects; applied to every step of this player.
    pub speed_multiplier: f64,
    /// Highest sample sequence applied so far. Never decreases.
    pub last_processed_seq: u64,
    pub payload: GameplayPayload,
}

impl AuthoritativePlayerState {
    pub fn new(spawn: Vec3) -> Self {
        let mut payload = GameplayPayload::new();
        payload.set("alive", PayloadValue::Bool(true));
        payload.set("visible", PayloadValue::Bool(true));
        Self {
            pose: Pose::at(spawn),
            speed_multiplier: 1.0,
            last_processed_seq: 0,
            payload,
        }
    }

    pub fn to_snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            position: self.pose.position,
            orientation: self.pose.orientation,
            speed_multiplier: self.speed_multiplier,
            last_processed_seq: self.last_processed_seq,
            payload: self.payload.clone(),
        }
    }
}

/// What happened to one batch of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    /// Duplicates and samples at or below `last_processed_seq`.
    pub stale: usize,
    /// Malformed samples.
    pub rejected: usize,
}

impl AddAssign for ApplyReport {
    fn add_assign(&mut self, other: ApplyReport) {
        self.applied += other.applied;
        self.stale += other.stale;
        self.rejected += other.rejected;
    }
}

#[derive(Debug, Clone)]
pub struct GameState {
    players: BTreeMap<PlayerId, AuthoritativePlayerState>,
    obstacles: ObstacleMap,
    spawn_points: Vec<Vec3>,
}

impl GameState {
    pub fn new(layout: Layout) -> Self {
        Self {
            players: BTreeMap::new(),
            obstacles: layout.obstacles,
            spawn_points: layout.spawn_points,
        }
    }

    /// Spawns a player, cycling through the layout's spawn points.
    pub fn add_player(&mut self, player_id: PlayerId) -> Pose {
        let spawn = if self.spawn_points.is_empty() {
            Vec3::ZERO
        } else {
            let index = player_id.saturating_sub(1) as usize % self.spawn_points.len();
            self.spawn_points[index]
        };

        let state = AuthoritativePlayerState::new(spawn);
        let pose = state.pose;
        info!(
            "Added player {} at ({:.2}, {:.2}, {:.2})",
            player_id, spawn.x, spawn.y, spawn.z
        );
        self.players.insert(player_id, state);
        pose
    }

    pub fn remove_player(&mut self, player_id: &PlayerId) -> bool {
        let removed = self.players.remove(player_id).is_some();
        if removed {
            info!("Removed player {}", player_id);
        }
        removed
    }

    /// Applies one tick's worth of samples for a player.
    ///
    /// Samples are sorted by sequence first, so network reordering inside a
    /// tick is harmless. Anything at or below `last_processed_seq` is skipped,
    /// which makes duplicates a no-op. Malformed samples are dropped one by one
    /// without affecting the rest of the batch.
    pub fn apply_inputs(&mut self, player_id: PlayerId, mut samples: Vec<InputSample>) -> ApplyReport {
        let mut report = ApplyReport::default();
        let Some(player) = self.players.get_mut(&player_id) else {
            return report;
        };

        samples.sort_by_key(|sample| sample.seq);

        for sample in &samples {
            match validate_input(sample, player.last_processed_seq) {
                Ok(()) => {
                    player.pose = advance(
                        player.pose,
                        sample,
                        player.speed_multiplier,
                        Some(&self.obstacles),
                    );
                    player.last_processed_seq = sample.seq;
                    report.applied += 1;
                }
                Err(rejection) if rejection.is_expected() => {
                    report.stale += 1;
                }
                Err(rejection) => {
                    debug!("Dropping input from player {}: {}", player_id, rejection);
                    report.rejected += 1;
                }
            }
        }

        report
    }

    pub fn set_speed_multiplier(&mut self, player_id: PlayerId, multiplier: f64) -> bool {
        match self.players.get_mut(&player_id) {
            Some(player) => {
                player.speed_multiplier = multiplier;
                true
            }
            None => false,
        }
    }

    pub fn set_payload_field(&mut self, player_id: PlayerId, key: &str, value: PayloadValue) -> bool {
        match self.players.get_mut(&player_id) {
            Some(player) => {
                player.payload.set(key, value);
                true
            }
            None => false,
        }
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&AuthoritativePlayerState> {
        self.players.get(&player_id)
    }

    pub fn obstacles(&self) -> &ObstacleMap {
        &self.obstacles
    }

    /// Door and dynamic wall state, driven by the maze subsystem.
    pub fn obstacles_mut(&mut self) -> &mut ObstacleMap {
        &mut self.obstacles
    }

    pub fn snapshot_players(&self) -> BTreeMap<PlayerId, PlayerSnapshot> {
        self.players
            .iter()
            .map(|(id, player)| (*id, player.to_snapshot()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
