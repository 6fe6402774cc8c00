//! Code shared by the client and the server.
//!
//! Everything in this crate runs on both sides of the connection. The
//! movement code in particular must give bit-identical results on the client
//! (prediction and replay) and on the server (authoritative simulation), so
//! every constant that feeds it lives here and changing any of them requires
//! bumping [`protocol::PROTOCOL_VERSION`].

pub mod collision;
pub mod input;
pub mod layout;
pub mod math;
pub mod movement;
pub mod protocol;
pub mod snapshot;
pub mod time;

pub use collision::{CollisionContext, Obstacle, ObstacleId, ObstacleKind, ObstacleMap};
pub use input::{validate_input, InputRejection, InputSample, MovementFlags};
pub use layout::{Layout, LayoutError, DEFAULT_LAYOUT};
pub use math::{Quat, Vec3};
pub use movement::{advance, move_position, orient, Pose};
pub use protocol::{decode, encode, Packet, ProtocolError, PROTOCOL_VERSION};
pub use snapshot::{GameplayPayload, PayloadValue, PlayerId, PlayerSnapshot, StateSnapshot};

/// Server ticks and client input samples per second.
pub const TICK_RATE_HZ: u32 = 20;
pub const TICK_PERIOD_MS: u64 = 50;
/// Fixed simulation step in seconds. Never a measured frame delta.
pub const TICK_DT: f64 = 0.05;

/// Base walking speed in world units per second.
pub const MOVE_SPEED: f64 = 4.0;
pub const MAX_SPEED_MULTIPLIER: f64 = 4.0;

pub const PLAYER_RADIUS: f64 = 0.35;
/// Penetration depth a player may have into a solid box before it counts as blocked.
pub const COLLISION_TOLERANCE: f64 = 1e-4;

/// The playable area spans `-WORLD_HALF_EXTENT..=WORLD_HALF_EXTENT` on X and Z.
pub const WORLD_HALF_EXTENT: f64 = 64.0;
pub const WORLD_FLOOR_Y: f64 = 0.0;
pub const WORLD_CEILING_Y: f64 = 8.0;

/// Edge length of one layout cell in world units.
pub const CELL_SIZE: f64 = 2.0;

/// Number of snapshots the client keeps for remote-player smoothing.
pub const SNAPSHOT_BUFFER_SIZE: usize = 5;
/// Unacknowledged samples the client keeps before dropping the oldest (3 seconds).
pub const PENDING_QUEUE_CAPACITY: usize = 60;
/// How far past `last_processed_seq` an input may claim to be.
pub const MAX_INPUT_LEAD: u64 = 1200;
pub const MAX_LOOK_YAW: f64 = std::f64::consts::TAU;

pub const MAX_DATAGRAM_SIZE: usize = 8192;
