//! The deterministic movement function.
//!
//! The client runs this for prediction and replay, the server runs it for the
//! authoritative simulation. Both must get the same bits out for the same
//! arguments, so the code below has no hidden state, reads no clock and keeps
//! a fixed order of floating point operations. Any position change a player
//! can experience has to go through [`advance`]; adjusting a position anywhere
//! else makes prediction drift away from the server permanently.

use crate::collision::CollisionContext;
use crate::input::InputSample;
use crate::math::{Quat, Vec3};
use crate::{
    MAX_SPEED_MULTIPLIER, MOVE_SPEED, PLAYER_RADIUS, TICK_DT, WORLD_CEILING_Y, WORLD_FLOOR_Y,
    WORLD_HALF_EXTENT,
};
use serde::{Deserialize, Serialize};

/// Position plus facing of one player.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }
}

/// Moves `position` according to the movement flags and look direction of
/// `input`.
///
/// Collision is resolved per axis: X is attempted first, then Z starting from
/// the (possibly unchanged) X. A blocked axis keeps its old coordinate while
/// the other axis still moves, which is what lets players slide along walls.
/// The result is always clamped into the world bounds.
pub fn move_position(
    position: Vec3,
    input: &InputSample,
    dt: f64,
    speed_multiplier: f64,
    collision: Option<&dyn CollisionContext>,
) -> Vec3 {
    let (dx, dz) = displacement(input, dt, speed_multiplier);

    let mut x = position.x;
    let mut z = position.z;

    if dx != 0.0 {
        let candidate = x + dx;
        if !collision.is_some_and(|ctx| ctx.blocks(candidate, z, PLAYER_RADIUS)) {
            x = candidate;
        }
    }

    if dz != 0.0 {
        let candidate = z + dz;
        if !collision.is_some_and(|ctx| ctx.blocks(x, candidate, PLAYER_RADIUS)) {
            z = candidate;
        }
    }

    clamp_to_world(Vec3::new(x, position.y, z))
}

/// Facing for a horizontal look angle.
pub fn orient(look_yaw: f64) -> Quat {
    Quat::from_yaw(look_yaw)
}

/// One fixed step of a player: position from [`move_position`] with
/// [`TICK_DT`], orientation from the sample's look angle. Samples with no
/// movement flags still turn the player.
pub fn advance(
    pose: Pose,
    input: &InputSample,
    speed_multiplier: f64,
    collision: Option<&dyn CollisionContext>,
) -> Pose {
    Pose {
        position: move_position(pose.position, input, TICK_DT, speed_multiplier, collision),
        orientation: orient(input.look_yaw),
    }
}

/// Clamps a position into the playable volume.
pub fn clamp_to_world(position: Vec3) -> Vec3 {
    Vec3::new(
        clamp_finite(position.x, -WORLD_HALF_EXTENT, WORLD_HALF_EXTENT),
        clamp_finite(position.y, WORLD_FLOOR_Y, WORLD_CEILING_Y),
        clamp_finite(position.z, -WORLD_HALF_EXTENT, WORLD_HALF_EXTENT),
    )
}

// NaN would survive f64::clamp, so it is pinned to the lower bound.
fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

fn effective_speed(speed_multiplier: f64) -> f64 {
    if speed_multiplier.is_finite() {
        MOVE_SPEED * speed_multiplier.clamp(0.0, MAX_SPEED_MULTIPLIER)
    } else {
        0.0
    }
}

fn displacement(input: &InputSample, dt: f64, speed_multiplier: f64) -> (f64, f64) {
    let flags = &input.flags;
    let forward = axis(flags.forward, flags.backward);
    let strafe = axis(flags.right, flags.left);
    if forward == 0.0 && strafe == 0.0 {
        return (0.0, 0.0);
    }

    let (sin, cos) = input.look_yaw.sin_cos();
    // forward = (-sin, -cos), right = (cos, -sin)
    let dir_x = -sin * forward + cos * strafe;
    let dir_z = -cos * forward - sin * strafe;

    let length = (dir_x * dir_x + dir_z * dir_z).sqrt();
    if length == 0.0 || !length.is_finite() {
        return (0.0, 0.0);
    }

    let step = effective_speed(speed_multiplier) * dt;
    (dir_x / length * step, dir_z / length * step)
}

fn axis(positive: bool, negative: bool) -> f64 {
    match (positive, negative) {
        (true, false) => 1.0,
        (false, true) => -1.0,
        _ => 0.0,
    }
}
