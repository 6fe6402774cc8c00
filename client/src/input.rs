//! Client input sampling with sequencing
//!
//! The sampler never reads global state: whatever produces control state
//! (keyboard, a script, a test) is handed in as a [`ControlSource`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::time::unix_millis;
use shared::{InputSample, MovementFlags};
use std::f64::consts::{PI, TAU};

/// Anything that can report the current control state.
pub trait ControlSource {
    fn movement(&mut self) -> MovementFlags;
    /// Horizontal look angle in radians. May be any finite value; the sampler wraps it.
    fn look_yaw(&mut self) -> f64;
}

/// Wraps an angle into `[-PI, PI)`.
pub fn wrap_yaw(yaw: f64) -> f64 {
    (yaw + PI).rem_euclid(TAU) - PI
}

/// Turns control state into immutable, sequenced input samples
pub struct InputSampler {
    controls: Box<dyn ControlSource + Send>,
    next_sequence: u64,
    last_yaw: f64,
    movement_suppressed: bool,
}

impl InputSampler {
    pub fn new(controls: Box<dyn ControlSource + Send>) -> Self {
        Self {
            controls,
            next_sequence: 1,
            last_yaw: 0.0,
            movement_suppressed: false,
        }
    }

    /// Reads the controls once and returns the next sample. Sequence numbers
    /// start at 1 and increase by one per call.
    pub fn sample(&mut self) -> InputSample {
        let flags = if self.movement_suppressed {
            // Keep draining the source so it doesn't replay held input afterwards
            let _ = self.controls.movement();
            MovementFlags::default()
        } else {
            self.controls.movement()
        };

        let yaw = self.controls.look_yaw();
        if yaw.is_finite() {
            self.last_yaw = wrap_yaw(yaw);
        }

        let sample = InputSample {
            seq: self.next_sequence,
            flags,
            look_yaw: self.last_yaw,
            client_timestamp: unix_millis(),
        };
        self.next_sequence += 1;
        sample
    }

    /// Clears movement flags from every sample until lifted, e.g. while an
    /// overlay has focus. Looking around still works.
    pub fn set_movement_suppressed(&mut self, suppressed: bool) {
        self.movement_suppressed = suppressed;
    }

    pub fn is_movement_suppressed(&self) -> bool {
        self.movement_suppressed
    }

    /// Sequence number the next sample will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Restarts numbering at 1 for a new connection.
    pub fn reset_sequence(&mut self) {
        self.next_sequence = 1;
    }
}

/// Control source that always reports the same state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedControls {
    pub flags: MovementFlags,
    pub look_yaw: f64,
}

impl ControlSource for FixedControls {
    fn movement(&mut self) -> MovementFlags {
        self.flags
    }

    fn look_yaw(&mut self) -> f64 {
        self.look_yaw
    }
}

/// Wandering bot controls for the headless client.
///
/// Holds a random combination of movement keys for a random number of
/// samples, while the look direction drifts slowly.
pub struct ScriptedControls {
    rng: StdRng,
    flags: MovementFlags,
    hold_remaining: u32,
    yaw: f64,
    yaw_rate: f64,
}

impl ScriptedControls {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            flags: MovementFlags::default(),
            hold_remaining: 0,
            yaw: 0.0,
            yaw_rate: 0.0,
        }
    }

    fn pick_next(&mut self) {
        self.flags = MovementFlags {
            forward: self.rng.gen_bool(0.6),
            backward: self.rng.gen_bool(0.1),
            left: self.rng.gen_bool(0.25),
            right: self.rng.gen_bool(0.25),
        };
        self.hold_remaining = self.rng.gen_range(5..40);
        self.yaw_rate = self.rng.gen_range(-0.08..0.08);
    }
}

impl ControlSource for ScriptedControls {
    fn movement(&mut self) -> MovementFlags {
        if self.hold_remaining == 0 {
            self.pick_next();
        }
        self.hold_remaining -= 1;
        self.flags
    }

    fn look_yaw(&mut self) -> f64 {
        self.yaw = wrap_yaw(self.yaw + self.yaw_rate);
        self.yaw
    }
}
