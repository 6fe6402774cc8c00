//! Solid obstacles the movement code must not walk through.
//!
//! The maze owns the geometry and the door / dynamic wall state; the movement
//! code only ever asks "would a player of this radius standing here overlap
//! something solid?" through [`CollisionContext`].

use crate::COLLISION_TOLERANCE;
use serde::{Deserialize, Serialize};

/// Read-only view of the currently solid obstacles.
pub trait CollisionContext {
    /// Returns true if a player disc of `radius` centred at `(x, z)` overlaps
    /// anything solid.
    fn blocks(&self, x: f64, z: f64, radius: f64) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObstacleKind {
    Wall,
    Door { open: bool },
    DynamicWall { raised: bool },
}

/// Axis-aligned box on the XZ plane. Obstacles span the full world height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub min_x: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_z: f64,
    pub kind: ObstacleKind,
}

impl Obstacle {
    pub fn new(min_x: f64, min_z: f64, max_x: f64, max_z: f64, kind: ObstacleKind) -> Self {
        Self {
            min_x,
            min_z,
            max_x,
            max_z,
            kind,
        }
    }

    pub fn is_solid(&self) -> bool {
        match self.kind {
            ObstacleKind::Wall => true,
            ObstacleKind::Door { open } => !open,
            ObstacleKind::DynamicWall { raised } => raised,
        }
    }

    /// Disc-vs-box overlap. Touching, or penetrating by less than
    /// [`COLLISION_TOLERANCE`], does not count.
    pub fn overlaps(&self, x: f64, z: f64, radius: f64) -> bool {
        let closest_x = x.clamp(self.min_x, self.max_x);
        let closest_z = z.clamp(self.min_z, self.max_z);
        let dx = x - closest_x;
        let dz = z - closest_z;
        let reach = radius - COLLISION_TOLERANCE;
        reach > 0.0 && dx * dx + dz * dz < reach * reach
    }
}

/// Index of an obstacle inside an [`ObstacleMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObstacleId(pub usize);

/// The client's cached copy, or the server's live copy, of maze geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObstacleMap {
    obstacles: Vec<Obstacle>,
}

impl ObstacleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, obstacle: Obstacle) -> ObstacleId {
        self.obstacles.push(obstacle);
        ObstacleId(self.obstacles.len() - 1)
    }

    pub fn get(&self, id: ObstacleId) -> Option<&Obstacle> {
        self.obstacles.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObstacleId, &Obstacle)> {
        self.obstacles
            .iter()
            .enumerate()
            .map(|(i, o)| (ObstacleId(i), o))
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn solid_count(&self) -> usize {
        self.obstacles.iter().filter(|o| o.is_solid()).count()
    }

    /// Opens or closes a door. Returns false if `id` is not a door.
    pub fn set_door_open(&mut self, id: ObstacleId, open: bool) -> bool {
        match self.obstacles.get_mut(id.0) {
            Some(Obstacle {
                kind: ObstacleKind::Door { open: state },
                ..
            }) => {
                *state = open;
                true
            }
            _ => false,
        }
    }

    /// Raises or lowers a dynamic wall. Returns false if `id` is not a dynamic wall.
    pub fn set_wall_raised(&mut self, id: ObstacleId, raised: bool) -> bool {
        match self.obstacles.get_mut(id.0) {
            Some(Obstacle {
                kind: ObstacleKind::DynamicWall { raised: state },
                ..
            }) => {
                *state = raised;
                true
            }
            _ => false,
        }
    }
}

impl CollisionContext for ObstacleMap {
    fn blocks(&self, x: f64, z: f64, radius: f64) -> bool {
        self.obstacles
            .iter()
            .any(|o| o.is_solid() && o.overlaps(x, z, radius))
    }
}
