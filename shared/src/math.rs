use serde::{Deserialize, Serialize};

/// Represents a point or direction in 3D space.
///
/// Y is up; players walk on the XZ plane. On the wire a vector is a plain
/// `[x, y, z]` array.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f64) -> Vec3 {
        Vec3 {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }

    ///Returns the magnitude of the vector.
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        Vec3::new(other.x - self.x, other.y - self.y, other.z - self.z).length()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

/// Unit quaternion, serialized as `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation of `yaw` radians about the +Y axis.
    pub fn from_yaw(yaw: f64) -> Quat {
        let half = yaw * 0.5;
        Quat {
            x: 0.0,
            y: half.sin(),
            z: 0.0,
            w: half.cos(),
        }
    }

    /// Recovers the rotation about +Y. Only meaningful for yaw-only rotations.
    pub fn yaw(&self) -> f64 {
        2.0 * self.y.atan2(self.w)
    }
}

impl Default for Quat {
    fn default() -> Self {
        Quat::IDENTITY
    }
}

impl From<[f64; 4]> for Quat {
    fn from(q: [f64; 4]) -> Self {
        Quat {
            x: q[0],
            y: q[1],
            z: q[2],
            w: q[3],
        }
    }
}

impl From<Quat> for [f64; 4] {
    fn from(q: Quat) -> Self {
        [q.x, q.y, q.z, q.w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_vector_arithmetic() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(-1.0, 0.5, 2.0);

        assert_eq!(a.add(&b), Vec3::new(0.0, 2.5, 5.0));
        assert_eq!(a.scale(2.0), Vec3::new(2.0, 4.0, 6.0));
        assert_approx_eq!(Vec3::new(3.0, 0.0, 4.0).length(), 5.0);
        assert_approx_eq!(Vec3::ZERO.distance(&Vec3::new(0.0, 0.0, -2.0)), 2.0);
    }

    #[test]
    fn test_quat_from_yaw_round_trips_angle() {
        for yaw in [0.0, 0.5, -1.2, 3.0] {
            let q = Quat::from_yaw(yaw);
            assert_approx_eq!(q.yaw(), yaw, 1e-12);
            let norm = q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w;
            assert_approx_eq!(norm, 1.0, 1e-12);
        }
    }

    #[test]
    fn test_wire_shape_is_plain_arrays() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let as_array: [f64; 3] = v.into();
        let direct = bincode::serialize(&v).unwrap();
        let plain = bincode::serialize(&as_array).unwrap();
        assert_eq!(direct, plain);

        let q = Quat::from_yaw(1.0);
        let q_array: [f64; 4] = q.into();
        assert_eq!(
            bincode::serialize(&q).unwrap(),
            bincode::serialize(&q_array).unwrap()
        );
    }
}
