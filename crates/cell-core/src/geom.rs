use rand::Rng;
use serde::{Deserialize, Serialize};

/// Row-major 3x3 matrix, used for rotation output.
pub type Mat3 = [[f32; 3]; 3];

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    pub fn from_array(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm_squared(self) -> f32 {
        self.dot(self)
    }

    pub fn norm(self) -> f32 {
        self.norm_squared().sqrt()
    }

    pub fn distance_squared(self, other: Self) -> f32 {
        self.sub(other).norm_squared()
    }

    pub fn distance(self, other: Self) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a (near) zero vector.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n > 1.0e-8 && n.is_finite() {
            Some(self.scale(1.0 / n))
        } else {
            None
        }
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(
            self.x.min(other.x),
            self.y.min(other.y),
            self.z.min(other.z),
        )
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }

    pub fn get(self, axis: usize) -> f32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Any unit vector orthogonal to `self` (which must be non-zero).
    pub fn any_orthogonal(self) -> Self {
        let helper = if self.x.abs() < 0.9 {
            Vec3::new(1.0, 0.0, 0.0)
        } else {
            Vec3::new(0.0, 1.0, 0.0)
        };
        self.cross(helper).normalized().unwrap_or(Vec3::new(0.0, 0.0, 1.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    pub fn identity() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }

    /// Uniformly distributed random rotation (Shoemake's method).
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let u1: f32 = rng.gen();
        let u2: f32 = rng.gen();
        let u3: f32 = rng.gen();
        let s1 = (1.0 - u1).sqrt();
        let s2 = u1.sqrt();
        let t1 = 2.0 * std::f32::consts::PI * u2;
        let t2 = 2.0 * std::f32::consts::PI * u3;
        Self {
            x: s1 * t1.sin(),
            y: s1 * t1.cos(),
            z: s2 * t2.sin(),
            w: s2 * t2.cos(),
        }
    }

    /// Rotation of `angle` radians about `axis`. A zero axis yields the identity.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let Some(axis) = axis.normalized() else {
            return Self::identity();
        };
        let half = 0.5 * angle;
        let s = half.sin();
        Self {
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
            w: half.cos(),
        }
    }

    /// Shortest-arc rotation taking direction `from` onto direction `to`.
    pub fn from_to(from: Vec3, to: Vec3) -> Self {
        let (Some(a), Some(b)) = (from.normalized(), to.normalized()) else {
            return Self::identity();
        };
        let cos = a.dot(b).clamp(-1.0, 1.0);
        if cos > 1.0 - 1.0e-6 {
            return Self::identity();
        }
        if cos < -1.0 + 1.0e-6 {
            return Self::from_axis_angle(a.any_orthogonal(), std::f32::consts::PI);
        }
        Self::from_axis_angle(a.cross(b), cos.acos())
    }

    /// Hamilton product: applying the result rotates by `other` first, then `self`.
    pub fn mul(self, other: Self) -> Self {
        Self {
            w: self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
            x: self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            y: self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            z: self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
        }
    }

    pub fn rotate_vec(self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let s = self.w;
        let term1 = u.scale(2.0 * u.dot(v));
        let term2 = v.scale(s * s - u.dot(u));
        let term3 = u.cross(v).scale(2.0 * s);
        term1.add(term2).add(term3)
    }

    /// Inverse of `to_matrix` for proper rotation matrices (Shepperd's method).
    pub fn from_matrix(m: &Mat3) -> Self {
        let trace = m[0][0] + m[1][1] + m[2][2];
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self {
                w: 0.25 * s,
                x: (m[2][1] - m[1][2]) / s,
                y: (m[0][2] - m[2][0]) / s,
                z: (m[1][0] - m[0][1]) / s,
            }
        } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
            let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
            Self {
                w: (m[2][1] - m[1][2]) / s,
                x: 0.25 * s,
                y: (m[0][1] + m[1][0]) / s,
                z: (m[0][2] + m[2][0]) / s,
            }
        } else if m[1][1] > m[2][2] {
            let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
            Self {
                w: (m[0][2] - m[2][0]) / s,
                x: (m[0][1] + m[1][0]) / s,
                y: 0.25 * s,
                z: (m[1][2] + m[2][1]) / s,
            }
        } else {
            let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
            Self {
                w: (m[1][0] - m[0][1]) / s,
                x: (m[0][2] + m[2][0]) / s,
                y: (m[1][2] + m[2][1]) / s,
                z: 0.25 * s,
            }
        };
        let n = (q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w).sqrt();
        if n > 0.0 && n.is_finite() {
            Self {
                x: q.x / n,
                y: q.y / n,
                z: q.z / n,
                w: q.w / n,
            }
        } else {
            Self::identity()
        }
    }

    pub fn to_matrix(self) -> Mat3 {
        let x = self.x;
        let y = self.y;
        let z = self.z;
        let w = self.w;
        let xx = x * x;
        let yy = y * y;
        let zz = z * z;
        let xy = x * y;
        let xz = x * z;
        let yz = y * z;
        let wx = w * x;
        let wy = w * y;
        let wz = w * z;
        [
            [1.0 - 2.0 * (yy + zz), 2.0 * (xy - wz), 2.0 * (xz + wy)],
            [2.0 * (xy + wz), 1.0 - 2.0 * (xx + zz), 2.0 * (yz - wx)],
            [2.0 * (xz - wy), 2.0 * (yz + wx), 1.0 - 2.0 * (xx + yy)],
        ]
    }
}

/// Rigid transform applied to an ingredient's local frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Pose {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quaternion::identity())
    }

    pub fn apply(&self, local: Vec3) -> Vec3 {
        self.rotation.rotate_vec(local).add(self.translation)
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        self.rotation.to_matrix()
    }
}
