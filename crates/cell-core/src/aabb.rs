use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::geom::Vec3;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box from `[[minX,minY,minZ],[maxX,maxY,maxZ]]`, rejecting inverted or flat extents.
    pub fn from_bounds(bounds: [[f32; 3]; 2]) -> CoreResult<Self> {
        let min = Vec3::from_array(bounds[0]);
        let max = Vec3::from_array(bounds[1]);
        if !min.is_finite() || !max.is_finite() {
            return Err(CoreError::Invalid("bounding box must be finite".into()));
        }
        for axis in 0..3 {
            if max.get(axis) <= min.get(axis) {
                return Err(CoreError::Degenerate(
                    "bounding box max must exceed min on every axis".into(),
                ));
            }
        }
        Ok(Self { min, max })
    }

    /// Bounds of a capsule swept between `a` and `b`.
    pub fn from_segment(a: Vec3, b: Vec3, radius: f32) -> Self {
        let r = Vec3::splat(radius);
        Self::new(a.min(b).sub(r), a.max(b).add(r))
    }

    pub fn size(&self) -> Vec3 {
        self.max.sub(self.min)
    }

    pub fn center(&self) -> Vec3 {
        self.min.add(self.max).scale(0.5)
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Whether a sphere lies entirely within the box.
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        let r = Vec3::splat(radius);
        self.contains(center.sub(r)) && self.contains(center.add(r))
    }

    /// Signed distance from `p` to the box surface (negative inside).
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        let c = self.center();
        let half = self.size().scale(0.5);
        let q = Vec3::new(
            (p.x - c.x).abs() - half.x,
            (p.y - c.y).abs() - half.y,
            (p.z - c.z).abs() - half.z,
        );
        let outside = q.max(Vec3::ZERO).norm();
        let inside = q.x.max(q.y).max(q.z).min(0.0);
        outside + inside
    }
}
