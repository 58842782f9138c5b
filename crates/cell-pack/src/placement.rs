use cell_core::{Mat3, Pose, Quaternion, SpatialHash, Vec3};
use serde::Serialize;

use crate::shape::Primitive;

/// Interpenetration below this depth counts as touching.
pub const OVERLAP_TOLERANCE: f32 = 1.0e-4;

/// One accepted ingredient instance in world frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlacedInstance {
    pub ingredient: String,
    pub ingredient_index: usize,
    pub instance_index: usize,
    pub translation: [f32; 3],
    /// Row-major rotation applied to the ingredient's local frame.
    pub rotation: Mat3,
    /// Poses tested before this one was accepted, including itself.
    pub attempts: usize,
}

impl PlacedInstance {
    pub fn new(
        ingredient: &str,
        ingredient_index: usize,
        instance_index: usize,
        pose: &Pose,
        attempts: usize,
    ) -> Self {
        Self {
            ingredient: ingredient.to_string(),
            ingredient_index,
            instance_index,
            translation: pose.translation.to_array(),
            rotation: pose.rotation_matrix(),
            attempts,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(
            Vec3::from_array(self.translation),
            Quaternion::from_matrix(&self.rotation),
        )
    }
}

/// Exact narrow phase over accepted primitives.
///
/// Primitives are hashed by the centre of their bounding sphere; the cell size
/// is twice the largest bounding radius any ingredient can produce, so one
/// ring of neighbor cells covers every possible contact.
pub struct PlacedRegistry {
    hash: SpatialHash,
    primitives: Vec<Primitive>,
    owners: Vec<usize>,
}

impl PlacedRegistry {
    pub fn new(max_bounding_radius: f32) -> Self {
        Self {
            hash: SpatialHash::new(2.0 * max_bounding_radius),
            primitives: Vec::new(),
            owners: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn insert(&mut self, owner: usize, primitives: &[Primitive]) {
        for prim in primitives {
            let idx = self.primitives.len();
            let (center, _) = prim.bounding_sphere();
            self.primitives.push(*prim);
            self.owners.push(owner);
            self.hash.insert(idx, center);
        }
    }

    /// Re-checks every pair of primitives owned by different instances.
    ///
    /// Returns the owners of the first overlapping pair found.
    pub fn first_overlap(&self, tolerance: f32) -> Option<(usize, usize)> {
        let mut found = None;
        for (i, prim) in self.primitives.iter().enumerate() {
            let (center, _) = prim.bounding_sphere();
            self.hash.any_neighbor(center, |j| {
                if j > i
                    && self.owners[j] != self.owners[i]
                    && self.primitives[j].overlaps(prim, tolerance)
                {
                    found = Some((self.owners[i], self.owners[j]));
                    return true;
                }
                false
            });
            if found.is_some() {
                break;
            }
        }
        found
    }

    pub fn overlaps_any(&self, trial: &[Primitive], tolerance: f32) -> bool {
        trial.iter().any(|t| {
            let (center, _) = t.bounding_sphere();
            self.hash
                .any_neighbor(center, |idx| self.primitives[idx].overlaps(t, tolerance))
        })
    }
}
