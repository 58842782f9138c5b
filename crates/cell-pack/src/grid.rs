//! Regular sample lattice over the packing volume.
//!
//! Every lattice point carries a compartment id and a distance value. The
//! distance is the distance to the nearest surface accepted so far (placed
//! ingredient or compartment wall) and is only ever tightened.

use cell_core::{Aabb, Vec3};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{PackError, PackResult};

/// Initial distance for points nothing has been placed near yet.
pub const DISTANCE_SENTINEL: f32 = 1.0e6;

/// Distances below `-OCCUPIED_EPSILON` mark a point as inside accepted geometry.
pub const OCCUPIED_EPSILON: f32 = 1.0e-4;

/// Upper bound on lattice size; larger grids are a configuration mistake.
const MAX_GRID_POINTS: usize = 64_000_000;

/// Compartment id of free space.
pub const FREE_SPACE: i32 = 0;

pub struct SpatialGrid {
    bounds: Aabb,
    spacing: f32,
    dims: [usize; 3],
    origin: Vec3,
    points: Vec<Vec3>,
    compartment: Vec<i32>,
    distance: Vec<f32>,
}

/// Serializable copy of the grid state for voxelization consumers.
#[derive(Clone, Debug, Serialize)]
pub struct GridSnapshot {
    pub dims: [usize; 3],
    pub origin: [f32; 3],
    pub spacing: f32,
    pub compartment_ids: Vec<i32>,
    pub distances: Vec<f32>,
}

impl SpatialGrid {
    /// Builds the lattice. Points sit at voxel centres: `min + (i + 0.5) * spacing`.
    ///
    /// Only whole voxels are sampled, so every point lies inside `bounds`. An
    /// axis shorter than `spacing` gets one point at its midpoint.
    pub fn new(bounds: Aabb, spacing: f32) -> PackResult<Self> {
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(PackError::Geometry("grid spacing must be positive".into()));
        }
        let size = bounds.size();
        let mut dims = [0usize; 3];
        for (axis, dim) in dims.iter_mut().enumerate() {
            let span = size.get(axis);
            if !(span.is_finite() && span > 0.0) {
                return Err(PackError::Geometry("grid bounds are empty".into()));
            }
            // Tolerate float noise so an exact multiple does not lose a point.
            *dim = ((span / spacing) + 1.0e-4).floor().max(1.0) as usize;
        }
        let total = dims[0]
            .checked_mul(dims[1])
            .and_then(|n| n.checked_mul(dims[2]))
            .filter(|&n| n <= MAX_GRID_POINTS)
            .ok_or_else(|| {
                PackError::Invalid(format!(
                    "grid of {}x{}x{} points is too large; increase spacing",
                    dims[0], dims[1], dims[2]
                ))
            })?;
        let origin = Vec3::new(
            bounds.min.x + 0.5 * spacing.min(size.x),
            bounds.min.y + 0.5 * spacing.min(size.y),
            bounds.min.z + 0.5 * spacing.min(size.z),
        );
        let mut points = Vec::with_capacity(total);
        for iz in 0..dims[2] {
            for iy in 0..dims[1] {
                for ix in 0..dims[0] {
                    points.push(Vec3::new(
                        origin.x + ix as f32 * spacing,
                        origin.y + iy as f32 * spacing,
                        origin.z + iz as f32 * spacing,
                    ));
                }
            }
        }
        Ok(Self {
            bounds,
            spacing,
            dims,
            origin,
            points,
            compartment: vec![FREE_SPACE; total],
            distance: vec![DISTANCE_SENTINEL; total],
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn point(&self, index: usize) -> Vec3 {
        self.points[index]
    }

    pub fn compartment_at(&self, index: usize) -> i32 {
        self.compartment[index]
    }

    pub fn distance_at(&self, index: usize) -> f32 {
        self.distance[index]
    }

    pub fn distances(&self) -> &[f32] {
        &self.distance
    }

    pub fn compartments(&self) -> &[i32] {
        &self.compartment
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        self.distance[index] < -OCCUPIED_EPSILON
    }

    pub fn set_compartment(&mut self, index: usize, id: i32) {
        self.compartment[index] = id;
    }

    /// Monotone tighten: `distance[i] = min(distance[i], new_distance)`.
    ///
    /// Returns whether the stored value changed.
    pub fn commit_distance_update(&mut self, index: usize, new_distance: f32) -> bool {
        let slot = &mut self.distance[index];
        if new_distance < *slot {
            *slot = new_distance;
            true
        } else {
            false
        }
    }

    pub fn index_of(&self, ix: usize, iy: usize, iz: usize) -> usize {
        ix + self.dims[0] * (iy + self.dims[1] * iz)
    }

    /// Inclusive lattice index range along `axis` covering `[lo, hi]`, if any.
    fn axis_range(&self, axis: usize, lo: f32, hi: f32) -> Option<(usize, usize)> {
        let o = self.origin.get(axis);
        let n = self.dims[axis];
        let first = ((lo - o) / self.spacing).ceil();
        let last = ((hi - o) / self.spacing).floor();
        if !(first.is_finite() && last.is_finite()) || last < 0.0 || first > (n - 1) as f32 {
            return None;
        }
        let first = first.max(0.0) as usize;
        let last = (last as usize).min(n - 1);
        if first > last {
            return None;
        }
        Some((first, last))
    }

    /// Visits every lattice point inside the box `[min, max]`.
    pub fn for_each_in_box<F>(&self, min: Vec3, max: Vec3, mut f: F)
    where
        F: FnMut(usize),
    {
        let Some((x0, x1)) = self.axis_range(0, min.x, max.x) else {
            return;
        };
        let Some((y0, y1)) = self.axis_range(1, min.y, max.y) else {
            return;
        };
        let Some((z0, z1)) = self.axis_range(2, min.z, max.z) else {
            return;
        };
        for iz in z0..=z1 {
            for iy in y0..=y1 {
                let row = self.index_of(0, iy, iz);
                for ix in x0..=x1 {
                    f(row + ix);
                }
            }
        }
    }

    /// Visits every lattice point within `radius` of `center` with its squared distance.
    ///
    /// The enclosing box is culled first; the exact test removes its corners.
    pub fn for_each_in_sphere<F>(&self, center: Vec3, radius: f32, mut f: F)
    where
        F: FnMut(usize, f32),
    {
        if !center.is_finite() || !(radius >= 0.0) {
            return;
        }
        let r = Vec3::splat(radius);
        let r2 = radius * radius;
        self.for_each_in_box(center.sub(r), center.add(r), |idx| {
            let d2 = self.points[idx].distance_squared(center);
            if d2 <= r2 {
                f(idx, d2);
            }
        });
    }

    pub fn points_in_sphere(&self, center: Vec3, radius: f32) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_in_sphere(center, radius, |idx, _| out.push(idx));
        out
    }

    /// Visits points inside the box `[aabb_min, aabb_max]` that are also within
    /// `radius` of `center`.
    pub fn for_each_in_cube<F>(
        &self,
        aabb_min: Vec3,
        aabb_max: Vec3,
        center: Vec3,
        radius: f32,
        mut f: F,
    ) where
        F: FnMut(usize),
    {
        if !center.is_finite() || !(radius >= 0.0) {
            return;
        }
        let r2 = radius * radius;
        self.for_each_in_box(aabb_min, aabb_max, |idx| {
            if self.points[idx].distance_squared(center) <= r2 {
                f(idx);
            }
        });
    }

    pub fn points_in_cube(
        &self,
        aabb_min: Vec3,
        aabb_max: Vec3,
        center: Vec3,
        radius: f32,
    ) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_in_cube(aabb_min, aabb_max, center, radius, |idx| out.push(idx));
        out
    }

    /// Evaluates `f` on every point in parallel. Read-only.
    pub fn par_map_points<T, F>(&self, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize, Vec3) -> T + Sync + Send,
    {
        self.points
            .par_iter()
            .enumerate()
            .map(|(idx, p)| f(idx, *p))
            .collect()
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            dims: self.dims,
            origin: self.origin.to_array(),
            spacing: self.spacing,
            compartment_ids: self.compartment.clone(),
            distances: self.distance.clone(),
        }
    }
}
