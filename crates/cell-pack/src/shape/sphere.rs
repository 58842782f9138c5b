use cell_core::Vec3;

use crate::grid::SpatialGrid;
use crate::shape::scratch::CollisionScratch;
use crate::shape::{compartment_admissible, Flow};

/// Compartment-id check over the points covered by one sphere.
pub(crate) fn sphere_compartment_mismatch(
    center: Vec3,
    radius: f32,
    grid: &SpatialGrid,
    compartment: i32,
) -> bool {
    let mut mismatch = false;
    grid.for_each_in_sphere(center, radius, |idx, _| {
        if !mismatch && !compartment_admissible(compartment, grid.compartment_at(idx)) {
            mismatch = true;
        }
    });
    mismatch
}

/// Distance bookkeeping for one sphere. Returns `Flow::Reject` on overlap
/// with previously accepted geometry.
pub(crate) fn sphere_jitter(
    center: Vec3,
    radius: f32,
    grid: &SpatialGrid,
    padded_distance: f32,
    scratch: &mut CollisionScratch,
) -> Flow {
    let r2 = radius * radius;
    let mut flow = Flow::Continue;
    grid.for_each_in_sphere(center, radius + padded_distance, |idx, d2| {
        if flow == Flow::Reject {
            return;
        }
        if d2 <= r2 {
            if grid.is_occupied(idx) {
                flow = Flow::Reject;
                return;
            }
            scratch.record_inside(idx, d2.sqrt() - radius);
            return;
        }
        let known = grid.distance_at(idx).min(scratch.near_at(idx));
        // d < known  <=>  d2 < (known + radius)^2 for known >= 0
        let reach = known + radius;
        if known >= 0.0 && d2 >= reach * reach {
            return;
        }
        let d = d2.sqrt() - radius;
        if d < known {
            scratch.record_near(idx, d);
        }
    });
    flow
}
