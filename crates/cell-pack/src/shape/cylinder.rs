use cell_core::{Aabb, Vec3};

use crate::grid::SpatialGrid;
use crate::shape::scratch::CollisionScratch;
use crate::shape::{compartment_admissible, Flow};

/// Where a point projects onto a cylinder axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AxisProjection {
    /// Projection falls between the caps; carries the squared perpendicular distance.
    WithinCaps { perpendicular_squared: f32 },
    /// Projection falls beyond a cap; carries the squared distance to the nearest endpoint.
    BeyondCap { endpoint_squared: f32 },
}

/// Projects `p` onto the axis `a -> b` (`dotp` clamped against `[0, lengthSquared]`).
pub fn project_on_axis(p: Vec3, a: Vec3, b: Vec3) -> AxisProjection {
    let axis = b.sub(a);
    let length_squared = axis.norm_squared();
    let v = p.sub(a);
    let dotp = v.dot(axis);
    if dotp < 0.0 {
        AxisProjection::BeyondCap {
            endpoint_squared: v.norm_squared(),
        }
    } else if dotp > length_squared {
        AxisProjection::BeyondCap {
            endpoint_squared: p.distance_squared(b),
        }
    } else {
        let perpendicular_squared = (v.norm_squared() - dotp * dotp / length_squared).max(0.0);
        AxisProjection::WithinCaps {
            perpendicular_squared,
        }
    }
}

/// Distance of `p` to the cylinder surface: `sqrt(perp2) - r` between the caps,
/// distance to the nearest endpoint beyond them.
pub fn cylinder_distance(p: Vec3, a: Vec3, b: Vec3, radius: f32) -> f32 {
    match project_on_axis(p, a, b) {
        AxisProjection::WithinCaps {
            perpendicular_squared,
        } => perpendicular_squared.sqrt() - radius,
        AxisProjection::BeyondCap { endpoint_squared } => endpoint_squared.sqrt(),
    }
}

/// Broad phase: points in the capsule's box that are also within reach of its midpoint.
fn for_each_candidate<F>(grid: &SpatialGrid, a: Vec3, b: Vec3, reach: f32, f: F)
where
    F: FnMut(usize),
{
    if !a.is_finite() || !b.is_finite() {
        return;
    }
    let bounds = Aabb::from_segment(a, b, reach);
    let mid = a.add(b).scale(0.5);
    let sphere_reach = 0.5 * a.distance(b) + reach;
    grid.for_each_in_cube(bounds.min, bounds.max, mid, sphere_reach, f);
}

pub(crate) fn cylinder_compartment_mismatch(
    a: Vec3,
    b: Vec3,
    radius: f32,
    grid: &SpatialGrid,
    compartment: i32,
) -> bool {
    let r2 = radius * radius;
    let mut mismatch = false;
    for_each_candidate(grid, a, b, radius, |idx| {
        if mismatch {
            return;
        }
        if let AxisProjection::WithinCaps {
            perpendicular_squared,
        } = project_on_axis(grid.point(idx), a, b)
        {
            if perpendicular_squared <= r2
                && !compartment_admissible(compartment, grid.compartment_at(idx))
            {
                mismatch = true;
            }
        }
    });
    mismatch
}

pub(crate) fn cylinder_jitter(
    a: Vec3,
    b: Vec3,
    radius: f32,
    grid: &SpatialGrid,
    padded_distance: f32,
    scratch: &mut CollisionScratch,
) -> Flow {
    let r2 = radius * radius;
    let influence = radius + padded_distance;
    let influence2 = influence * influence;
    let mut flow = Flow::Continue;
    for_each_candidate(grid, a, b, influence, |idx| {
        if flow == Flow::Reject {
            return;
        }
        let p = grid.point(idx);
        let d = match project_on_axis(p, a, b) {
            AxisProjection::WithinCaps {
                perpendicular_squared,
            } => {
                if perpendicular_squared > influence2 {
                    return;
                }
                if perpendicular_squared <= r2 {
                    if grid.is_occupied(idx) {
                        flow = Flow::Reject;
                        return;
                    }
                    scratch.record_inside(idx, perpendicular_squared.sqrt() - radius);
                    return;
                }
                perpendicular_squared.sqrt() - radius
            }
            AxisProjection::BeyondCap { endpoint_squared } => {
                let padded2 = padded_distance * padded_distance;
                if endpoint_squared > padded2 {
                    return;
                }
                endpoint_squared.sqrt()
            }
        };
        let known = grid.distance_at(idx).min(scratch.near_at(idx));
        if d < known {
            scratch.record_near(idx, d);
        }
    });
    flow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_just_beyond_far_cap_uses_endpoint_branch() {
        let a = Vec3::ZERO;
        let b = Vec3::new(10.0, 0.0, 0.0);
        let length_squared = 100.0f32;
        // dotp = x * 10, so dotp = lengthSquared + 0.5 at x = 10.05
        let sample = Vec3::new((length_squared + 0.5) / 10.0, 0.5, 0.0);
        match project_on_axis(sample, a, b) {
            AxisProjection::BeyondCap { endpoint_squared } => {
                assert!((endpoint_squared - sample.distance_squared(b)).abs() < 1e-6);
            }
            other => panic!("expected endpoint branch, got {other:?}"),
        }
        let d = cylinder_distance(sample, a, b, 1.0);
        assert!((d - sample.distance(b)).abs() < 1e-6);
    }

    #[test]
    fn point_between_caps_uses_perpendicular_distance() {
        let a = Vec3::ZERO;
        let b = Vec3::new(10.0, 0.0, 0.0);
        let sample = Vec3::new(4.0, 3.0, 0.0);
        assert_eq!(
            project_on_axis(sample, a, b),
            AxisProjection::WithinCaps {
                perpendicular_squared: 9.0
            }
        );
        assert!((cylinder_distance(sample, a, b, 1.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn jitter_marks_axis_points_inside() {
        let bounds = Aabb::from_bounds([[0.0, 0.0, 0.0], [12.0, 4.0, 4.0]]).unwrap();
        let grid = SpatialGrid::new(bounds, 1.0).unwrap();
        let mut scratch = CollisionScratch::new(grid.len());
        scratch.begin(grid.len());
        let a = Vec3::new(1.0, 2.0, 2.0);
        let b = Vec3::new(11.0, 2.0, 2.0);
        let flow = cylinder_jitter(a, b, 1.0, &grid, 1.0, &mut scratch);
        assert_eq!(flow, Flow::Continue);
        let out = scratch.finish();
        assert!(!out.inside_points.is_empty());
        for &(idx, d) in &out.inside_points {
            assert!(d <= 0.0);
            let p = grid.point(idx);
            assert!(p.x >= 1.0 && p.x <= 11.0);
        }
        for &(idx, d) in &out.new_dist_points {
            assert!(d > 0.0);
            assert!((cylinder_distance(grid.point(idx), a, b, 1.0) - d).abs() < 1e-5);
        }
    }
}
