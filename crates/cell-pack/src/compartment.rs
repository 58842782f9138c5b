use cell_core::{Aabb, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{PackError, PackResult};
use crate::grid::SpatialGrid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum CompartmentShape {
    Sphere {
        center: [f32; 3],
        radius: f32,
    },
    Box {
        min: [f32; 3],
        max: [f32; 3],
    },
    Cylinder {
        base: [f32; 3],
        axis: [f32; 3],
        radius: f32,
        height: f32,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompartmentSpec {
    pub id: i32,
    #[serde(flatten)]
    pub shape: CompartmentShape,
}

impl CompartmentShape {
    pub fn validate(&self) -> PackResult<()> {
        match self {
            CompartmentShape::Sphere { radius, .. } => {
                if !(*radius > 0.0) {
                    return Err(PackError::Geometry(
                        "sphere compartment radius must be > 0".into(),
                    ));
                }
            }
            CompartmentShape::Box { min, max } => {
                if (0..3).any(|i| !(max[i] > min[i])) {
                    return Err(PackError::Geometry(
                        "box compartment requires max > min".into(),
                    ));
                }
            }
            CompartmentShape::Cylinder {
                axis,
                radius,
                height,
                ..
            } => {
                if !(*radius > 0.0) || !(*height > 0.0) {
                    return Err(PackError::Geometry(
                        "cylinder compartment radius/height must be > 0".into(),
                    ));
                }
                if Vec3::from_array(*axis).normalized().is_none() {
                    return Err(PackError::Geometry(
                        "cylinder compartment axis must be non-zero".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Signed distance to the surface, negative inside.
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        match self {
            CompartmentShape::Sphere { center, radius } => {
                p.distance(Vec3::from_array(*center)) - radius
            }
            CompartmentShape::Box { min, max } => {
                Aabb::new(Vec3::from_array(*min), Vec3::from_array(*max)).signed_distance(p)
            }
            CompartmentShape::Cylinder {
                base,
                axis,
                radius,
                height,
            } => {
                let axis = Vec3::from_array(*axis)
                    .normalized()
                    .unwrap_or(Vec3::new(0.0, 0.0, 1.0));
                let rel = p.sub(Vec3::from_array(*base));
                let h = rel.dot(axis);
                let radial = rel.sub(axis.scale(h)).norm() - radius;
                let axial = (-h).max(h - height);
                let outside = (radial.max(0.0).powi(2) + axial.max(0.0).powi(2)).sqrt();
                let inside = radial.max(axial).min(0.0);
                outside + inside
            }
        }
    }
}

/// Tags interior lattice points with `spec.id` and tightens every point's
/// distance with its distance to the compartment wall.
///
/// Returns the number of interior points.
pub fn assign_compartment(grid: &mut SpatialGrid, spec: &CompartmentSpec) -> PackResult<usize> {
    spec.shape.validate()?;
    let signed = grid.par_map_points(|_, p| spec.shape.signed_distance(p));
    let mut interior = 0usize;
    for (idx, sd) in signed.into_iter().enumerate() {
        if sd <= 0.0 {
            grid.set_compartment(idx, spec.id);
            interior += 1;
        }
        grid.commit_distance_update(idx, sd.abs());
    }
    Ok(interior)
}
