//! Ingredient geometry and its collision contract against the grid.
//!
//! A shape is a hierarchy of levels. Level 0 is the coarse shell and must
//! enclose every deeper primitive; the deepest level is the finest
//! decomposition. Spheres and sphere trees use sphere levels, cylinder sets
//! and fibers use segment levels.

pub mod cylinder;
pub mod primitive;
pub mod scratch;
pub mod sphere;

use cell_core::{point_segment_distance_squared, Pose, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{PackError, PackResult};
use crate::grid::SpatialGrid;

pub use cylinder::{cylinder_distance, project_on_axis, AxisProjection};
pub use primitive::Primitive;
pub use scratch::{CollisionScratch, JitterOutcome};

/// Slack allowed when checking that level 0 encloses deeper levels.
const CONTAINMENT_TOLERANCE: f32 = 1.0e-3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Reject,
}

/// Declarative geometry, as it appears in a recipe.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeDescriptor {
    Sphere {
        radius: f32,
    },
    MultiSphere {
        levels: Vec<SphereLevelSpec>,
    },
    Cylinder {
        levels: Vec<CylinderLevelSpec>,
    },
    Fiber {
        path: Vec<[f32; 3]>,
        radius: f32,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SphereLevelSpec {
    pub positions: Vec<[f32; 3]>,
    pub radii: Vec<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CylinderLevelSpec {
    pub positions: Vec<[f32; 3]>,
    pub positions2: Vec<[f32; 3]>,
    pub radii: Vec<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Sphere,
    MultiSphere,
    Cylinder,
    Fiber,
}

#[derive(Clone, Debug)]
pub struct SphereLevel {
    pub centers: Vec<Vec3>,
    pub radii: Vec<f32>,
}

#[derive(Clone, Debug)]
pub struct CylinderLevel {
    pub starts: Vec<Vec3>,
    pub ends: Vec<Vec3>,
    pub radii: Vec<f32>,
}

#[derive(Clone, Debug)]
pub enum ShapeLevels {
    Spheres(Vec<SphereLevel>),
    Cylinders(Vec<CylinderLevel>),
}

/// Compartment admissibility of a grid point for an ingredient.
///
/// Free-space ingredients (`id <= 0`) tolerate unassigned points and their own
/// id; ingredients bound to a positive compartment tolerate only that id.
pub fn compartment_admissible(ingredient: i32, point: i32) -> bool {
    if ingredient <= 0 {
        point == 0 || point == ingredient
    } else {
        point == ingredient
    }
}

/// Immutable geometry of one ingredient type.
#[derive(Clone, Debug)]
pub struct ShapeProxy {
    kind: ShapeKind,
    levels: ShapeLevels,
    min_radius: f32,
    encapsulating_radius: f32,
    principal_vector: Vec3,
    compartment_id: i32,
}

fn check_radius(r: f32, what: &str) -> PackResult<()> {
    if !(r.is_finite() && r > 0.0) {
        return Err(PackError::Geometry(format!("{what} radius must be > 0")));
    }
    Ok(())
}

fn check_point(p: [f32; 3], what: &str) -> PackResult<Vec3> {
    let v = Vec3::from_array(p);
    if !v.is_finite() {
        return Err(PackError::Geometry(format!("{what} position must be finite")));
    }
    Ok(v)
}

fn sphere_level(spec: &SphereLevelSpec, level: usize) -> PackResult<SphereLevel> {
    if spec.positions.is_empty() {
        return Err(PackError::Geometry(format!("level {level} has no spheres")));
    }
    if spec.positions.len() != spec.radii.len() {
        return Err(PackError::Geometry(format!(
            "level {level} has {} positions but {} radii",
            spec.positions.len(),
            spec.radii.len()
        )));
    }
    let mut centers = Vec::with_capacity(spec.positions.len());
    for (&p, &r) in spec.positions.iter().zip(&spec.radii) {
        check_radius(r, "sphere")?;
        centers.push(check_point(p, "sphere")?);
    }
    Ok(SphereLevel {
        centers,
        radii: spec.radii.clone(),
    })
}

fn cylinder_level(spec: &CylinderLevelSpec, level: usize) -> PackResult<CylinderLevel> {
    let n = spec.positions.len();
    if n == 0 {
        return Err(PackError::Geometry(format!("level {level} has no cylinders")));
    }
    if spec.positions2.len() != n || spec.radii.len() != n {
        return Err(PackError::Geometry(format!(
            "level {level} cylinder arrays differ in length ({}, {}, {})",
            n,
            spec.positions2.len(),
            spec.radii.len()
        )));
    }
    let mut starts = Vec::with_capacity(n);
    let mut ends = Vec::with_capacity(n);
    for i in 0..n {
        check_radius(spec.radii[i], "cylinder")?;
        let a = check_point(spec.positions[i], "cylinder")?;
        let b = check_point(spec.positions2[i], "cylinder")?;
        if a.distance_squared(b) <= 1.0e-12 {
            return Err(PackError::Geometry(format!(
                "level {level} cylinder {i} has coincident endpoints"
            )));
        }
        starts.push(a);
        ends.push(b);
    }
    Ok(CylinderLevel {
        starts,
        ends,
        radii: spec.radii.clone(),
    })
}

fn fiber_level(path: &[[f32; 3]], radius: f32) -> PackResult<CylinderLevel> {
    check_radius(radius, "fiber")?;
    if path.len() < 2 {
        return Err(PackError::Geometry(
            "fiber path needs at least two points".into(),
        ));
    }
    let points = path
        .iter()
        .map(|&p| check_point(p, "fiber"))
        .collect::<PackResult<Vec<_>>>()?;
    let mut starts = Vec::with_capacity(points.len() - 1);
    let mut ends = Vec::with_capacity(points.len() - 1);
    for pair in points.windows(2) {
        if pair[0].distance_squared(pair[1]) <= 1.0e-12 {
            return Err(PackError::Geometry(
                "fiber path has repeated consecutive points".into(),
            ));
        }
        starts.push(pair[0]);
        ends.push(pair[1]);
    }
    Ok(CylinderLevel {
        radii: vec![radius; starts.len()],
        starts,
        ends,
    })
}

impl ShapeLevels {
    pub fn len(&self) -> usize {
        match self {
            ShapeLevels::Spheres(levels) => levels.len(),
            ShapeLevels::Cylinders(levels) => levels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Local-frame primitives of one level.
    pub fn local_primitives(&self, level: usize) -> Vec<Primitive> {
        match self {
            ShapeLevels::Spheres(levels) => levels
                .get(level)
                .map(|l| {
                    l.centers
                        .iter()
                        .zip(&l.radii)
                        .map(|(&center, &radius)| Primitive::Sphere { center, radius })
                        .collect()
                })
                .unwrap_or_default(),
            ShapeLevels::Cylinders(levels) => levels
                .get(level)
                .map(|l| {
                    (0..l.starts.len())
                        .map(|i| Primitive::Capsule {
                            a: l.starts[i],
                            b: l.ends[i],
                            radius: l.radii[i],
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Whether `inner` lies inside `outer`. Sphere levels use exact sphere
/// containment; segment levels check both end balls against the capsule.
fn encloses(outer: &Primitive, inner: &Primitive) -> bool {
    let slack = CONTAINMENT_TOLERANCE;
    match (*outer, *inner) {
        (
            Primitive::Sphere {
                center: c0,
                radius: r0,
            },
            Primitive::Sphere {
                center: c1,
                radius: r1,
            },
        ) => c0.distance(c1) + r1 <= r0 + slack,
        (Primitive::Capsule { a, b, radius: r0 }, Primitive::Capsule { a: a1, b: b1, radius: r1 }) => {
            [a1, b1].iter().all(|&p| {
                point_segment_distance_squared(p, a, b).sqrt() + r1 <= r0 + slack
            })
        }
        _ => false,
    }
}

impl ShapeProxy {
    /// Builds and validates the geometry. `compartment_id <= 0` means free space.
    pub fn new(
        descriptor: &ShapeDescriptor,
        principal_vector: [f32; 3],
        compartment_id: i32,
        encapsulating_override: Option<f32>,
    ) -> PackResult<Self> {
        let (kind, levels) = match descriptor {
            ShapeDescriptor::Sphere { radius } => {
                check_radius(*radius, "sphere")?;
                (
                    ShapeKind::Sphere,
                    ShapeLevels::Spheres(vec![SphereLevel {
                        centers: vec![Vec3::ZERO],
                        radii: vec![*radius],
                    }]),
                )
            }
            ShapeDescriptor::MultiSphere { levels } => {
                if levels.is_empty() {
                    return Err(PackError::Geometry("multi-sphere has no levels".into()));
                }
                let levels = levels
                    .iter()
                    .enumerate()
                    .map(|(i, l)| sphere_level(l, i))
                    .collect::<PackResult<Vec<_>>>()?;
                (ShapeKind::MultiSphere, ShapeLevels::Spheres(levels))
            }
            ShapeDescriptor::Cylinder { levels } => {
                if levels.is_empty() {
                    return Err(PackError::Geometry("cylinder has no levels".into()));
                }
                let levels = levels
                    .iter()
                    .enumerate()
                    .map(|(i, l)| cylinder_level(l, i))
                    .collect::<PackResult<Vec<_>>>()?;
                (ShapeKind::Cylinder, ShapeLevels::Cylinders(levels))
            }
            ShapeDescriptor::Fiber { path, radius } => (
                ShapeKind::Fiber,
                ShapeLevels::Cylinders(vec![fiber_level(path, *radius)?]),
            ),
        };

        let coarse = levels.local_primitives(0);
        for level in 1..levels.len() {
            for (i, inner) in levels.local_primitives(level).iter().enumerate() {
                if !coarse.iter().any(|outer| encloses(outer, inner)) {
                    return Err(PackError::Geometry(format!(
                        "level {level} primitive {i} is not enclosed by level 0"
                    )));
                }
            }
        }

        let mut extent = 0.0f32;
        let mut max_radius = 0.0f32;
        for level in 0..levels.len() {
            for prim in levels.local_primitives(level) {
                max_radius = max_radius.max(prim.radius());
                extent = extent.max(match prim {
                    Primitive::Sphere { center, radius } => center.norm() + radius,
                    Primitive::Capsule { a, b, radius } => a.norm().max(b.norm()) + radius,
                });
            }
        }
        let min_radius = levels
            .local_primitives(levels.len() - 1)
            .iter()
            .map(Primitive::radius)
            .fold(f32::INFINITY, f32::min);
        let encapsulating_radius = match encapsulating_override {
            Some(r) => {
                if !(r.is_finite() && r >= max_radius) {
                    return Err(PackError::Geometry(format!(
                        "encapsulating radius {r} is smaller than the largest primitive radius {max_radius}"
                    )));
                }
                r.max(extent)
            }
            None => extent,
        };
        let principal_vector = Vec3::from_array(principal_vector)
            .normalized()
            .ok_or_else(|| PackError::Geometry("principal vector must be non-zero".into()))?;

        Ok(Self {
            kind,
            levels,
            min_radius,
            encapsulating_radius,
            principal_vector,
            compartment_id,
        })
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn deepest_level(&self) -> usize {
        self.level_count() - 1
    }

    pub fn min_radius(&self) -> f32 {
        self.min_radius
    }

    pub fn encapsulating_radius(&self) -> f32 {
        self.encapsulating_radius
    }

    pub fn principal_vector(&self) -> Vec3 {
        self.principal_vector
    }

    pub fn compartment_id(&self) -> i32 {
        self.compartment_id
    }

    /// World-frame primitives of `level` under `pose`.
    pub fn world_primitives(&self, pose: &Pose, level: usize) -> Vec<Primitive> {
        self.levels
            .local_primitives(level)
            .into_iter()
            .map(|prim| match prim {
                Primitive::Sphere { center, radius } => Primitive::Sphere {
                    center: pose.apply(center),
                    radius,
                },
                Primitive::Capsule { a, b, radius } => Primitive::Capsule {
                    a: pose.apply(a),
                    b: pose.apply(b),
                    radius,
                },
            })
            .collect()
    }

    /// Coarse region test: true when any covered grid point belongs to a
    /// compartment this ingredient may not occupy. Never mutates the grid.
    pub fn collides_with_compartment(&self, pose: &Pose, level: usize, grid: &SpatialGrid) -> bool {
        self.world_primitives(pose, level)
            .into_iter()
            .any(|prim| match prim {
                Primitive::Sphere { center, radius } => {
                    sphere::sphere_compartment_mismatch(center, radius, grid, self.compartment_id)
                }
                Primitive::Capsule { a, b, radius } => cylinder::cylinder_compartment_mismatch(
                    a,
                    b,
                    radius,
                    grid,
                    self.compartment_id,
                ),
            })
    }

    /// Full distance test of one level. Rejects on overlap with occupied
    /// points; otherwise reports the points to commit on acceptance, taking
    /// the per-point minimum across all primitives of the level.
    pub fn collision_jitter(
        &self,
        pose: &Pose,
        level: usize,
        grid: &SpatialGrid,
        padded_distance: f32,
        scratch: &mut CollisionScratch,
    ) -> JitterOutcome {
        scratch.begin(grid.len());
        let padded = padded_distance.max(0.0);
        for prim in self.world_primitives(pose, level) {
            let flow = match prim {
                Primitive::Sphere { center, radius } => {
                    sphere::sphere_jitter(center, radius, grid, padded, scratch)
                }
                Primitive::Capsule { a, b, radius } => {
                    cylinder::cylinder_jitter(a, b, radius, grid, padded, scratch)
                }
            };
            if flow == Flow::Reject {
                return scratch.reject();
            }
        }
        scratch.finish()
    }

    /// Hierarchical test: level 0 first, its rejection is final; otherwise the
    /// deepest level decides and supplies the bookkeeping.
    pub fn test_pose(
        &self,
        pose: &Pose,
        grid: &SpatialGrid,
        padded_distance: f32,
        scratch: &mut CollisionScratch,
    ) -> JitterOutcome {
        let deepest = self.deepest_level();
        if deepest > 0 {
            let coarse = self.collision_jitter(pose, 0, grid, 0.0, scratch);
            if coarse.rejected {
                return coarse;
            }
        }
        self.collision_jitter(pose, deepest, grid, padded_distance, scratch)
    }
}
