#![allow(dead_code)]

use cell_core::Aabb;
use cell_pack::compartment::{CompartmentShape, CompartmentSpec};
use cell_pack::config::{BoundaryPolicy, IngredientSpec, PackConfig, PackingMode, PlaceMethod};
use cell_pack::grid::SpatialGrid;
use cell_pack::orientation::OrientationSpec;
use cell_pack::shape::{ShapeDescriptor, ShapeProxy, SphereLevelSpec};

pub fn base_config(size: f32, ingredients: Vec<IngredientSpec>) -> PackConfig {
    PackConfig {
        bounding_box: [[0.0, 0.0, 0.0], [size, size, size]],
        spacing: 1.0,
        seed: Some(42),
        padding: 0.0,
        boundary: BoundaryPolicy::Center,
        compartments: Vec::new(),
        ingredients,
        gradients: Vec::new(),
        max_candidates: None,
        nb_jitter: Some(5),
        runs: None,
        check: false,
    }
}

pub fn ingredient(name: &str, count: usize, shape: ShapeDescriptor) -> IngredientSpec {
    IngredientSpec {
        name: name.to_string(),
        count,
        shape,
        compartment: 0,
        principal_vector: [0.0, 0.0, 1.0],
        packing_mode: PackingMode::Random,
        place_method: PlaceMethod::Jitter,
        gradient: None,
        nb_jitter: None,
        jitter_max: None,
        perturb_axis_amplitude: 0.0,
        rotation_range: None,
        orientation: OrientationSpec::Random,
        priority: 0,
        encapsulating_radius: None,
    }
}

pub fn sphere_ingredient(name: &str, count: usize, radius: f32) -> IngredientSpec {
    ingredient(name, count, ShapeDescriptor::Sphere { radius })
}

/// Coarse shell of radius 3 around two fine spheres.
pub fn dumbbell() -> ShapeDescriptor {
    ShapeDescriptor::MultiSphere {
        levels: vec![
            SphereLevelSpec {
                positions: vec![[0.0, 0.0, 0.0]],
                radii: vec![3.0],
            },
            SphereLevelSpec {
                positions: vec![[0.0, 0.0, -1.5], [0.0, 0.0, 1.5]],
                radii: vec![1.2, 1.2],
            },
        ],
    }
}

pub fn proxy(spec: &IngredientSpec) -> ShapeProxy {
    ShapeProxy::new(
        &spec.shape,
        spec.principal_vector,
        spec.compartment,
        spec.encapsulating_radius,
    )
    .expect("valid shape")
}

pub fn cube_grid(size: f32, spacing: f32) -> SpatialGrid {
    let bounds = Aabb::from_bounds([[0.0; 3], [size; 3]]).expect("bounds");
    SpatialGrid::new(bounds, spacing).expect("grid")
}

pub fn sphere_compartment(id: i32, center: [f32; 3], radius: f32) -> CompartmentSpec {
    CompartmentSpec {
        id,
        shape: CompartmentShape::Sphere { center, radius },
    }
}

pub fn box_compartment(id: i32, min: [f32; 3], max: [f32; 3]) -> CompartmentSpec {
    CompartmentSpec {
        id,
        shape: CompartmentShape::Box { min, max },
    }
}
