use cell_core::{Aabb, Vec3};
use cell_pack::compartment::assign_compartment;
use cell_pack::config::{BoundaryPolicy, PackingMode};
use cell_pack::engine::{EngineSettings, Ingredient, PlacementEngine};
use cell_pack::gradient::{
    GradientMode, GradientSpec, ModeSettings, PickMode, WeightMode, WeightModeSettings,
};
use cell_pack::grid::SpatialGrid;
use cell_pack::orientation::OrientationSpec;
use cell_pack::pack::{run, run_batch, run_batch_with_stream};
use cell_pack::shape::ShapeKind;
use cell_pack::streaming::StreamEmitter;
use cell_pack::shape::{CollisionScratch, CylinderLevelSpec, ShapeDescriptor};
use rand::{rngs::StdRng, SeedableRng};

mod common;
use common::{
    base_config, box_compartment, cube_grid, dumbbell, ingredient, proxy, sphere_compartment,
    sphere_ingredient,
};

#[test]
fn two_spheres_keep_their_distance() {
    let cfg = base_config(
        10.0,
        vec![sphere_ingredient("a", 1, 2.0), sphere_ingredient("b", 1, 2.0)],
    );
    let out = run(&cfg).expect("pack");
    assert_eq!(out.instances.len(), 2);
    let a = Vec3::from_array(out.instances[0].translation);
    let b = Vec3::from_array(out.instances[1].translation);
    assert!(a.distance(b) >= 4.0 - 1e-3);
    assert!(out.report.is_complete());
}

#[test]
fn two_spheres_in_small_box_exhaust_second() {
    let mut cfg = base_config(
        3.0,
        vec![sphere_ingredient("a", 1, 2.0), sphere_ingredient("b", 1, 2.0)],
    );
    // Centres stay on lattice points, all within 2 * sqrt(3) of each other.
    for ing in &mut cfg.ingredients {
        ing.jitter_max = Some([0.0; 3]);
    }
    let out = run(&cfg).expect("pack");
    assert_eq!(out.instances.len(), 1);
    assert_eq!(out.instances[0].ingredient, "a");
    let under = out.report.under_packed();
    assert_eq!(under.len(), 1);
    assert_eq!(under[0].name, "b");
    assert!(under[0].exhausted);
}

#[test]
fn crowded_run_reports_partial_result() {
    let mut cfg = base_config(8.0, vec![sphere_ingredient("s", 200, 1.5)]);
    cfg.check = true;
    let out = run(&cfg).expect("partial result, not an error");
    let report = &out.report.ingredients[0];
    assert!(report.placed > 0);
    assert!(report.under_packed());
    assert_eq!(out.report.total_placed, out.instances.len());
}

#[test]
fn replaying_accepted_poses_finds_no_overlap() {
    let mut cfg = base_config(
        14.0,
        vec![
            ingredient("tree", 6, dumbbell()),
            sphere_ingredient("small", 20, 1.0),
        ],
    );
    cfg.check = true;
    let out = run(&cfg).expect("pack");
    assert!(out.instances.len() > 6);

    let shapes: Vec<_> = cfg.ingredients.iter().map(proxy).collect();
    let padded = 3.0;
    let mut grid = cube_grid(14.0, 1.0);
    let mut scratch = CollisionScratch::new(grid.len());
    for inst in &out.instances {
        let shape = &shapes[inst.ingredient_index];
        let outcome = shape.test_pose(&inst.pose(), &grid, padded, &mut scratch);
        assert!(!outcome.rejected, "instance {:?} overlaps", inst);
        for &(idx, d) in outcome
            .inside_points
            .iter()
            .chain(outcome.new_dist_points.iter())
        {
            grid.commit_distance_update(idx, d);
        }
    }
}

#[test]
fn distance_field_only_tightens() {
    let bounds = Aabb::from_bounds([[0.0; 3], [12.0; 3]]).unwrap();
    let grid = SpatialGrid::new(bounds, 1.0).unwrap();
    let spec = sphere_ingredient("s", 1, 1.5);
    let ing = Ingredient::from_spec(&spec, None, 5, 1.0).unwrap();
    let mut engine = PlacementEngine::new(
        grid,
        EngineSettings {
            padded_distance: 1.5,
            boundary: BoundaryPolicy::Center,
            max_candidates: 1000,
            max_bounding_radius: 1.5,
        },
    );
    let mut rng = StdRng::seed_from_u64(99);
    let mut previous = engine.grid().distances().to_vec();
    for i in 0..30 {
        engine.place(&ing, 0, i, &mut rng);
        let current = engine.grid().distances();
        assert!(previous.iter().zip(current).all(|(before, now)| now <= before));
        previous = current.to_vec();
    }
}

#[test]
fn compartment_members_cover_only_their_compartment() {
    let mut spec = sphere_ingredient("inner", 8, 1.0);
    spec.compartment = 1;
    let mut cfg = base_config(20.0, vec![spec, sphere_ingredient("outer", 8, 1.0)]);
    cfg.compartments = vec![sphere_compartment(1, [10.0, 10.0, 10.0], 6.0)];
    let out = run(&cfg).expect("pack");
    assert_eq!(out.report.total_placed, 16);

    let mut grid = cube_grid(20.0, 1.0);
    assign_compartment(&mut grid, &cfg.compartments[0]).unwrap();
    for inst in &out.instances {
        let center = Vec3::from_array(inst.translation);
        let expected = if inst.ingredient == "inner" { 1 } else { 0 };
        for idx in grid.points_in_sphere(center, 1.0) {
            assert_eq!(grid.compartment_at(idx), expected);
        }
    }
}

#[test]
fn wrong_compartment_places_nothing() {
    let mut spec = sphere_ingredient("s", 3, 1.0);
    spec.compartment = 2;
    let mut cfg = base_config(10.0, vec![spec]);
    cfg.compartments = vec![box_compartment(1, [0.0; 3], [10.0; 3])];
    let out = run(&cfg).expect("pack");
    assert!(out.instances.is_empty());
    assert!(out.report.ingredients[0].exhausted);
}

#[test]
fn same_seed_same_packing() {
    let cfg = base_config(12.0, vec![sphere_ingredient("s", 10, 1.2)]);
    let a = run(&cfg).expect("pack");
    let b = run(&cfg).expect("pack");
    assert_eq!(a.instances, b.instances);
}

#[test]
fn batch_runs_use_consecutive_seeds() {
    let mut cfg = base_config(10.0, vec![sphere_ingredient("s", 4, 1.0)]);
    cfg.runs = Some(3);
    let outs = run_batch(&cfg).expect("batch");
    assert_eq!(outs.len(), 3);
    let seeds: Vec<u64> = outs.iter().map(|o| o.seed).collect();
    assert_eq!(seeds, vec![42, 43, 44]);
    let single = run(&cfg).expect("pack");
    assert_eq!(single.instances, outs[0].instances);
}

#[test]
fn streamed_batch_matches_silent_batch() {
    let mut cfg = base_config(10.0, vec![sphere_ingredient("s", 4, 1.0)]);
    cfg.runs = Some(2);
    let silent = run_batch(&cfg).expect("batch");
    let streamed = run_batch_with_stream(&cfg, StreamEmitter::enabled()).expect("batch");
    assert_eq!(streamed.len(), 2);
    for (a, b) in silent.iter().zip(&streamed) {
        assert_eq!(a.seed, b.seed);
        assert_eq!(a.instances, b.instances);
        assert_eq!(a.report, b.report);
    }
}

#[test]
fn gradient_max_pick_starts_at_high_end() {
    let mut spec = sphere_ingredient("s", 1, 1.0);
    spec.packing_mode = PackingMode::Gradient;
    spec.gradient = Some("along_x".into());
    spec.jitter_max = Some([0.0; 3]);
    let mut cfg = base_config(10.0, vec![spec]);
    cfg.gradients = vec![GradientSpec {
        name: "along_x".into(),
        mode: GradientMode::X,
        weight_mode: WeightMode::Linear,
        pick_mode: PickMode::Max,
        mode_settings: ModeSettings::default(),
        weight_mode_settings: WeightModeSettings::default(),
        invert: false,
    }];
    let out = run(&cfg).expect("pack");
    assert_eq!(out.instances.len(), 1);
    assert!((out.instances[0].translation[0] - 9.5).abs() < 1e-5);
}

#[test]
fn inside_policy_keeps_instances_in_box() {
    let mut cfg = base_config(12.0, vec![sphere_ingredient("s", 10, 1.5)]);
    cfg.boundary = BoundaryPolicy::Inside;
    let out = run(&cfg).expect("pack");
    assert!(!out.instances.is_empty());
    for inst in &out.instances {
        for v in inst.translation {
            assert!((1.5..=10.5).contains(&v));
        }
    }
}

#[test]
fn fibers_and_cylinders_pack_without_overlap() {
    let mut fiber = ingredient(
        "fiber",
        4,
        ShapeDescriptor::Fiber {
            path: vec![[0.0, 0.0, -3.0], [0.0, 0.5, 0.0], [0.0, 0.0, 3.0]],
            radius: 0.5,
        },
    );
    fiber.orientation = OrientationSpec::Aligned {
        axis: [1.0, 0.0, 0.0],
    };
    fiber.perturb_axis_amplitude = 0.1;
    let rod = ingredient(
        "rod",
        4,
        ShapeDescriptor::Cylinder {
            levels: vec![
                CylinderLevelSpec {
                    positions: vec![[0.0, 0.0, -2.0]],
                    positions2: vec![[0.0, 0.0, 2.0]],
                    radii: vec![1.0],
                },
                CylinderLevelSpec {
                    positions: vec![[0.0, 0.0, -2.0], [0.0, 0.0, 0.0]],
                    positions2: vec![[0.0, 0.0, 0.0], [0.0, 0.0, 2.0]],
                    radii: vec![0.8, 0.8],
                },
            ],
        },
    );
    let mut cfg = base_config(20.0, vec![fiber, rod]);
    cfg.check = true;
    let out = run(&cfg).expect("pack");
    assert_eq!(out.report.total_placed, 8);
    let kinds: Vec<ShapeKind> = out.report.ingredients.iter().map(|r| r.shape).collect();
    assert_eq!(kinds, vec![ShapeKind::Fiber, ShapeKind::Cylinder]);
    assert_eq!(
        out.grid.distances.len(),
        out.grid.dims[0] * out.grid.dims[1] * out.grid.dims[2]
    );
}
