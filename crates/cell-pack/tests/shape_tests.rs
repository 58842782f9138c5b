use cell_core::{Pose, Quaternion, Vec3};
use cell_pack::compartment::assign_compartment;
use cell_pack::shape::{
    cylinder_distance, project_on_axis, AxisProjection, CollisionScratch, CylinderLevelSpec,
    Primitive, ShapeDescriptor, ShapeProxy,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

mod common;
use common::{box_compartment, cube_grid, dumbbell, ingredient, proxy, sphere_ingredient};

#[test]
fn coarse_shell_bounds_every_fine_contact() {
    let shape = proxy(&ingredient("tree", 1, dumbbell()));
    let mut rng = StdRng::seed_from_u64(17);
    let pose = Pose::new(Vec3::new(5.0, 5.0, 5.0), Quaternion::random(&mut rng));
    let coarse = shape.world_primitives(&pose, 0);
    let fine = shape.world_primitives(&pose, shape.deepest_level());
    for _ in 0..500 {
        let sample = Primitive::Sphere {
            center: Vec3::new(
                rng.gen_range(0.0..10.0),
                rng.gen_range(0.0..10.0),
                rng.gen_range(0.0..10.0),
            ),
            radius: rng.gen_range(0.1..1.5),
        };
        let hits_coarse = coarse.iter().any(|c| c.overlaps(&sample, 0.0));
        let hits_fine = fine.iter().any(|f| f.overlaps(&sample, 0.0));
        if !hits_coarse {
            assert!(!hits_fine);
        }
    }
}

#[test]
fn occupancy_outside_coarse_shell_never_rejects() {
    let shape = proxy(&ingredient("tree", 1, dumbbell()));
    let mut grid = cube_grid(12.0, 1.0);
    let center = Vec3::new(6.0, 6.0, 6.0);
    for idx in 0..grid.len() {
        if grid.point(idx).distance(center) > 3.2 {
            grid.commit_distance_update(idx, -1.0);
        }
    }
    let mut scratch = CollisionScratch::new(grid.len());
    let pose = Pose::from_translation(center);
    let outcome = shape.test_pose(&pose, &grid, 1.0, &mut scratch);
    assert!(!outcome.rejected);
    assert!(!outcome.inside_points.is_empty());
}

#[test]
fn coarse_rejection_is_final() {
    let shape = proxy(&ingredient("tree", 1, dumbbell()));
    let mut grid = cube_grid(12.0, 1.0);
    let center = Vec3::new(6.5, 6.5, 6.5);
    // Occupied point inside the shell but clear of both fine spheres.
    let idx = grid
        .points_in_sphere(center.add(Vec3::new(2.0, 0.0, 0.0)), 0.1)
        .first()
        .copied()
        .expect("sample point");
    grid.commit_distance_update(idx, -1.0);
    let mut scratch = CollisionScratch::new(grid.len());
    let pose = Pose::from_translation(center);
    let fine_only = shape.collision_jitter(&pose, shape.deepest_level(), &grid, 0.0, &mut scratch);
    assert!(!fine_only.rejected);
    assert!(shape.test_pose(&pose, &grid, 0.0, &mut scratch).rejected);
}

#[test]
fn compartment_test_is_idempotent_and_read_only() {
    let mut spec = sphere_ingredient("s", 1, 1.5);
    spec.compartment = 1;
    let shape = proxy(&spec);
    let mut grid = cube_grid(10.0, 1.0);
    assign_compartment(&mut grid, &box_compartment(1, [0.0; 3], [5.0, 10.0, 10.0])).unwrap();
    let distances = grid.distances().to_vec();
    let ids = grid.compartments().to_vec();
    let mut rng = StdRng::seed_from_u64(2);
    for _ in 0..50 {
        let pose = Pose::new(
            Vec3::new(
                rng.gen_range(0.0..10.0),
                rng.gen_range(0.0..10.0),
                rng.gen_range(0.0..10.0),
            ),
            Quaternion::random(&mut rng),
        );
        let first = shape.collides_with_compartment(&pose, 0, &grid);
        let second = shape.collides_with_compartment(&pose, 0, &grid);
        assert_eq!(first, second);
    }
    assert_eq!(grid.distances(), distances.as_slice());
    assert_eq!(grid.compartments(), ids.as_slice());
}

#[test]
fn wrong_compartment_rejects_every_pose() {
    let mut spec = sphere_ingredient("s", 1, 1.0);
    spec.compartment = 2;
    let shape = proxy(&spec);
    let mut grid = cube_grid(10.0, 1.0);
    assign_compartment(&mut grid, &box_compartment(1, [0.0; 3], [10.0; 3])).unwrap();
    assert!(grid.compartments().iter().all(|&id| id == 1));
    let mut rng = StdRng::seed_from_u64(8);
    for _ in 0..100 {
        let pose = Pose::from_translation(Vec3::new(
            rng.gen_range(0.5..9.5),
            rng.gen_range(0.5..9.5),
            rng.gen_range(0.5..9.5),
        ));
        assert!(shape.collides_with_compartment(&pose, 0, &grid));
    }
}

#[test]
fn far_cap_point_on_tilted_cylinder_uses_endpoint_distance() {
    let a = Vec3::new(1.0, 2.0, 3.0);
    let dir = Vec3::new(1.0, 1.0, 1.0).normalized().unwrap();
    let b = a.add(dir.scale(10.0));
    let length_squared = a.distance_squared(b);
    // dotp = t * |axis| for a point at parameter t along the unit direction.
    let t = (length_squared + 0.5) / length_squared.sqrt();
    let sample = a.add(dir.scale(t)).add(dir.any_orthogonal().scale(0.3));
    match project_on_axis(sample, a, b) {
        AxisProjection::BeyondCap { endpoint_squared } => {
            assert!((endpoint_squared - sample.distance_squared(b)).abs() < 1e-3);
        }
        other => panic!("expected endpoint branch, got {other:?}"),
    }
    assert!((cylinder_distance(sample, a, b, 1.0) - sample.distance(b)).abs() < 1e-3);
}

#[test]
fn cylinder_ingredient_marks_axis_points() {
    let desc = ShapeDescriptor::Cylinder {
        levels: vec![CylinderLevelSpec {
            positions: vec![[0.0, 0.0, -5.0]],
            positions2: vec![[0.0, 0.0, 5.0]],
            radii: vec![1.0],
        }],
    };
    let shape = ShapeProxy::new(&desc, [0.0, 0.0, 1.0], 0, None).unwrap();
    let grid = cube_grid(14.0, 1.0);
    let mut scratch = CollisionScratch::new(grid.len());
    let pose = Pose::from_translation(Vec3::new(7.0, 7.0, 7.0));
    let outcome = shape.collision_jitter(&pose, 0, &grid, 2.0, &mut scratch);
    assert!(!outcome.rejected);
    // 4 columns of 10 points sit within radius 1 of the axis.
    assert_eq!(outcome.inside_points.len(), 40);
    for &(_, d) in &outcome.new_dist_points {
        assert!(d > 0.0 && d <= 2.0 + 1e-4);
    }
}
