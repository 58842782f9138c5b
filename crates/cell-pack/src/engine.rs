//! Per-instance placement: candidate selection, jittered trial poses,
//! collision testing and commit of accepted geometry into the grid.

use cell_core::{Pose, Vec3};
use rand::Rng;

use crate::config::{BoundaryPolicy, IngredientSpec, PackingMode};
use crate::error::PackResult;
use crate::gradient::GradientField;
use crate::grid::SpatialGrid;
use crate::orientation::RotationSampler;
use crate::placement::{PlacedInstance, PlacedRegistry, OVERLAP_TOLERANCE};
use crate::shape::{compartment_admissible, CollisionScratch, JitterOutcome, ShapeProxy};

/// Runtime view of one ingredient type.
#[derive(Clone, Debug)]
pub struct Ingredient {
    pub name: String,
    pub count: usize,
    pub shape: ShapeProxy,
    pub packing_mode: PackingMode,
    /// Index into the engine's gradients.
    pub gradient: Option<usize>,
    pub nb_jitter: usize,
    pub jitter_max: Vec3,
    pub rotation: RotationSampler,
    pub priority: i32,
}

impl Ingredient {
    /// Expects a normalized spec; missing per-ingredient values fall back to
    /// `default_nb_jitter` and half a grid step.
    pub fn from_spec(
        spec: &IngredientSpec,
        gradient: Option<usize>,
        default_nb_jitter: usize,
        spacing: f32,
    ) -> PackResult<Self> {
        let shape = ShapeProxy::new(
            &spec.shape,
            spec.principal_vector,
            spec.compartment,
            spec.encapsulating_radius,
        )?;
        let rotation = RotationSampler::new(
            &spec.orientation,
            shape.principal_vector(),
            spec.rotation_range.unwrap_or(2.0 * std::f32::consts::PI),
            spec.perturb_axis_amplitude,
        )?;
        Ok(Self {
            name: spec.name.clone(),
            count: spec.count,
            shape,
            packing_mode: spec.packing_mode,
            gradient,
            nb_jitter: spec.nb_jitter.unwrap_or(default_nb_jitter).max(1),
            jitter_max: Vec3::from_array(spec.jitter_max.unwrap_or([0.5 * spacing; 3])),
            rotation,
            priority: spec.priority,
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EngineSettings {
    /// Reach of the distance update beyond each primitive.
    pub padded_distance: f32,
    pub boundary: BoundaryPolicy,
    /// Candidate points tried per instance before giving up.
    pub max_candidates: usize,
    /// Largest bounding radius of any primitive that will be placed.
    pub max_bounding_radius: f32,
}

/// Steps of a single instance placement.
#[derive(Clone, Debug)]
pub enum PlacementState {
    SelectingCandidate,
    GeneratingPose {
        point: usize,
        jitters_left: usize,
    },
    TestingCollision {
        point: usize,
        pose: Pose,
        jitters_left: usize,
    },
    Accepted {
        pose: Pose,
        outcome: JitterOutcome,
    },
    RejectedRetry {
        point: usize,
        jitters_left: usize,
    },
    RejectedExhausted,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlacementOutcome {
    Placed {
        instance: PlacedInstance,
        candidates: usize,
    },
    Exhausted {
        candidates: usize,
        attempts: usize,
    },
}

impl PlacementOutcome {
    pub fn is_placed(&self) -> bool {
        matches!(self, PlacementOutcome::Placed { .. })
    }

    pub fn attempts(&self) -> usize {
        match self {
            PlacementOutcome::Placed { instance, .. } => instance.attempts,
            PlacementOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }
}

fn jitter_component<R: Rng + ?Sized>(rng: &mut R, max: f32) -> f32 {
    if max > 0.0 {
        rng.gen_range(-max..=max)
    } else {
        0.0
    }
}

struct WeightedGradient {
    field: GradientField,
    weights: Vec<f32>,
}

pub struct PlacementEngine {
    grid: SpatialGrid,
    registry: PlacedRegistry,
    scratch: CollisionScratch,
    gradients: Vec<WeightedGradient>,
    settings: EngineSettings,
    placed: Vec<PlacedInstance>,
}

impl PlacementEngine {
    pub fn new(grid: SpatialGrid, settings: EngineSettings) -> Self {
        let scratch = CollisionScratch::new(grid.len());
        Self {
            grid,
            registry: PlacedRegistry::new(settings.max_bounding_radius),
            scratch,
            gradients: Vec::new(),
            settings,
            placed: Vec::new(),
        }
    }

    /// Evaluates each field over the grid once; weights do not depend on occupancy.
    pub fn with_gradients(mut self, fields: Vec<GradientField>) -> Self {
        self.gradients = fields
            .into_iter()
            .map(|field| {
                let weights = field.weights(&self.grid);
                WeightedGradient { field, weights }
            })
            .collect();
        self
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn registry(&self) -> &PlacedRegistry {
        &self.registry
    }

    pub fn placed(&self) -> &[PlacedInstance] {
        &self.placed
    }

    pub fn into_parts(self) -> (SpatialGrid, Vec<PlacedInstance>) {
        (self.grid, self.placed)
    }

    fn boundary_ok(&self, center: Vec3, shape: &ShapeProxy) -> bool {
        let bounds = self.grid.bounds();
        match self.settings.boundary {
            BoundaryPolicy::Center => bounds.contains(center),
            BoundaryPolicy::Inside => bounds.contains_sphere(center, shape.encapsulating_radius()),
        }
    }

    /// Grid points the ingredient may be centred on: admissible compartment
    /// and at least `min_radius` of clearance.
    pub fn available_points(&self, ingredient: &Ingredient) -> Vec<usize> {
        let shape = &ingredient.shape;
        let clearance = shape.min_radius();
        let own = shape.compartment_id();
        (0..self.grid.len())
            .filter(|&idx| {
                compartment_admissible(own, self.grid.compartment_at(idx))
                    && self.grid.distance_at(idx) >= clearance
                    && self.boundary_ok(self.grid.point(idx), shape)
            })
            .collect()
    }

    fn order_candidates(&self, ingredient: &Ingredient, candidates: &mut [usize]) {
        if ingredient.packing_mode == PackingMode::Close {
            // Popped from the back: smallest clearance first, lowest index on ties.
            let grid = &self.grid;
            candidates.sort_by(|&a, &b| {
                grid.distance_at(b)
                    .total_cmp(&grid.distance_at(a))
                    .then(b.cmp(&a))
            });
        }
    }

    fn select_candidate<R: Rng + ?Sized>(
        &self,
        ingredient: &Ingredient,
        candidates: &mut Vec<usize>,
        rng: &mut R,
    ) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        match ingredient.packing_mode {
            PackingMode::Close => candidates.pop(),
            PackingMode::Gradient => {
                let gradient = ingredient.gradient.and_then(|g| self.gradients.get(g))?;
                let pos = gradient
                    .field
                    .pick(&gradient.weights, candidates, rng)?;
                Some(candidates.swap_remove(pos))
            }
            PackingMode::Random => {
                let pos = rng.gen_range(0..candidates.len());
                Some(candidates.swap_remove(pos))
            }
        }
    }

    fn trial_pose<R: Rng + ?Sized>(
        &self,
        point: usize,
        ingredient: &Ingredient,
        rng: &mut R,
    ) -> Pose {
        let j = ingredient.jitter_max;
        let offset = Vec3::new(
            jitter_component(rng, j.x),
            jitter_component(rng, j.y),
            jitter_component(rng, j.z),
        );
        let rotation = ingredient.rotation.sample(rng);
        Pose::new(self.grid.point(point).add(offset), rotation)
    }

    /// Full test of one pose. Returns the bookkeeping to commit when accepted.
    pub fn test_pose(&mut self, ingredient: &Ingredient, pose: &Pose) -> Option<JitterOutcome> {
        let shape = &ingredient.shape;
        if !self.boundary_ok(pose.translation, shape) {
            return None;
        }
        let deepest = shape.deepest_level();
        if shape.collides_with_compartment(pose, deepest, &self.grid) {
            return None;
        }
        let outcome = shape.test_pose(
            pose,
            &self.grid,
            self.settings.padded_distance,
            &mut self.scratch,
        );
        if outcome.rejected {
            return None;
        }
        let primitives = shape.world_primitives(pose, deepest);
        if self
            .registry
            .overlaps_any(&primitives, OVERLAP_TOLERANCE)
        {
            return None;
        }
        Some(outcome)
    }

    fn commit(
        &mut self,
        ingredient: &Ingredient,
        ingredient_index: usize,
        instance_index: usize,
        pose: &Pose,
        outcome: &JitterOutcome,
        attempts: usize,
    ) -> PlacedInstance {
        for &(idx, d) in outcome
            .inside_points
            .iter()
            .chain(outcome.new_dist_points.iter())
        {
            self.grid.commit_distance_update(idx, d);
        }
        let primitives = ingredient
            .shape
            .world_primitives(pose, ingredient.shape.deepest_level());
        self.registry.insert(self.placed.len(), &primitives);
        let instance = PlacedInstance::new(
            &ingredient.name,
            ingredient_index,
            instance_index,
            pose,
            attempts,
        );
        self.placed.push(instance.clone());
        instance
    }

    /// Places one instance or reports exhaustion. Exhaustion leaves the grid untouched.
    pub fn place<R: Rng + ?Sized>(
        &mut self,
        ingredient: &Ingredient,
        ingredient_index: usize,
        instance_index: usize,
        rng: &mut R,
    ) -> PlacementOutcome {
        let mut candidates = self.available_points(ingredient);
        self.order_candidates(ingredient, &mut candidates);
        let mut tried = 0usize;
        let mut attempts = 0usize;
        let mut state = PlacementState::SelectingCandidate;
        loop {
            state = match state {
                PlacementState::SelectingCandidate => {
                    if tried >= self.settings.max_candidates {
                        PlacementState::RejectedExhausted
                    } else {
                        match self.select_candidate(ingredient, &mut candidates, rng) {
                            Some(point) => {
                                tried += 1;
                                PlacementState::GeneratingPose {
                                    point,
                                    jitters_left: ingredient.nb_jitter,
                                }
                            }
                            None => PlacementState::RejectedExhausted,
                        }
                    }
                }
                PlacementState::GeneratingPose {
                    point,
                    jitters_left,
                } => {
                    attempts += 1;
                    PlacementState::TestingCollision {
                        point,
                        pose: self.trial_pose(point, ingredient, rng),
                        jitters_left: jitters_left - 1,
                    }
                }
                PlacementState::TestingCollision {
                    point,
                    pose,
                    jitters_left,
                } => match self.test_pose(ingredient, &pose) {
                    Some(outcome) => PlacementState::Accepted { pose, outcome },
                    None => PlacementState::RejectedRetry {
                        point,
                        jitters_left,
                    },
                },
                PlacementState::RejectedRetry {
                    point,
                    jitters_left,
                } => {
                    if jitters_left > 0 {
                        PlacementState::GeneratingPose {
                            point,
                            jitters_left,
                        }
                    } else {
                        PlacementState::SelectingCandidate
                    }
                }
                PlacementState::Accepted { pose, outcome } => {
                    let instance = self.commit(
                        ingredient,
                        ingredient_index,
                        instance_index,
                        &pose,
                        &outcome,
                        attempts,
                    );
                    return PlacementOutcome::Placed {
                        instance,
                        candidates: tried,
                    };
                }
                PlacementState::RejectedExhausted => {
                    return PlacementOutcome::Exhausted {
                        candidates: tried,
                        attempts,
                    };
                }
            };
        }
    }
}
