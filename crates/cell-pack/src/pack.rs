use std::time::{Duration, Instant};

use cell_core::Aabb;
use fxhash::FxHashMap;
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use crate::compartment::assign_compartment;
use crate::config::{PackConfig, DEFAULT_MAX_CANDIDATES, DEFAULT_NB_JITTER, DEFAULT_SEED};
use crate::engine::{EngineSettings, Ingredient, PlacementEngine, PlacementOutcome};
use crate::error::{PackError, PackResult};
use crate::gradient::GradientField;
use crate::grid::{GridSnapshot, SpatialGrid};
use crate::placement::{PlacedInstance, OVERLAP_TOLERANCE};
use crate::shape::ShapeKind;
use crate::streaming::{
    duration_ms, InstancePlacedEvent, PackCompleteEvent, PackStartedEvent, PackingPhase,
    PhaseCompleteEvent, PhaseStartedEvent, StreamEmitter,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IngredientReport {
    pub name: String,
    pub shape: ShapeKind,
    pub requested: usize,
    pub placed: usize,
    /// Poses tested across all instances of this ingredient.
    pub attempts: usize,
    /// Set once an instance ran out of candidates; later instances are skipped.
    pub exhausted: bool,
}

impl IngredientReport {
    pub fn under_packed(&self) -> bool {
        self.placed < self.requested
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PackReport {
    pub ingredients: Vec<IngredientReport>,
    pub total_requested: usize,
    pub total_placed: usize,
}

impl PackReport {
    pub fn under_packed(&self) -> Vec<&IngredientReport> {
        self.ingredients.iter().filter(|r| r.under_packed()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.total_placed == self.total_requested
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PackOutput {
    pub seed: u64,
    pub instances: Vec<PlacedInstance>,
    pub report: PackReport,
    pub grid: GridSnapshot,
}

#[derive(Default)]
struct PackProfile {
    grid_build: Duration,
    compartments: Duration,
    gradients: Duration,
    placement: Duration,
}

impl PackProfile {
    fn enabled() -> bool {
        std::env::var("CELL_PACK_PROFILE").is_ok()
    }

    fn report(&self) {
        let secs = |d: Duration| d.as_secs_f64();
        let total = self.grid_build + self.compartments + self.gradients + self.placement;
        eprintln!(
            "cell-pack profile (s): total={:.3} grid_build={:.3} compartments={:.3} gradients={:.3} placement={:.3}",
            secs(total),
            secs(self.grid_build),
            secs(self.compartments),
            secs(self.gradients),
            secs(self.placement),
        );
    }

    fn to_event(&self) -> crate::streaming::PackProfile {
        crate::streaming::PackProfile {
            grid_build_ms: duration_ms(self.grid_build),
            compartments_ms: duration_ms(self.compartments),
            gradients_ms: duration_ms(self.gradients),
            placement_ms: duration_ms(self.placement),
        }
    }
}

/// Ingredient indices in placement order: descending priority, then
/// descending encapsulating radius. Ties keep recipe order.
pub fn placement_order(ingredients: &[Ingredient]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..ingredients.len()).collect();
    order.sort_by(|&a, &b| {
        let (ia, ib) = (&ingredients[a], &ingredients[b]);
        ib.priority.cmp(&ia.priority).then(
            ib.shape
                .encapsulating_radius()
                .total_cmp(&ia.shape.encapsulating_radius()),
        )
    });
    order
}

pub fn run(config: &PackConfig) -> PackResult<PackOutput> {
    run_with_stream(config, StreamEmitter::disabled())
}

pub fn run_with_stream(config: &PackConfig, emitter: StreamEmitter) -> PackResult<PackOutput> {
    let cfg = config.normalized()?;
    let seed = cfg.seed.unwrap_or(DEFAULT_SEED);
    run_once(&cfg, seed, emitter)
}

/// Runs `runs` independent packings in parallel with seeds `seed, seed + 1, ...`.
///
/// Each run owns its grid; results come back in seed order.
pub fn run_batch(config: &PackConfig) -> PackResult<Vec<PackOutput>> {
    run_batch_with_stream(config, StreamEmitter::disabled())
}

/// Like [`run_batch`], with every run streaming its own events.
///
/// Runs interleave on stderr; each event carries its run's seed.
pub fn run_batch_with_stream(
    config: &PackConfig,
    emitter: StreamEmitter,
) -> PackResult<Vec<PackOutput>> {
    let cfg = config.normalized()?;
    let seed = cfg.seed.unwrap_or(DEFAULT_SEED);
    let runs = cfg.runs.unwrap_or(1);
    (0..runs)
        .into_par_iter()
        .map(|i| run_once(&cfg, seed.wrapping_add(i as u64), emitter))
        .collect()
}

fn build_ingredients(cfg: &PackConfig) -> PackResult<Vec<Ingredient>> {
    let gradient_index: FxHashMap<&str, usize> = cfg
        .gradients
        .iter()
        .enumerate()
        .map(|(i, g)| (g.name.as_str(), i))
        .collect();
    let nb_jitter = cfg.nb_jitter.unwrap_or(DEFAULT_NB_JITTER);
    cfg.ingredients
        .iter()
        .map(|spec| {
            let gradient = match &spec.gradient {
                Some(name) => Some(*gradient_index.get(name.as_str()).ok_or_else(|| {
                    PackError::Invalid(format!("unknown gradient {name} for {}", spec.name))
                })?),
                None => None,
            };
            Ingredient::from_spec(spec, gradient, nb_jitter, cfg.spacing)
                .map_err(|e| match e {
                    PackError::Geometry(msg) => {
                        PackError::Geometry(format!("ingredient {}: {msg}", spec.name))
                    }
                    other => other,
                })
        })
        .collect()
}

fn run_once(cfg: &PackConfig, seed: u64, emitter: StreamEmitter) -> PackResult<PackOutput> {
    let mut profile = PackProfile::default();
    let started = Instant::now();
    let mut rng = StdRng::seed_from_u64(seed);
    let total_requested = cfg.total_instances();

    emitter.emit_pack_started(&PackStartedEvent {
        seed,
        total_instances: total_requested,
        ingredient_types: cfg.ingredients.len(),
        bounds_min: cfg.bounding_box[0],
        bounds_max: cfg.bounding_box[1],
        spacing: cfg.spacing,
    });

    let t_grid = Instant::now();
    emitter.emit_phase_started(&PhaseStartedEvent {
        seed,
        phase: PackingPhase::GridBuild,
        total_items: None,
    });
    let bounds = Aabb::from_bounds(cfg.bounding_box)?;
    let mut grid = SpatialGrid::new(bounds, cfg.spacing)?;
    profile.grid_build += t_grid.elapsed();
    emitter.emit_phase_complete(&PhaseCompleteEvent {
        seed,
        phase: PackingPhase::GridBuild,
        elapsed_ms: duration_ms(t_grid.elapsed()),
        items: Some(grid.len()),
    });

    let t_compartments = Instant::now();
    emitter.emit_phase_started(&PhaseStartedEvent {
        seed,
        phase: PackingPhase::Compartments,
        total_items: Some(cfg.compartments.len()),
    });
    for spec in &cfg.compartments {
        assign_compartment(&mut grid, spec)?;
    }
    profile.compartments += t_compartments.elapsed();
    emitter.emit_phase_complete(&PhaseCompleteEvent {
        seed,
        phase: PackingPhase::Compartments,
        elapsed_ms: duration_ms(t_compartments.elapsed()),
        items: Some(cfg.compartments.len()),
    });

    let ingredients = build_ingredients(cfg)?;
    let max_radius = ingredients
        .iter()
        .map(|i| i.shape.encapsulating_radius())
        .fold(0.0f32, f32::max);
    let settings = EngineSettings {
        padded_distance: max_radius + cfg.padding,
        boundary: cfg.boundary,
        max_candidates: cfg.max_candidates.unwrap_or(DEFAULT_MAX_CANDIDATES),
        max_bounding_radius: max_radius,
    };

    let t_gradients = Instant::now();
    emitter.emit_phase_started(&PhaseStartedEvent {
        seed,
        phase: PackingPhase::Gradients,
        total_items: Some(cfg.gradients.len()),
    });
    let fields = cfg
        .gradients
        .iter()
        .map(|g| GradientField::new(g, &cfg.compartments))
        .collect::<PackResult<Vec<_>>>()?;
    let mut engine = PlacementEngine::new(grid, settings).with_gradients(fields);
    profile.gradients += t_gradients.elapsed();
    emitter.emit_phase_complete(&PhaseCompleteEvent {
        seed,
        phase: PackingPhase::Gradients,
        elapsed_ms: duration_ms(t_gradients.elapsed()),
        items: Some(cfg.gradients.len()),
    });

    let t_place = Instant::now();
    emitter.emit_phase_started(&PhaseStartedEvent {
        seed,
        phase: PackingPhase::Placement,
        total_items: Some(total_requested),
    });
    let mut reports: Vec<IngredientReport> = ingredients
        .iter()
        .map(|ing| IngredientReport {
            name: ing.name.clone(),
            shape: ing.shape.kind(),
            requested: ing.count,
            placed: 0,
            attempts: 0,
            exhausted: false,
        })
        .collect();
    let mut processed = 0usize;
    for ing_idx in placement_order(&ingredients) {
        let ingredient = &ingredients[ing_idx];
        for instance_idx in 0..ingredient.count {
            let outcome = engine.place(ingredient, ing_idx, instance_idx, &mut rng);
            let report = &mut reports[ing_idx];
            report.attempts += outcome.attempts();
            if emitter.is_enabled() {
                emitter.emit_instance_placed(&InstancePlacedEvent {
                    seed,
                    instance_index: processed,
                    total_instances: total_requested,
                    ingredient: ingredient.name.clone(),
                    successful: outcome.is_placed(),
                    attempts: outcome.attempts(),
                });
            }
            processed += 1;
            match outcome {
                PlacementOutcome::Placed { .. } => report.placed += 1,
                PlacementOutcome::Exhausted { .. } => {
                    // Free space only shrinks, so the remaining instances would fail too.
                    report.exhausted = true;
                    break;
                }
            }
        }
    }
    profile.placement += t_place.elapsed();
    emitter.emit_phase_complete(&PhaseCompleteEvent {
        seed,
        phase: PackingPhase::Placement,
        elapsed_ms: duration_ms(t_place.elapsed()),
        items: Some(engine.placed().len()),
    });

    if cfg.check {
        if let Some((a, b)) = engine.registry().first_overlap(OVERLAP_TOLERANCE) {
            let msg = format!("check failed: instances {a} and {b} overlap");
            emitter.emit_error("placement", &msg, None);
            return Err(PackError::Placement(msg));
        }
    }

    let (grid, instances) = engine.into_parts();
    let report = PackReport {
        total_requested,
        total_placed: instances.len(),
        ingredients: reports,
    };

    emitter.emit_pack_complete(&PackCompleteEvent {
        seed,
        total_requested,
        total_placed: report.total_placed,
        under_packed: report
            .under_packed()
            .iter()
            .map(|r| r.name.clone())
            .collect(),
        elapsed_ms: duration_ms(started.elapsed()),
        profile: profile.to_event(),
    });
    if PackProfile::enabled() {
        profile.report();
    }

    Ok(PackOutput {
        seed,
        instances,
        report,
        grid: grid.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngredientSpec;
    use crate::shape::ShapeDescriptor;

    fn ingredient(name: &str, radius: f32, priority: i32) -> Ingredient {
        let spec: IngredientSpec = serde_json::from_value(serde_json::json!({
            "name": name,
            "shape": {"type": "sphere", "radius": radius},
            "priority": priority,
        }))
        .unwrap();
        assert!(matches!(spec.shape, ShapeDescriptor::Sphere { .. }));
        Ingredient::from_spec(&spec, None, 5, 1.0).unwrap()
    }

    #[test]
    fn order_by_priority_then_size() {
        let ingredients = vec![
            ingredient("small", 1.0, 0),
            ingredient("large", 3.0, 0),
            ingredient("urgent", 0.5, 2),
            ingredient("medium", 2.0, 0),
        ];
        assert_eq!(placement_order(&ingredients), vec![2, 1, 3, 0]);
    }

    #[test]
    fn report_flags_under_packed() {
        let report = PackReport {
            ingredients: vec![
                IngredientReport {
                    name: "a".into(),
                    shape: ShapeKind::Sphere,
                    requested: 2,
                    placed: 2,
                    attempts: 2,
                    exhausted: false,
                },
                IngredientReport {
                    name: "b".into(),
                    shape: ShapeKind::MultiSphere,
                    requested: 3,
                    placed: 1,
                    attempts: 40,
                    exhausted: true,
                },
            ],
            total_requested: 5,
            total_placed: 3,
        };
        let under = report.under_packed();
        assert_eq!(under.len(), 1);
        assert_eq!(under[0].name, "b");
        assert!(!report.is_complete());
    }
}
