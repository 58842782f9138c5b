//! Spatial weighting used to bias candidate selection.
//!
//! Every mode reduces a grid point to a normalized distance `s` in `[0, 1]`
//! from its reference (0 = at the reference, 1 = farthest); the weight mode
//! turns `s` into a weight in `[0, 1]`, and the pick mode turns weights into
//! a choice among candidate points.

use cell_core::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::compartment::{CompartmentShape, CompartmentSpec};
use crate::error::{PackError, PackResult};
use crate::grid::SpatialGrid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientMode {
    X,
    Y,
    Z,
    Vector,
    Radial,
    Surface,
    Uniform,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightMode {
    #[default]
    Linear,
    Square,
    Cube,
    Power,
    Exponential,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickMode {
    /// Highest-weight untried point.
    Max,
    /// Lowest-weight untried point.
    Min,
    /// Proportional to weight, linear scan.
    #[default]
    Rnd,
    /// Proportional to weight, prefix sums and binary search.
    Binary,
    /// Uniform among the top `sub_fraction` of candidates by weight.
    Sub,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModeSettings {
    #[serde(default)]
    pub direction: Option<[f32; 3]>,
    #[serde(default)]
    pub center: Option<[f32; 3]>,
    #[serde(default)]
    pub radius: Option<f32>,
    /// Compartment whose surface is the reference in `surface` mode.
    #[serde(default)]
    pub compartment: Option<i32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WeightModeSettings {
    #[serde(default)]
    pub power: Option<f32>,
    #[serde(default)]
    pub decay_length: Option<f32>,
    #[serde(default)]
    pub sub_fraction: Option<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GradientSpec {
    pub name: String,
    pub mode: GradientMode,
    #[serde(default)]
    pub weight_mode: WeightMode,
    #[serde(default)]
    pub pick_mode: PickMode,
    #[serde(default)]
    pub mode_settings: ModeSettings,
    #[serde(default)]
    pub weight_mode_settings: WeightModeSettings,
    #[serde(default)]
    pub invert: bool,
}

#[derive(Clone, Debug)]
enum Reference {
    Direction(Vec3),
    Radial { center: Vec3, radius: f32 },
    Surface(CompartmentShape),
    Uniform,
}

#[derive(Clone, Debug)]
pub struct GradientField {
    reference: Reference,
    weight_mode: WeightMode,
    pick_mode: PickMode,
    power: f32,
    decay_length: f32,
    sub_fraction: f32,
    invert: bool,
}

impl GradientField {
    /// Validates that exactly the settings matching `mode` are populated.
    pub fn new(spec: &GradientSpec, compartments: &[CompartmentSpec]) -> PackResult<Self> {
        let s = &spec.mode_settings;
        let has_direction = s.direction.is_some();
        let has_radial = s.center.is_some() || s.radius.is_some();
        let has_object = s.compartment.is_some();
        let populated = [has_direction, has_radial, has_object]
            .iter()
            .filter(|&&b| b)
            .count();
        let invalid = |msg: &str| PackError::Invalid(format!("gradient {}: {msg}", spec.name));

        let reference = match spec.mode {
            GradientMode::X | GradientMode::Y | GradientMode::Z | GradientMode::Uniform => {
                if populated != 0 {
                    return Err(invalid("axis and uniform modes take no mode settings"));
                }
                match spec.mode {
                    GradientMode::X => Reference::Direction(Vec3::new(1.0, 0.0, 0.0)),
                    GradientMode::Y => Reference::Direction(Vec3::new(0.0, 1.0, 0.0)),
                    GradientMode::Z => Reference::Direction(Vec3::new(0.0, 0.0, 1.0)),
                    _ => Reference::Uniform,
                }
            }
            GradientMode::Vector => {
                if populated != 1 || !has_direction {
                    return Err(invalid("vector mode requires only a direction"));
                }
                let dir = s
                    .direction
                    .map(Vec3::from_array)
                    .and_then(Vec3::normalized)
                    .ok_or_else(|| invalid("direction must be non-zero"))?;
                Reference::Direction(dir)
            }
            GradientMode::Radial => {
                if populated != 1 {
                    return Err(invalid("radial mode requires only center and radius"));
                }
                let (Some(center), Some(radius)) = (s.center, s.radius) else {
                    return Err(invalid("radial mode requires center and radius"));
                };
                if !(radius > 0.0) {
                    return Err(invalid("radius must be > 0"));
                }
                Reference::Radial {
                    center: Vec3::from_array(center),
                    radius,
                }
            }
            GradientMode::Surface => {
                if populated != 1 {
                    return Err(invalid("surface mode requires only a compartment"));
                }
                let id = s.compartment.unwrap_or_default();
                let shape = compartments
                    .iter()
                    .find(|c| c.id == id)
                    .map(|c| c.shape.clone())
                    .ok_or_else(|| invalid(&format!("unknown compartment {id}")))?;
                Reference::Surface(shape)
            }
        };

        let w = &spec.weight_mode_settings;
        let power = w.power.unwrap_or(2.0);
        let decay_length = w.decay_length.unwrap_or(0.3);
        let sub_fraction = w.sub_fraction.unwrap_or(0.1);
        if !(power > 0.0) {
            return Err(invalid("power must be > 0"));
        }
        if !(decay_length > 0.0) {
            return Err(invalid("decay_length must be > 0"));
        }
        if !(sub_fraction > 0.0 && sub_fraction <= 1.0) {
            return Err(invalid("sub_fraction must be in (0, 1]"));
        }

        Ok(Self {
            reference,
            weight_mode: spec.weight_mode,
            pick_mode: spec.pick_mode,
            power,
            decay_length,
            sub_fraction,
            invert: spec.invert,
        })
    }

    fn weight_from_normalized(&self, s: f32) -> f32 {
        let s = s.clamp(0.0, 1.0);
        let base = 1.0 - s;
        let w = match self.weight_mode {
            WeightMode::Linear => base,
            WeightMode::Square => base * base,
            WeightMode::Cube => base * base * base,
            WeightMode::Power => base.powf(self.power),
            WeightMode::Exponential => (-s / self.decay_length).exp(),
        };
        let w = w.clamp(0.0, 1.0);
        if self.invert {
            1.0 - w
        } else {
            w
        }
    }

    /// Per-point weights over the whole grid. Read-only on the grid.
    pub fn weights(&self, grid: &SpatialGrid) -> Vec<f32> {
        match &self.reference {
            Reference::Uniform => vec![self.weight_from_normalized(0.0); grid.len()],
            Reference::Direction(dir) => {
                let bounds = grid.bounds();
                let mut lo = f32::INFINITY;
                let mut hi = f32::NEG_INFINITY;
                for corner in 0..8 {
                    let c = Vec3::new(
                        if corner & 1 == 0 { bounds.min.x } else { bounds.max.x },
                        if corner & 2 == 0 { bounds.min.y } else { bounds.max.y },
                        if corner & 4 == 0 { bounds.min.z } else { bounds.max.z },
                    );
                    let proj = c.dot(*dir);
                    lo = lo.min(proj);
                    hi = hi.max(proj);
                }
                let span = (hi - lo).max(1.0e-6);
                // Weight grows along the direction.
                grid.par_map_points(|_, p| self.weight_from_normalized((hi - p.dot(*dir)) / span))
            }
            Reference::Radial { center, radius } => grid.par_map_points(|_, p| {
                self.weight_from_normalized(p.distance(*center) / radius)
            }),
            Reference::Surface(shape) => {
                let raw = grid.par_map_points(|_, p| shape.signed_distance(p).abs());
                let scale = raw.iter().copied().fold(0.0f32, f32::max);
                if scale <= 0.0 {
                    return vec![self.weight_from_normalized(0.0); grid.len()];
                }
                raw.into_iter()
                    .map(|d| self.weight_from_normalized(d / scale))
                    .collect()
            }
        }
    }

    /// Chooses one entry of `candidates` (grid indices) using per-point `weights`.
    ///
    /// Returns the position within `candidates`, or `None` when it is empty.
    pub fn pick<R: Rng + ?Sized>(
        &self,
        weights: &[f32],
        candidates: &[usize],
        rng: &mut R,
    ) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let w = |pos: usize| weights[candidates[pos]];
        match self.pick_mode {
            PickMode::Max => (0..candidates.len()).max_by(|&a, &b| w(a).total_cmp(&w(b))),
            PickMode::Min => (0..candidates.len()).min_by(|&a, &b| w(a).total_cmp(&w(b))),
            PickMode::Rnd => {
                let total: f32 = (0..candidates.len()).map(w).sum();
                if !(total > 0.0) {
                    return Some(rng.gen_range(0..candidates.len()));
                }
                let mut target = rng.gen::<f32>() * total;
                for pos in 0..candidates.len() {
                    target -= w(pos);
                    if target <= 0.0 && w(pos) > 0.0 {
                        return Some(pos);
                    }
                }
                (0..candidates.len()).rev().find(|&pos| w(pos) > 0.0)
            }
            PickMode::Binary => {
                let mut prefix = Vec::with_capacity(candidates.len());
                let mut acc = 0.0f32;
                for pos in 0..candidates.len() {
                    acc += w(pos);
                    prefix.push(acc);
                }
                if !(acc > 0.0) {
                    return Some(rng.gen_range(0..candidates.len()));
                }
                let target = rng.gen::<f32>() * acc;
                let pos = prefix.partition_point(|&c| c <= target);
                if pos < candidates.len() {
                    Some(pos)
                } else {
                    (0..candidates.len()).rev().find(|&pos| w(pos) > 0.0)
                }
            }
            PickMode::Sub => {
                let keep = ((candidates.len() as f32 * self.sub_fraction).ceil() as usize)
                    .clamp(1, candidates.len());
                let mut order: Vec<usize> = (0..candidates.len()).collect();
                order.select_nth_unstable_by(keep - 1, |&a, &b| w(b).total_cmp(&w(a)));
                Some(order[rng.gen_range(0..keep)])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cell_core::Aabb;
    use rand::{rngs::StdRng, SeedableRng};

    fn spec(mode: GradientMode) -> GradientSpec {
        GradientSpec {
            name: "g".into(),
            mode,
            weight_mode: WeightMode::Linear,
            pick_mode: PickMode::Max,
            mode_settings: ModeSettings::default(),
            weight_mode_settings: WeightModeSettings::default(),
            invert: false,
        }
    }

    fn grid() -> SpatialGrid {
        let bounds = Aabb::from_bounds([[0.0, 0.0, 0.0], [10.0, 10.0, 10.0]]).unwrap();
        SpatialGrid::new(bounds, 1.0).unwrap()
    }

    #[test]
    fn settings_must_match_mode() {
        let mut radial = spec(GradientMode::Radial);
        assert!(GradientField::new(&radial, &[]).is_err());
        radial.mode_settings.center = Some([5.0, 5.0, 5.0]);
        radial.mode_settings.radius = Some(5.0);
        assert!(GradientField::new(&radial, &[]).is_ok());
        radial.mode_settings.direction = Some([1.0, 0.0, 0.0]);
        assert!(GradientField::new(&radial, &[]).is_err());

        let mut x = spec(GradientMode::X);
        x.mode_settings.direction = Some([1.0, 0.0, 0.0]);
        assert!(GradientField::new(&x, &[]).is_err());

        let mut surface = spec(GradientMode::Surface);
        surface.mode_settings.compartment = Some(4);
        assert!(GradientField::new(&surface, &[]).is_err());
    }

    #[test]
    fn x_gradient_grows_along_axis() {
        let field = GradientField::new(&spec(GradientMode::X), &[]).unwrap();
        let g = grid();
        let w = field.weights(&g);
        let low = g.index_of(0, 5, 5);
        let high = g.index_of(9, 5, 5);
        assert!(w[high] > w[low]);
        assert!(w.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn radial_weight_peaks_at_center_and_inverts() {
        let mut s = spec(GradientMode::Radial);
        s.mode_settings.center = Some([5.0, 5.0, 5.0]);
        s.mode_settings.radius = Some(5.0);
        s.weight_mode = WeightMode::Square;
        let g = grid();
        let field = GradientField::new(&s, &[]).unwrap();
        let w = field.weights(&g);
        let center = g.index_of(4, 4, 4);
        let corner = g.index_of(0, 0, 0);
        assert!(w[center] > w[corner]);
        s.invert = true;
        let inverted = GradientField::new(&s, &[]).unwrap().weights(&g);
        assert!(inverted[center] < inverted[corner]);
    }

    #[test]
    fn max_and_min_pick_extremes() {
        let weights = vec![0.1, 0.9, 0.5, 0.3];
        let candidates = vec![0, 2, 1, 3];
        let mut rng = StdRng::seed_from_u64(1);
        let field = GradientField::new(&spec(GradientMode::Uniform), &[]).unwrap();
        assert_eq!(field.pick(&weights, &candidates, &mut rng), Some(2));
        let mut min = spec(GradientMode::Uniform);
        min.pick_mode = PickMode::Min;
        let field = GradientField::new(&min, &[]).unwrap();
        assert_eq!(field.pick(&weights, &candidates, &mut rng), Some(0));
        assert_eq!(field.pick(&weights, &[], &mut rng), None);
    }

    #[test]
    fn weighted_picks_never_choose_zero_weight() {
        let weights = vec![0.0, 1.0, 0.0, 3.0];
        let candidates = vec![0, 1, 2, 3];
        let mut rng = StdRng::seed_from_u64(9);
        for mode in [PickMode::Rnd, PickMode::Binary] {
            let mut s = spec(GradientMode::Uniform);
            s.pick_mode = mode;
            let field = GradientField::new(&s, &[]).unwrap();
            let mut counts = [0usize; 4];
            for _ in 0..2000 {
                let pos = field.pick(&weights, &candidates, &mut rng).unwrap();
                counts[candidates[pos]] += 1;
            }
            assert_eq!(counts[0], 0);
            assert_eq!(counts[2], 0);
            assert!(counts[3] > counts[1]);
        }
    }

    /// Always draws the top of the unit interval.
    struct TopRng;

    impl rand::RngCore for TopRng {
        fn next_u32(&mut self) -> u32 {
            u32::MAX
        }

        fn next_u64(&mut self) -> u64 {
            u64::MAX
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0xff);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn binary_pick_skips_trailing_zero_weights() {
        let weights = vec![1.0, 2.0, 0.0, 0.0];
        let candidates = vec![0, 1, 2, 3];
        let mut s = spec(GradientMode::Uniform);
        s.pick_mode = PickMode::Binary;
        let field = GradientField::new(&s, &[]).unwrap();
        assert_eq!(field.pick(&weights, &candidates, &mut TopRng), Some(1));
    }

    #[test]
    fn surface_weight_peaks_at_compartment_wall() {
        let compartments = vec![CompartmentSpec {
            id: 2,
            shape: CompartmentShape::Sphere {
                center: [5.0, 5.0, 5.0],
                radius: 3.0,
            },
        }];
        let mut s = spec(GradientMode::Surface);
        s.mode_settings.compartment = Some(2);
        let g = grid();
        let w = GradientField::new(&s, &compartments).unwrap().weights(&g);
        let near_wall = g.index_of(4, 4, 2);
        let center = g.index_of(4, 4, 4);
        let corner = g.index_of(0, 0, 0);
        assert!(w[near_wall] > w[center]);
        assert!(w[center] > w[corner]);
        assert!(w[corner].abs() < 1e-6);
    }

    #[test]
    fn vector_gradient_follows_negative_direction() {
        let mut s = spec(GradientMode::Vector);
        s.mode_settings.direction = Some([-2.0, 0.0, 0.0]);
        let g = grid();
        let w = GradientField::new(&s, &[]).unwrap().weights(&g);
        let low_x = g.index_of(0, 5, 5);
        let high_x = g.index_of(9, 5, 5);
        assert!((w[low_x] - 0.95).abs() < 1e-5);
        assert!((w[high_x] - 0.05).abs() < 1e-5);
    }

    #[test]
    fn weight_modes_follow_their_formulas() {
        let g = grid();
        let cases: [(WeightMode, fn(f32) -> f32); 3] = [
            (WeightMode::Cube, |s| (1.0 - s).powi(3)),
            (WeightMode::Power, |s| (1.0 - s).powf(3.5)),
            (WeightMode::Exponential, |s| (-s / 0.25).exp()),
        ];
        for (mode, expected) in cases {
            let mut s = spec(GradientMode::X);
            s.weight_mode = mode;
            s.weight_mode_settings.power = Some(3.5);
            s.weight_mode_settings.decay_length = Some(0.25);
            let w = GradientField::new(&s, &[]).unwrap().weights(&g);
            for ix in [0, 4, 9] {
                let idx = g.index_of(ix, 5, 5);
                // Normalized distance from the high-x face.
                let dist = (10.0 - g.point(idx).x) / 10.0;
                assert!(
                    (w[idx] - expected(dist)).abs() < 1e-5,
                    "{mode:?} at x index {ix}"
                );
            }
        }
    }

    #[test]
    fn sub_picks_from_top_fraction() {
        let weights: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let candidates: Vec<usize> = (0..100).collect();
        let mut s = spec(GradientMode::Uniform);
        s.pick_mode = PickMode::Sub;
        s.weight_mode_settings.sub_fraction = Some(0.1);
        let field = GradientField::new(&s, &[]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let pos = field.pick(&weights, &candidates, &mut rng).unwrap();
            assert!(candidates[pos] >= 90);
        }
    }
}
