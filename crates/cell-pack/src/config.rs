use std::f32::consts::PI;
use std::fs;
use std::path::Path;

use cell_core::Aabb;
use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::compartment::CompartmentSpec;
use crate::error::{PackError, PackResult};
use crate::gradient::GradientSpec;
use crate::orientation::OrientationSpec;
use crate::shape::ShapeDescriptor;

pub const DEFAULT_SEED: u64 = 1_234_567;
pub const DEFAULT_MAX_CANDIDATES: usize = 1000;
pub const DEFAULT_NB_JITTER: usize = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackConfig {
    pub bounding_box: [[f32; 3]; 2],
    pub spacing: f32,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Extra reach of the distance update beyond the largest ingredient.
    #[serde(default)]
    pub padding: f32,
    #[serde(default)]
    pub boundary: BoundaryPolicy,
    #[serde(default)]
    pub compartments: Vec<CompartmentSpec>,
    pub ingredients: Vec<IngredientSpec>,
    #[serde(default)]
    pub gradients: Vec<GradientSpec>,
    #[serde(default)]
    pub max_candidates: Option<usize>,
    #[serde(default)]
    pub nb_jitter: Option<usize>,
    #[serde(default)]
    pub runs: Option<usize>,
    /// Re-verify that no two placed instances overlap after packing.
    #[serde(default)]
    pub check: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Only the instance centre must lie in the bounding box.
    #[default]
    Center,
    /// The encapsulating sphere must lie in the bounding box.
    Inside,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingMode {
    #[default]
    Random,
    Close,
    Gradient,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceMethod {
    #[default]
    Jitter,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngredientSpec {
    pub name: String,
    #[serde(default = "default_count")]
    pub count: usize,
    pub shape: ShapeDescriptor,
    /// Compartment id; `<= 0` packs in free space.
    #[serde(default)]
    pub compartment: i32,
    #[serde(default = "default_principal_vector")]
    pub principal_vector: [f32; 3],
    #[serde(default)]
    pub packing_mode: PackingMode,
    #[serde(default)]
    pub place_method: PlaceMethod,
    #[serde(default)]
    pub gradient: Option<String>,
    #[serde(default)]
    pub nb_jitter: Option<usize>,
    #[serde(default)]
    pub jitter_max: Option<[f32; 3]>,
    #[serde(default)]
    pub perturb_axis_amplitude: f32,
    #[serde(default)]
    pub rotation_range: Option<f32>,
    #[serde(default)]
    pub orientation: OrientationSpec,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub encapsulating_radius: Option<f32>,
}

/// Reads a recipe from disk; `.yaml`/`.yml` is parsed as YAML, anything else as JSON.
pub fn load_config(path: &Path) -> PackResult<PackConfig> {
    let content = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    if ext == "yaml" || ext == "yml" {
        serde_yaml::from_str(&content)
            .map_err(|e| PackError::Parse(format!("yaml parse error: {e}")))
    } else {
        serde_json::from_str(&content)
            .map_err(|e| PackError::Parse(format!("json parse error: {e}")))
    }
}

fn default_count() -> usize {
    1
}

fn default_principal_vector() -> [f32; 3] {
    [0.0, 0.0, 1.0]
}

impl PackConfig {
    pub fn normalized(&self) -> PackResult<PackConfig> {
        let mut cfg = self.clone();
        cfg.validate()?;
        if cfg.seed.is_none() {
            cfg.seed = Some(DEFAULT_SEED);
        }
        if cfg.max_candidates.is_none() {
            cfg.max_candidates = Some(DEFAULT_MAX_CANDIDATES);
        }
        if cfg.nb_jitter.is_none() {
            cfg.nb_jitter = Some(DEFAULT_NB_JITTER);
        }
        if cfg.runs.is_none() {
            cfg.runs = Some(1);
        }
        let nb_jitter = cfg.nb_jitter.unwrap_or(DEFAULT_NB_JITTER);
        let half = 0.5 * cfg.spacing;
        for ing in &mut cfg.ingredients {
            if ing.nb_jitter.is_none() {
                ing.nb_jitter = Some(nb_jitter);
            }
            if ing.jitter_max.is_none() {
                ing.jitter_max = Some([half; 3]);
            }
            if ing.rotation_range.is_none() {
                ing.rotation_range = Some(2.0 * PI);
            }
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> PackResult<()> {
        if self.ingredients.is_empty() {
            return Err(PackError::Invalid("ingredients list is empty".into()));
        }
        Aabb::from_bounds(self.bounding_box)?;
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(PackError::Invalid("spacing must be > 0".into()));
        }
        if !(self.padding.is_finite() && self.padding >= 0.0) {
            return Err(PackError::Invalid("padding must be >= 0".into()));
        }
        if self.max_candidates == Some(0) {
            return Err(PackError::Invalid("max_candidates must be > 0".into()));
        }
        if self.nb_jitter == Some(0) {
            return Err(PackError::Invalid("nb_jitter must be > 0".into()));
        }
        if self.runs == Some(0) {
            return Err(PackError::Invalid("runs must be > 0".into()));
        }

        let mut compartment_ids = FxHashSet::default();
        for c in &self.compartments {
            if c.id == 0 {
                return Err(PackError::Invalid(
                    "compartment id 0 is reserved for free space".into(),
                ));
            }
            if !compartment_ids.insert(c.id) {
                return Err(PackError::Invalid(format!(
                    "duplicate compartment id {}",
                    c.id
                )));
            }
            c.shape.validate()?;
        }

        let mut gradient_names = FxHashSet::default();
        for g in &self.gradients {
            if !gradient_names.insert(g.name.as_str()) {
                return Err(PackError::Invalid(format!(
                    "duplicate gradient name {}",
                    g.name
                )));
            }
        }

        let mut ingredient_names = FxHashSet::default();
        for ing in &self.ingredients {
            if ing.name.is_empty() {
                return Err(PackError::Invalid("ingredient name cannot be empty".into()));
            }
            if !ingredient_names.insert(ing.name.as_str()) {
                return Err(PackError::Invalid(format!(
                    "duplicate ingredient name {}",
                    ing.name
                )));
            }
            if ing.count == 0 {
                return Err(PackError::Invalid(format!(
                    "ingredient {} count must be > 0",
                    ing.name
                )));
            }
            match (&ing.gradient, ing.packing_mode) {
                (Some(name), _) if !gradient_names.contains(name.as_str()) => {
                    return Err(PackError::Invalid(format!(
                        "ingredient {} references unknown gradient {name}",
                        ing.name
                    )));
                }
                (None, PackingMode::Gradient) => {
                    return Err(PackError::Invalid(format!(
                        "ingredient {} uses gradient packing without a gradient",
                        ing.name
                    )));
                }
                _ => {}
            }
            if ing.nb_jitter == Some(0) {
                return Err(PackError::Invalid(format!(
                    "ingredient {} nb_jitter must be > 0",
                    ing.name
                )));
            }
            if let Some(jitter) = ing.jitter_max {
                if jitter.iter().any(|&v| !(v.is_finite() && v >= 0.0)) {
                    return Err(PackError::Invalid(format!(
                        "ingredient {} jitter_max must be >= 0",
                        ing.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn total_instances(&self) -> usize {
        self.ingredients.iter().map(|i| i.count).sum()
    }
}
