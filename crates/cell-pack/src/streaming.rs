//! NDJSON progress events for cell-pack.
//!
//! Events go to stderr so stdout stays free for the JSON result.
//!
//! Event types:
//!   - pack_started: run configuration summary
//!   - phase_started: new phase (grid_build, compartments, gradients, placement)
//!   - instance_placed: per-instance placement result
//!   - phase_complete: phase finished with timing
//!   - pack_complete: final counts and profile
//!   - error: structural failure

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PackStartedEvent {
    pub seed: u64,
    pub total_instances: usize,
    pub ingredient_types: usize,
    pub bounds_min: [f32; 3],
    pub bounds_max: [f32; 3],
    pub spacing: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingPhase {
    GridBuild,
    Compartments,
    Gradients,
    Placement,
}

impl PackingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GridBuild => "grid_build",
            Self::Compartments => "compartments",
            Self::Gradients => "gradients",
            Self::Placement => "placement",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseStartedEvent {
    pub seed: u64,
    pub phase: PackingPhase,
    pub total_items: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct InstancePlacedEvent {
    pub seed: u64,
    pub instance_index: usize,
    pub total_instances: usize,
    pub ingredient: String,
    pub successful: bool,
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct PhaseCompleteEvent {
    pub seed: u64,
    pub phase: PackingPhase,
    pub elapsed_ms: u64,
    pub items: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PackCompleteEvent {
    pub seed: u64,
    pub total_requested: usize,
    pub total_placed: usize,
    pub under_packed: Vec<String>,
    pub elapsed_ms: u64,
    pub profile: PackProfile,
}

#[derive(Debug, Clone, Default)]
pub struct PackProfile {
    pub grid_build_ms: u64,
    pub compartments_ms: u64,
    pub gradients_ms: u64,
    pub placement_ms: u64,
}

fn opt_usize(v: Option<usize>) -> String {
    v.map(|n| n.to_string()).unwrap_or("null".to_string())
}

fn quoted(s: &str) -> String {
    serde_json::to_string(s).unwrap_or("\"\"".to_string())
}

impl PackStartedEvent {
    pub fn to_json(&self) -> String {
        format!(
            r#"{{"event":"pack_started","seed":{},"total_instances":{},"ingredient_types":{},"bounds_min":[{},{},{}],"bounds_max":[{},{},{}],"spacing":{}}}"#,
            self.seed,
            self.total_instances,
            self.ingredient_types,
            self.bounds_min[0],
            self.bounds_min[1],
            self.bounds_min[2],
            self.bounds_max[0],
            self.bounds_max[1],
            self.bounds_max[2],
            self.spacing
        )
    }
}

impl PhaseStartedEvent {
    pub fn to_json(&self) -> String {
        format!(
            r#"{{"event":"phase_started","seed":{},"phase":"{}","total_items":{}}}"#,
            self.seed,
            self.phase.as_str(),
            opt_usize(self.total_items)
        )
    }
}

impl InstancePlacedEvent {
    pub fn to_json(&self) -> String {
        let progress_pct = if self.total_instances > 0 {
            (self.instance_index + 1) as f64 / self.total_instances as f64 * 100.0
        } else {
            0.0
        };
        format!(
            r#"{{"event":"instance_placed","seed":{},"instance_index":{},"total_instances":{},"ingredient":{},"successful":{},"attempts":{},"progress_pct":{:.1}}}"#,
            self.seed,
            self.instance_index,
            self.total_instances,
            quoted(&self.ingredient),
            self.successful,
            self.attempts,
            progress_pct
        )
    }
}

impl PhaseCompleteEvent {
    pub fn to_json(&self) -> String {
        format!(
            r#"{{"event":"phase_complete","seed":{},"phase":"{}","elapsed_ms":{},"items":{}}}"#,
            self.seed,
            self.phase.as_str(),
            self.elapsed_ms,
            opt_usize(self.items)
        )
    }
}

impl PackCompleteEvent {
    pub fn to_json(&self) -> String {
        let under = serde_json::to_string(&self.under_packed).unwrap_or("[]".to_string());
        format!(
            r#"{{"event":"pack_complete","seed":{},"total_requested":{},"total_placed":{},"under_packed":{},"elapsed_ms":{},"profile_ms":{{"grid_build":{},"compartments":{},"gradients":{},"placement":{}}}}}"#,
            self.seed,
            self.total_requested,
            self.total_placed,
            under,
            self.elapsed_ms,
            self.profile.grid_build_ms,
            self.profile.compartments_ms,
            self.profile.gradients_ms,
            self.profile.placement_ms,
        )
    }
}

/// Streaming emitter for NDJSON events.
#[derive(Debug, Clone, Copy)]
pub struct StreamEmitter {
    enabled: bool,
}

impl StreamEmitter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn emit_json(&self, json: &str) {
        if self.is_enabled() {
            eprintln!("{}", json);
        }
    }

    pub fn emit_pack_started(&self, event: &PackStartedEvent) {
        if self.is_enabled() {
            self.emit_json(&event.to_json());
        }
    }

    pub fn emit_phase_started(&self, event: &PhaseStartedEvent) {
        if self.is_enabled() {
            self.emit_json(&event.to_json());
        }
    }

    pub fn emit_instance_placed(&self, event: &InstancePlacedEvent) {
        if self.is_enabled() {
            self.emit_json(&event.to_json());
        }
    }

    pub fn emit_phase_complete(&self, event: &PhaseCompleteEvent) {
        if self.is_enabled() {
            self.emit_json(&event.to_json());
        }
    }

    pub fn emit_pack_complete(&self, event: &PackCompleteEvent) {
        if self.is_enabled() {
            self.emit_json(&event.to_json());
        }
    }

    pub fn emit_error(&self, code: &str, message: &str, context: Option<&str>) {
        let ctx = context.map(quoted).unwrap_or("null".to_string());
        let json = format!(
            r#"{{"event":"error","code":{},"message":{},"context":{}}}"#,
            quoted(code),
            quoted(message),
            ctx
        );
        self.emit_json(&json);
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}
