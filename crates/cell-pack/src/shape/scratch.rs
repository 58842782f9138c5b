/// Result of a full collision test for one pose at one level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JitterOutcome {
    pub rejected: bool,
    /// Points inside the trial geometry with their (non-positive) distance.
    pub inside_points: Vec<(usize, f32)>,
    /// Points near the trial geometry whose stored distance it would lower.
    pub new_dist_points: Vec<(usize, f32)>,
}

impl JitterOutcome {
    pub fn rejected() -> Self {
        Self {
            rejected: true,
            ..Self::default()
        }
    }
}

const UNSET: f32 = f32::INFINITY;

/// Per-point bookkeeping arena sized to the grid.
///
/// Slots are indexed by grid point; only touched slots are reset between
/// attempts, so a test costs nothing proportional to the grid size.
#[derive(Debug, Default)]
pub struct CollisionScratch {
    inside: Vec<f32>,
    near: Vec<f32>,
    touched: Vec<usize>,
}

impl CollisionScratch {
    pub fn new(grid_len: usize) -> Self {
        Self {
            inside: vec![UNSET; grid_len],
            near: vec![UNSET; grid_len],
            touched: Vec::new(),
        }
    }

    /// Clears the previous attempt and makes sure the arena covers `grid_len` points.
    pub fn begin(&mut self, grid_len: usize) {
        self.reset();
        if self.inside.len() != grid_len {
            self.inside = vec![UNSET; grid_len];
            self.near = vec![UNSET; grid_len];
        }
    }

    fn reset(&mut self) {
        for &idx in &self.touched {
            self.inside[idx] = UNSET;
            self.near[idx] = UNSET;
        }
        self.touched.clear();
    }

    fn touch(&mut self, idx: usize) {
        if self.inside[idx] == UNSET && self.near[idx] == UNSET {
            self.touched.push(idx);
        }
    }

    /// Keeps the most negative distance per point.
    pub fn record_inside(&mut self, idx: usize, d: f32) {
        self.touch(idx);
        if d < self.inside[idx] {
            self.inside[idx] = d;
        }
    }

    /// Keeps the smallest positive distance per point.
    pub fn record_near(&mut self, idx: usize, d: f32) {
        self.touch(idx);
        if d < self.near[idx] {
            self.near[idx] = d;
        }
    }

    pub fn near_at(&self, idx: usize) -> f32 {
        self.near[idx]
    }

    /// Drains the arena into an accepted outcome. Points inside any primitive are
    /// reported only as inside points.
    pub fn finish(&mut self) -> JitterOutcome {
        let mut out = JitterOutcome::default();
        for &idx in &self.touched {
            let inside = self.inside[idx];
            if inside != UNSET {
                out.inside_points.push((idx, inside));
            } else if self.near[idx] != UNSET {
                out.new_dist_points.push((idx, self.near[idx]));
            }
        }
        self.reset();
        out
    }

    /// Abandons the current attempt.
    pub fn reject(&mut self) -> JitterOutcome {
        self.reset();
        JitterOutcome::rejected()
    }
}
