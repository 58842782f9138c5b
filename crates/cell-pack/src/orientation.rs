use std::f32::consts::PI;

use cell_core::{Quaternion, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PackError, PackResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OrientationSpec {
    #[default]
    Random,
    Fixed,
    /// Principal vector rotated onto `axis`, then spun about it.
    Aligned { axis: [f32; 3] },
}

#[derive(Clone, Debug)]
enum Sampling {
    Random,
    Fixed,
    Aligned { target: Vec3 },
}

/// Draws trial rotations for one ingredient.
#[derive(Clone, Debug)]
pub struct RotationSampler {
    sampling: Sampling,
    principal: Vec3,
    rotation_range: f32,
    perturb_axis_amplitude: f32,
}

impl RotationSampler {
    pub fn new(
        spec: &OrientationSpec,
        principal: Vec3,
        rotation_range: f32,
        perturb_axis_amplitude: f32,
    ) -> PackResult<Self> {
        if !(rotation_range >= 0.0 && rotation_range <= 2.0 * PI + 1.0e-4) {
            return Err(PackError::Invalid(
                "rotation_range must be in [0, 2*pi]".into(),
            ));
        }
        if !(perturb_axis_amplitude >= 0.0 && perturb_axis_amplitude <= PI) {
            return Err(PackError::Invalid(
                "perturb_axis_amplitude must be in [0, pi]".into(),
            ));
        }
        let sampling = match spec {
            OrientationSpec::Random => Sampling::Random,
            OrientationSpec::Fixed => Sampling::Fixed,
            OrientationSpec::Aligned { axis } => Sampling::Aligned {
                target: Vec3::from_array(*axis)
                    .normalized()
                    .ok_or_else(|| PackError::Invalid("aligned axis must be non-zero".into()))?,
            },
        };
        Ok(Self {
            sampling,
            principal,
            rotation_range,
            perturb_axis_amplitude,
        })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Quaternion {
        match &self.sampling {
            Sampling::Random => Quaternion::random(rng),
            Sampling::Fixed => Quaternion::identity(),
            Sampling::Aligned { target } => {
                let mut axis = *target;
                if self.perturb_axis_amplitude > 0.0 {
                    let tilt = rng.gen_range(0.0..=self.perturb_axis_amplitude);
                    let ortho = axis.any_orthogonal();
                    let about = Quaternion::from_axis_angle(axis, rng.gen_range(0.0..2.0 * PI))
                        .rotate_vec(ortho);
                    axis = Quaternion::from_axis_angle(about, tilt).rotate_vec(axis);
                }
                let align = Quaternion::from_to(self.principal, axis);
                if self.rotation_range <= 0.0 {
                    return align;
                }
                let half = 0.5 * self.rotation_range;
                let spin = Quaternion::from_axis_angle(axis, rng.gen_range(-half..=half));
                spin.mul(align)
            }
        }
    }
}
