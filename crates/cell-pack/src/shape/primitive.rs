use cell_core::{point_segment_distance_squared, segment_segment_distance_squared, Vec3};

/// World-frame primitive of an accepted or trial pose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Primitive {
    Sphere { center: Vec3, radius: f32 },
    Capsule { a: Vec3, b: Vec3, radius: f32 },
}

impl Primitive {
    pub fn radius(&self) -> f32 {
        match *self {
            Primitive::Sphere { radius, .. } | Primitive::Capsule { radius, .. } => radius,
        }
    }

    /// Centre and radius of a sphere enclosing the primitive.
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        match *self {
            Primitive::Sphere { center, radius } => (center, radius),
            Primitive::Capsule { a, b, radius } => {
                let mid = a.add(b).scale(0.5);
                (mid, 0.5 * a.distance(b) + radius)
            }
        }
    }

    /// Whether the two volumes interpenetrate by more than `tolerance`.
    ///
    /// Segments are treated as capsules.
    pub fn overlaps(&self, other: &Primitive, tolerance: f32) -> bool {
        let reach = self.radius() + other.radius() - tolerance;
        if reach <= 0.0 {
            return false;
        }
        let d2 = match (*self, *other) {
            (Primitive::Sphere { center: c1, .. }, Primitive::Sphere { center: c2, .. }) => {
                c1.distance_squared(c2)
            }
            (Primitive::Sphere { center, .. }, Primitive::Capsule { a, b, .. })
            | (Primitive::Capsule { a, b, .. }, Primitive::Sphere { center, .. }) => {
                point_segment_distance_squared(center, a, b)
            }
            (
                Primitive::Capsule { a: a1, b: b1, .. },
                Primitive::Capsule { a: a2, b: b2, .. },
            ) => segment_segment_distance_squared(a1, b1, a2, b2),
        };
        d2 < reach * reach
    }
}
