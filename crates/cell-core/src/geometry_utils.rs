use crate::geom::Vec3;

/// Squared distance from `p` to the segment `[a, b]`.
pub fn point_segment_distance_squared(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b.sub(a);
    let len2 = ab.norm_squared();
    if len2 <= 1.0e-12 {
        return p.distance_squared(a);
    }
    let t = (p.sub(a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance_squared(a.add(ab.scale(t)))
}

/// Squared closest distance between segments `[p1, q1]` and `[p2, q2]`.
///
/// Ericson, Real-Time Collision Detection, 5.1.9.
pub fn segment_segment_distance_squared(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> f32 {
    const EPS: f32 = 1.0e-12;
    let d1 = q1.sub(p1);
    let d2 = q2.sub(p2);
    let r = p1.sub(p2);
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(r);

    if a <= EPS && e <= EPS {
        return p1.distance_squared(p2);
    }
    let (s, t) = if a <= EPS {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e <= EPS {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > EPS {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    let c1 = p1.add(d1.scale(s));
    let c2 = p2.add(d2.scale(t));
    c1.distance_squared(c2)
}
