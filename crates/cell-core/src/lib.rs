#![forbid(unsafe_code)]

pub mod aabb;
pub mod error;
pub mod geom;
pub mod geometry_utils;
pub mod spatial_hash;

pub use aabb::Aabb;
pub use error::{CoreError, CoreResult};
pub use geom::{Mat3, Pose, Quaternion, Vec3};
pub use geometry_utils::{point_segment_distance_squared, segment_segment_distance_squared};
pub use spatial_hash::SpatialHash;
