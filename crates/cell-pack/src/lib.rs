#![forbid(unsafe_code)]

pub mod compartment;
pub mod config;
pub mod engine;
pub mod error;
pub mod gradient;
pub mod grid;
pub mod orientation;
pub mod pack;
pub mod placement;
pub mod shape;
pub mod streaming;

pub use config::{BoundaryPolicy, IngredientSpec, PackConfig, PackingMode};
pub use engine::{Ingredient, PlacementEngine, PlacementOutcome, PlacementState};
pub use error::{PackError, PackResult};
pub use grid::{GridSnapshot, SpatialGrid};
pub use pack::{run, run_batch, run_batch_with_stream, run_with_stream, PackOutput, PackReport};
pub use placement::PlacedInstance;
pub use shape::{ShapeDescriptor, ShapeProxy};
