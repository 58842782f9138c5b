use cell_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("geometry error: {0}")]
    Geometry(String),
    #[error("placement failed: {0}")]
    Placement(String),
}

pub type PackResult<T> = Result<T, PackError>;

impl From<CoreError> for PackError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Invalid(msg) => PackError::Invalid(msg),
            CoreError::Degenerate(msg) => PackError::Geometry(msg),
        }
    }
}
