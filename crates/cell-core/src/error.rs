use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("degenerate geometry: {0}")]
    Degenerate(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
