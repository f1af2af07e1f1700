use thiserror::Error;

pub type KmcResult<T> = Result<T, KmcError>;

#[derive(Debug, Error)]
pub enum KmcError {
    #[error("invalid solver parameter: {0}")]
    InvalidParameter(String),
    #[error("invalid reaction: {0}")]
    InvalidReaction(String),
    #[error("species index {species} out of range for state with {len} species")]
    SpeciesOutOfRange { species: usize, len: usize },
    #[error("shape mismatch: {0}")]
    Shape(String),
    #[error(
        "sub-step underflow after {rejections} rejections (elapsed {elapsed:e}, attempted {attempted:e})"
    )]
    StepUnderflow {
        elapsed: f64,
        attempted: f64,
        rejections: usize,
    },
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

impl KmcError {
    pub(crate) fn species(species: usize, len: usize) -> Self {
        Self::SpeciesOutOfRange { species, len }
    }
}
