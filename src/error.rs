use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error(
        "encoder downscales by {downscale:?} but decoder upscales by {upscale:?}; output would not match input"
    )]
    ShapeInvariantViolation {
        downscale: (usize, usize),
        upscale: (usize, usize),
    },
    #[error("invalid stage: {0}")]
    InvalidStage(String),
    #[error("invalid noise parameters: {0}")]
    InvalidNoise(String),
    #[error("invalid training configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid image batch: {0}")]
    Batch(String),
    #[error("malformed IDX data: {0}")]
    Idx(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("trainer failed: {0}")]
    Trainer(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn shape_mismatch(expected: &[usize], found: &[usize]) -> Error {
        Error::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
