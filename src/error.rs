use thiserror::Error;

/// Failures on the query path. All of them are returned to the caller,
/// none are retried.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Song not found: {0}")]
    NotFound(String),

    #[error("invalid features: missing {missing:?}, non-numeric {non_numeric:?}")]
    InvalidFeatures {
        missing: Vec<String>,
        non_numeric: Vec<String>,
    },

    #[error("result count must be positive, got {0}")]
    InvalidCount(usize),

    #[error("song name must not be empty")]
    EmptyQuery,

    #[error("recommender model not loaded: {0}")]
    ModelUnavailable(String),
}

/// Failures while decoding, validating or indexing a model artifact.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode model artifact: {0}")]
    Decode(#[from] bincode::Error),

    #[error("not a model artifact (bad magic header)")]
    BadMagic,

    #[error("unsupported model format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("catalog is empty")]
    EmptyCatalog,

    #[error("row {row} has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid model artifact: {0}")]
    Invalid(String),
}

/// Failures of the offline feature-space build.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no usable rows in {0}")]
    NoUsableRows(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}
