use std::path::PathBuf;

/// Failure to turn the artifact pair into a ready classifier.
///
/// Always fatal for a host: there is no partial load.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("Cannot read architecture {path:?}: {reason}")]
    Architecture { path: PathBuf, reason: String },

    #[error("Invalid architecture {path:?}: {reason}")]
    InvalidArchitecture { path: PathBuf, reason: String },

    #[error("Cannot read weights {path:?}: {source}")]
    Weights {
        path: PathBuf,
        #[source]
        source: burn::record::RecorderError,
    },

    #[error("Unsupported weights format {path:?}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("Weights {path:?} do not fit the architecture: {name} is {actual:?}, expected {expected:?}")]
    Incompatible {
        path: PathBuf,
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Cannot write artifact {path:?}: {reason}")]
    Save { path: PathBuf, reason: String },
}

/// Malformed raw intensity grid.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Grid is empty")]
    Empty,

    #[error("Row {row} has {actual} values, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Expected {expected} values for the grid, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Intensity {value} at ({row}, {col}) is outside [0, 255]")]
    OutOfRange { row: usize, col: usize, value: f32 },
}

/// Failure of a single prediction.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    #[error("Input is {actual:?}, the classifier expects {expected:?}")]
    ShapeMismatch {
        expected: [usize; 2],
        actual: [usize; 2],
    },

    #[error("Classifier returned {actual} scores per image, expected {expected}")]
    UnexpectedOutput { expected: usize, actual: usize },

    #[error("Classifier returned a non-finite score {score} for class {class}")]
    NonFiniteScore { class: usize, score: f32 },

    #[error("Cannot read classifier output: {0}")]
    Readback(String),
}

/// Failure to turn a drawing on disk into a grid.
#[derive(thiserror::Error, Debug)]
pub enum SketchError {
    #[error("Cannot decode image {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Grid(#[from] GridError),
}
