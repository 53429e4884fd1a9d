//! # Guess that digit
//!
//! Classifies hand-drawn decimal digits with a pretrained convolutional network.
//!
//! A model is made of two artifacts: an architecture descriptor
//! ([DigitClassifierConfig], JSON) and a weights record. The [loader] turns
//! them into a [DigitClassifier] once at startup; a [Predictor] then maps each
//! [PixelGrid] of raw intensities to a single [Digit].
//!
//! ```no_run
//! use guess_digit::{backend, ArtifactPaths, PixelGrid, Predictor};
//!
//! let device = backend::default_device();
//! let predictor: Predictor<backend::InferenceBackend> =
//!     Predictor::load(&ArtifactPaths::default(), &device).expect("model artifacts");
//!
//! let canvas = PixelGrid::filled(28, 28, 0.0).unwrap();
//! println!("{}", predictor.predict(&canvas).unwrap());
//! ```

pub mod backend;
pub mod error;
pub mod grid;
pub mod inference;
pub mod loader;
pub mod model;
pub mod sketch;

pub use error::{GridError, LoadError, PredictError, SketchError};
pub use grid::PixelGrid;
pub use inference::{argmax, normalize, predict, Classifier, Digit, Predictor};
pub use loader::{load_classifier, ArtifactPaths, ModelArtifacts, WeightsFormat};
pub use model::{DigitClassifier, DigitClassifierConfig, NUM_CLASSES};

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray<f32>;
