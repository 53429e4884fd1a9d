use core::fmt;
use core::marker::PhantomData;

use burn::prelude::*;

use crate::{
    error::{LoadError, PredictError},
    grid::{PixelGrid, MAX_INTENSITY},
    loader::{load_classifier, ArtifactPaths},
    model::{DigitClassifier, NUM_CLASSES},
};

/// Anything that maps a batch of single-channel images to per-class scores.
pub trait Classifier<B: Backend> {
    /// Spatial input size `[height, width]` the classifier accepts.
    fn input_shape(&self) -> [usize; 2];

    /// Device the input tensor must be created on.
    fn device(&self) -> B::Device;

    /// # Shapes
    ///   - Images `[batch_size, 1, height, width]`
    ///   - Output `[batch_size, num_classes]`
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

impl<B: Backend> Classifier<B> for DigitClassifier<B> {
    fn input_shape(&self) -> [usize; 2] {
        DigitClassifier::input_shape(self)
    }

    fn device(&self) -> B::Device {
        DigitClassifier::device(self)
    }

    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        DigitClassifier::forward(self, images)
    }
}

/// A predicted digit, always in `0..=9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digit(u8);

impl Digit {
    pub fn new(value: u8) -> Option<Self> {
        (usize::from(value) < NUM_CLASSES).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl From<Digit> for u8 {
    fn from(digit: Digit) -> Self {
        digit.0
    }
}

impl From<Digit> for usize {
    fn from(digit: Digit) -> Self {
        digit.0.into()
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Rescales the grid to `[0, 1]` and adds batch and channel dimensions.
///
/// # Shapes
///   - Output `[1, 1, height, width]`
pub fn normalize<B: Backend>(grid: &PixelGrid, device: &B::Device) -> Tensor<B, 4> {
    let [height, width] = grid.shape();
    let values = grid
        .values()
        .iter()
        .map(|value| value / MAX_INTENSITY)
        .collect::<Vec<_>>();

    Tensor::<B, 4>::from_data(TensorData::new(values, [1, 1, height, width]), device)
}

/// Index of the highest score; the lowest index wins among equal maxima.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (index, &score)| match best {
            Some((_, top)) if score <= top => best,
            _ => Some((index, score)),
        })
        .map(|(index, _)| index)
}

/// Classifies one grid.
pub fn predict<B, C>(classifier: &C, grid: &PixelGrid) -> Result<Digit, PredictError>
where
    B: Backend,
    C: Classifier<B> + ?Sized,
{
    let expected = classifier.input_shape();
    if grid.shape() != expected {
        return Err(PredictError::ShapeMismatch {
            expected,
            actual: grid.shape(),
        });
    }

    let images = normalize::<B>(grid, &classifier.device());
    let output = classifier.forward(images);

    let [batch_size, num_classes] = output.dims();
    if batch_size != 1 || num_classes != NUM_CLASSES {
        return Err(PredictError::UnexpectedOutput {
            expected: NUM_CLASSES,
            actual: num_classes * batch_size,
        });
    }

    let scores = output
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| PredictError::Readback(format!("{err:?}")))?;

    if let Some((class, &score)) = scores.iter().enumerate().find(|(_, s)| !s.is_finite()) {
        return Err(PredictError::NonFiniteScore { class, score });
    }

    let index = argmax(&scores).ok_or(PredictError::UnexpectedOutput {
        expected: NUM_CLASSES,
        actual: 0,
    })?;
    let digit = u8::try_from(index)
        .ok()
        .and_then(Digit::new)
        .ok_or(PredictError::UnexpectedOutput {
            expected: NUM_CLASSES,
            actual: scores.len(),
        })?;

    log::debug!("Predicted {digit} from {scores:?}");

    Ok(digit)
}

/// Prediction adapter owning an injected classifier.
pub struct Predictor<B: Backend, C = DigitClassifier<B>> {
    classifier: C,
    backend: PhantomData<B>,
}

impl<B: Backend> Predictor<B> {
    /// Loads the artifact pair and wraps the resulting classifier.
    pub fn load(paths: &ArtifactPaths, device: &B::Device) -> Result<Self, LoadError> {
        load_classifier(paths, device).map(Self::new)
    }
}

impl<B: Backend, C: Classifier<B>> Predictor<B, C> {
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            backend: PhantomData,
        }
    }

    pub fn predict(&self, grid: &PixelGrid) -> Result<Digit, PredictError> {
        predict::<B, C>(&self.classifier, grid)
    }

    /// Spatial input size `[height, width]` grids must have.
    pub fn input_shape(&self) -> [usize; 2] {
        self.classifier.input_shape()
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }
}

impl<B: Backend, C: Clone> Clone for Predictor<B, C> {
    fn clone(&self) -> Self {
        Self {
            classifier: self.classifier.clone(),
            backend: PhantomData,
        }
    }
}
