//! Converts drawings into grids the classifier can consume.
//!
//! The classifier expects bright strokes on a dark background at its exact
//! input size. Drawings from other tools are usually dark ink on white paper
//! at an arbitrary resolution, so they are resized and, when needed, inverted.

use std::path::Path;

use image::{imageops::FilterType, GrayImage};

use crate::{
    error::SketchError,
    grid::{PixelGrid, MAX_INTENSITY},
};

/// How to interpret the background of a drawing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Background {
    /// Invert when the mean intensity is above mid-gray.
    #[default]
    Auto,
    /// Strokes are already bright on dark; never invert.
    Dark,
    /// Strokes are dark on light; always invert.
    Light,
}

/// Decodes the image at `path` and turns it into a `[height, width]` grid.
pub fn load_grid(
    path: impl AsRef<Path>,
    shape: [usize; 2],
    background: Background,
) -> Result<PixelGrid, SketchError> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|source| SketchError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    grid_from_luma(&image.to_luma8(), shape, background)
}

/// Resizes an in-memory grayscale image to `[height, width]` and applies the background rule.
pub fn grid_from_luma(
    image: &GrayImage,
    shape: [usize; 2],
    background: Background,
) -> Result<PixelGrid, SketchError> {
    let [height, width] = shape;
    let resized = if image.dimensions() == (width as u32, height as u32) {
        image.clone()
    } else {
        image::imageops::resize(image, width as u32, height as u32, FilterType::Triangle)
    };

    let mut bytes = resized.into_raw();
    if should_invert(&bytes, background) {
        bytes.iter_mut().for_each(|byte| *byte = u8::MAX - *byte);
    }

    Ok(PixelGrid::from_bytes(height, width, &bytes)?)
}

fn should_invert(bytes: &[u8], background: Background) -> bool {
    match background {
        Background::Dark => false,
        Background::Light => true,
        Background::Auto if bytes.is_empty() => false,
        Background::Auto => {
            let sum: u64 = bytes.iter().map(|byte| u64::from(*byte)).sum();
            let mean = sum as f32 / bytes.len() as f32;
            mean > MAX_INTENSITY / 2.0
        }
    }
}
