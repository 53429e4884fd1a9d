use crate::error::GridError;

/// Largest intensity a pixel may carry.
pub const MAX_INTENSITY: f32 = 255.0;

/// Raw grayscale image, row-major, with every intensity in `[0, 255]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    height: usize,
    width: usize,
    values: Vec<f32>,
}

impl PixelGrid {
    /// Creates a grid from row-major intensities.
    pub fn new(height: usize, width: usize, values: Vec<f32>) -> Result<Self, GridError> {
        if height == 0 || width == 0 {
            return Err(GridError::Empty);
        }

        let expected = height
            .checked_mul(width)
            .ok_or(GridError::LengthMismatch {
                expected: usize::MAX,
                actual: values.len(),
            })?;
        if values.len() != expected {
            return Err(GridError::LengthMismatch {
                expected,
                actual: values.len(),
            });
        }

        if let Some((index, value)) = values
            .iter()
            .enumerate()
            .find(|(_, value)| !(0.0..=MAX_INTENSITY).contains(*value))
        {
            return Err(GridError::OutOfRange {
                row: index / width,
                col: index % width,
                value: *value,
            });
        }

        Ok(Self {
            height,
            width,
            values,
        })
    }

    /// Creates a grid from rows of intensities; all rows must have the same length.
    pub fn from_rows<R, T>(rows: R) -> Result<Self, GridError>
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = T>,
        T: Into<f32>,
    {
        let mut values = Vec::new();
        let mut height = 0;
        let mut width = None;

        for (row, items) in rows.into_iter().enumerate() {
            let start = values.len();
            values.extend(items.into_iter().map(Into::into));
            let len = values.len() - start;

            match width {
                None => width = Some(len),
                Some(expected) if expected != len => {
                    return Err(GridError::Ragged {
                        row,
                        expected,
                        actual: len,
                    })
                }
                Some(_) => {}
            }
            height += 1;
        }

        Self::new(height, width.unwrap_or(0), values)
    }

    /// Creates a grid from 8-bit intensities, which are always in range.
    pub fn from_bytes(height: usize, width: usize, bytes: &[u8]) -> Result<Self, GridError> {
        Self::new(height, width, bytes.iter().copied().map(f32::from).collect())
    }

    /// Grid filled with a single intensity.
    pub fn filled(height: usize, width: usize, value: f32) -> Result<Self, GridError> {
        let len = height
            .checked_mul(width)
            .ok_or(GridError::LengthMismatch {
                expected: usize::MAX,
                actual: 0,
            })?;
        Self::new(height, width, vec![value; len])
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// `[height, width]`
    pub fn shape(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    /// Row-major intensities.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.height && col < self.width {
            Some(self.values[row * self.width + col])
        } else {
            None
        }
    }
}
