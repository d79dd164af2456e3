//! Image-like Tensors
//!
//! Every intermediate value between the input image and the flattened feature
//! vector is a rank-3 tensor indexed by (row, column, channel). It is stored
//! as a single flat buffer plus an explicit shape, never as nested vectors.
//!
//! ## Core Concepts
//!
//! - **Data**: Flat `Vec<f32>` holding all elements in HWC row-major order
//! - **Shape**: `(height, width, channels)`, explicit and checked
//! - **Strides**: Step sizes per dimension, `[width * channels, channels, 1]`
//!
//! ## Memory Layout
//!
//! For shape `(2, 2, 3)` the data is laid out pixel by pixel, with each
//! pixel's channels adjacent:
//!
//! ```text
//! [p00c0, p00c1, p00c2, p01c0, p01c1, p01c2, p10c0, ..., p11c2]
//! ```
//!
//! This is the same order the trained dense layer expects after flattening,
//! so flattening is a plain copy of the buffer.
//!
//! ## Example
//!
//! ```rust
//! use petal::{Shape, Tensor};
//!
//! let mut t = Tensor::zeros(Shape::new(2, 3, 4));
//! t.set(1, 2, 3, 5.0);
//! assert_eq!(t.get(1, 2, 3), 5.0);
//! assert_eq!(t.index(1, 2, 3), 23);
//! ```

use crate::error::{PetalError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of a rank-3 (height, width, channels) tensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Shape {
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Total number of elements
    pub const fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// Total number of elements, or `None` if it doesn't fit in `usize`
    pub const fn checked_len(&self) -> Option<usize> {
        match self.height.checked_mul(self.width) {
            Some(hw) => hw.checked_mul(self.channels),
            None => None,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major strides: `[width * channels, channels, 1]`
    pub const fn strides(&self) -> [usize; 3] {
        [self.width * self.channels, self.channels, 1]
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}

/// A rank-3 array of `f32` in HWC order
///
/// # Fields
///
/// - `data`: Flat storage
/// - `shape`: Dimensions
///
/// Both fields are public, but `data.len()` must always equal `shape.len()`.
/// Constructors guarantee it; code that edits the fields directly has to keep
/// it. Every layer re-checks it on entry and rejects a tensor that breaks it
/// with [`PetalError::InvalidInput`].
///
/// Tensors are produced fresh by each stage and never mutated in place by
/// the next one.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    pub shape: Shape,
}

impl Tensor {
    /// Create a tensor from flat HWC data
    ///
    /// # Errors
    ///
    /// [`PetalError::InvalidInput`] if `data.len()` is not `shape.len()`.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use petal::{Shape, Tensor};
    /// let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], Shape::new(2, 2, 1)).unwrap();
    /// assert_eq!(t.get(1, 0, 0), 3.0);
    /// assert!(Tensor::new(vec![1.0], Shape::new(2, 2, 1)).is_err());
    /// ```
    pub fn new(data: Vec<f32>, shape: Shape) -> Result<Self> {
        let tensor = Self { data, shape };
        tensor.check_consistent("tensor")?;
        Ok(tensor)
    }

    /// Build from parts already known to agree. Only used inside the crate
    /// where the buffer was allocated from `shape`.
    pub(crate) fn from_parts(data: Vec<f32>, shape: Shape) -> Self {
        debug_assert_eq!(data.len(), shape.len());
        Self { data, shape }
    }

    /// Check that the buffer holds exactly `shape.len()` elements
    ///
    /// # Errors
    ///
    /// [`PetalError::InvalidInput`] naming `op` if it doesn't.
    pub fn check_consistent(&self, op: &str) -> Result<()> {
        if self.shape.checked_len() != Some(self.data.len()) {
            return Err(PetalError::InvalidInput(format!(
                "{}: buffer of {} elements doesn't match shape {}",
                op,
                self.data.len(),
                self.shape
            )));
        }
        Ok(())
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: Shape) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Create a tensor with every element set to `value`
    pub fn filled(shape: Shape, value: f32) -> Self {
        Self::from_parts(vec![value; shape.len()], shape)
    }

    /// Build a tensor from `rows[y][x][c]` nested vectors
    ///
    /// Every row must have the same width and every pixel the same depth.
    /// An empty outer vector gives shape `(0, 0, 0)`; empty rows give
    /// `(h, 0, 0)`. Such tensors can exist but most operations reject them.
    ///
    /// # Errors
    ///
    /// [`PetalError::InvalidInput`] for ragged input.
    pub fn from_nested(rows: &[Vec<Vec<f32>>]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        let channels = rows
            .first()
            .and_then(|r| r.first())
            .map_or(0, |p| p.len());

        let mut data = Vec::with_capacity(height * width * channels);
        for (y, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(PetalError::InvalidInput(format!(
                    "ragged tensor: row {} has width {} but row 0 has width {}",
                    y,
                    row.len(),
                    width
                )));
            }
            for (x, pixel) in row.iter().enumerate() {
                if pixel.len() != channels {
                    return Err(PetalError::InvalidInput(format!(
                        "ragged tensor: pixel ({}, {}) has {} channels, expected {}",
                        y,
                        x,
                        pixel.len(),
                        channels
                    )));
                }
                data.extend_from_slice(pixel);
            }
        }

        Ok(Self::from_parts(data, Shape::new(height, width, channels)))
    }

    /// Inverse of [`Tensor::from_nested`]
    pub fn to_nested(&self) -> Vec<Vec<Vec<f32>>> {
        let Shape { width, channels, .. } = self.shape;
        if width == 0 || channels == 0 {
            return vec![vec![Vec::new(); width]; self.shape.height];
        }
        self.data
            .chunks(width * channels)
            .map(|row| row.chunks(channels).map(|p| p.to_vec()).collect())
            .collect()
    }

    /// Row-major strides, always derived from the current shape
    pub fn strides(&self) -> [usize; 3] {
        self.shape.strides()
    }

    /// Flat offset of element `(y, x, c)`
    #[inline(always)]
    pub fn index(&self, y: usize, x: usize, c: usize) -> usize {
        (y * self.shape.width + x) * self.shape.channels + c
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize, c: usize) -> f32 {
        self.data[self.index(y, x, c)]
    }

    #[inline]
    pub fn set(&mut self, y: usize, x: usize, c: usize, value: f32) {
        let i = self.index(y, x, c);
        self.data[i] = value;
    }

    /// All channels of the pixel at `(y, x)` as one contiguous slice
    #[inline]
    pub fn pixel(&self, y: usize, x: usize) -> &[f32] {
        let start = self.index(y, x, 0);
        &self.data[start..start + self.shape.channels]
    }

    /// Apply `f` to every element, producing a new tensor of the same shape
    ///
    /// Elements are independent, so this runs in parallel via Rayon.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let data = self.data.par_iter().map(|&v| f(v)).collect();
        Self {
            data,
            shape: self.shape,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides_are_hwc() {
        let shape = Shape::new(4, 5, 3);
        assert_eq!(shape.strides(), [15, 3, 1]);
        assert_eq!(shape.len(), 60);
        assert_eq!(shape.to_string(), "(4, 5, 3)");
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = Tensor::new(vec![0.0; 5], Shape::new(2, 2, 1)).unwrap_err();
        assert!(matches!(err, PetalError::InvalidInput(_)));
    }

    #[test]
    fn test_from_nested_matches_accessor() {
        let rows = vec![
            vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]],
            vec![vec![7.0, 8.0], vec![9.0, 10.0], vec![11.0, 12.0]],
        ];
        let t = Tensor::from_nested(&rows).unwrap();
        assert_eq!(t.shape, Shape::new(2, 3, 2));
        for (y, row) in rows.iter().enumerate() {
            for (x, pixel) in row.iter().enumerate() {
                for (c, &v) in pixel.iter().enumerate() {
                    assert_eq!(t.get(y, x, c), v);
                }
            }
        }
        assert_eq!(t.pixel(1, 2), &[11.0, 12.0]);
        assert_eq!(t.to_nested(), rows);
    }

    #[test]
    fn test_from_nested_rejects_ragged_rows() {
        let rows = vec![vec![vec![1.0], vec![2.0]], vec![vec![3.0]]];
        assert!(matches!(
            Tensor::from_nested(&rows),
            Err(PetalError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_from_nested_rejects_ragged_channels() {
        let rows = vec![vec![vec![1.0, 2.0], vec![3.0]]];
        assert!(Tensor::from_nested(&rows).is_err());
    }

    #[test]
    fn test_from_nested_empty() {
        let t = Tensor::from_nested(&[]).unwrap();
        assert_eq!(t.shape, Shape::new(0, 0, 0));
        assert!(t.data.is_empty());
    }

    #[test]
    fn test_set_then_get() {
        let mut t = Tensor::zeros(Shape::new(3, 3, 2));
        t.set(2, 1, 1, -4.5);
        assert_eq!(t.get(2, 1, 1), -4.5);
        assert_eq!(t.data.iter().filter(|&&v| v != 0.0).count(), 1);
    }

    #[test]
    fn test_index_follows_edited_shape() {
        let mut t = Tensor::zeros(Shape::new(2, 6, 1));
        t.shape = Shape::new(3, 2, 2);
        assert!(t.check_consistent("reshape").is_ok());
        assert_eq!(t.strides(), [4, 2, 1]);
        assert_eq!(t.index(2, 1, 1), 11);
    }

    #[test]
    fn test_check_consistent_catches_edited_buffer() {
        let mut t = Tensor::zeros(Shape::new(2, 2, 3));
        t.data.truncate(5);
        let err = t.check_consistent("zero_pad").unwrap_err();
        assert!(matches!(err, PetalError::InvalidInput(_)));
        assert!(err.to_string().contains("zero_pad"));
    }

    #[test]
    fn test_new_rejects_overflowing_shape() {
        let shape = Shape::new(usize::MAX, 2, 1);
        assert!(shape.checked_len().is_none());
        assert!(Tensor::new(vec![0.0; 2], shape).is_err());
    }

    #[test]
    fn test_map_preserves_shape() {
        let t = Tensor::filled(Shape::new(2, 2, 2), 3.0);
        let doubled = t.map(|v| v * 2.0);
        assert_eq!(doubled.shape, t.shape);
        assert!(doubled.data.iter().all(|&v| v == 6.0));
    }
}
