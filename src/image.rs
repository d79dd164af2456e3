//! Image Input
//!
//! The classifier consumes a `(height, width, 3)` tensor with every component
//! scaled from 8-bit `0..=255` to `[0, 1]`. File decoding (PNG, JPEG, ...)
//! happens elsewhere; this module only takes the decoded interleaved RGB bytes
//! (`r, g, b, r, g, b, ...`, row by row) and enforces the exact size. There is
//! no resizing: an image of the wrong size is rejected.

use crate::error::{PetalError, Result};
use crate::tensor::{Shape, Tensor};
use std::fs;
use std::path::Path;

/// Convert interleaved 8-bit pixels to a normalised HWC tensor
///
/// # Errors
///
/// [`PetalError::InvalidInput`] unless `pixels.len()` is exactly
/// `shape.len()`.
///
/// # Example
///
/// ```rust
/// use petal::{image::from_rgb8, Shape};
///
/// let t = from_rgb8(&[0, 255, 51, 255, 0, 0], Shape::new(1, 2, 3)).unwrap();
/// assert_eq!(t.get(0, 0, 1), 1.0);
/// assert_eq!(t.get(0, 0, 2), 0.2);
/// ```
pub fn from_rgb8(pixels: &[u8], shape: Shape) -> Result<Tensor> {
    if pixels.len() != shape.len() {
        return Err(PetalError::InvalidInput(format!(
            "image has wrong size: must be exactly {}x{} pixels with {} channels \
             ({} bytes), got {} bytes",
            shape.width,
            shape.height,
            shape.channels,
            shape.len(),
            pixels.len()
        )));
    }
    let data = pixels.iter().map(|&p| p as f32 / 255.0).collect();
    Tensor::new(data, shape)
}

/// Read a headerless RGB8 file (exactly `shape.len()` bytes) as a tensor
pub fn read_rgb8<P: AsRef<Path>>(path: P, shape: Shape) -> Result<Tensor> {
    let bytes = fs::read(path)?;
    from_rgb8(&bytes, shape)
}
