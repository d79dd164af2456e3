//! Zero Padding
//!
//! Embeds a tensor in the centre of a larger zero-filled tensor. Used before
//! every convolution so that a 3×3 "valid" convolution keeps the spatial size:
//!
//! ```text
//! Input:  (H, W, C)
//! Output: (H + 2·pad_y, W + 2·pad_x, C)
//! ```
//!
//! Interior rows are copied as whole contiguous runs of `W·C` values, since the
//! channel layout is identical inside and outside the border.

use crate::error::{PetalError, Result};
use crate::tensor::{Shape, Tensor};
use tracing::debug;

/// Zero-pad `input` by `pad_y` rows top and bottom and `pad_x` columns left
/// and right
///
/// # Errors
///
/// - [`PetalError::InputTooSmall`] if the input height or width is zero
/// - [`PetalError::InvalidInput`] if the input buffer disagrees with its
///   shape, or the padded tensor would be too large to address
pub fn zero_pad(input: &Tensor, pad_y: usize, pad_x: usize) -> Result<Tensor> {
    input.check_consistent("zero_pad")?;
    let Shape {
        height,
        width,
        channels,
    } = input.shape;

    if height == 0 || width == 0 {
        return Err(PetalError::too_small(
            "zero_pad",
            format!("input shape {} has an empty spatial dimension", input.shape),
        ));
    }

    let grow = |dim: usize, pad: usize| pad.checked_mul(2).and_then(|border| dim.checked_add(border));
    let out_shape = grow(height, pad_y)
        .zip(grow(width, pad_x))
        .map(|(h, w)| Shape::new(h, w, channels))
        .filter(|shape| shape.checked_len().is_some())
        .ok_or_else(|| {
            PetalError::InvalidInput(format!(
                "padding {} by ({}, {}) has too many elements",
                input.shape, pad_y, pad_x
            ))
        })?;
    debug!(input = %input.shape, pad_y, pad_x, output = %out_shape, "zero_pad");

    let mut out = Tensor::zeros(out_shape);
    let run = width * channels;
    for y in 0..height {
        let src = input.index(y, 0, 0);
        let dst = out.index(y + pad_y, pad_x, 0);
        out.data[dst..dst + run].copy_from_slice(&input.data[src..src + run]);
    }

    Ok(out)
}
