//! Max Pooling
//!
//! Non-overlapping max pooling: the stride equals the window size.
//!
//! ```text
//! Input:  (H, W, C)
//! Window: (pool_y, pool_x)
//! Output: (⌊H / pool_y⌋, ⌊W / pool_x⌋, C)
//! ```
//!
//! Trailing rows and columns that don't fill a whole window are dropped, not
//! treated as an error. Each channel is pooled independently.

use crate::error::{PetalError, Result};
use crate::tensor::{Shape, Tensor};
use rayon::prelude::*;
use tracing::debug;

/// Max-pool `input` with a `pool_y × pool_x` window and matching stride
///
/// # Errors
///
/// [`PetalError::InputTooSmall`] if either output dimension would be zero,
/// i.e. the window doesn't fit at least once. A zero-sized window is rejected
/// as [`PetalError::InvalidInput`], as is an input whose buffer disagrees
/// with its shape.
pub fn max_pool(input: &Tensor, pool_y: usize, pool_x: usize) -> Result<Tensor> {
    input.check_consistent("max_pool")?;
    if pool_y == 0 || pool_x == 0 {
        return Err(PetalError::InvalidInput(format!(
            "pool window must be non-empty, got {}x{}",
            pool_y, pool_x
        )));
    }

    let out_height = input.shape.height / pool_y;
    let out_width = input.shape.width / pool_x;
    if out_height == 0 || out_width == 0 {
        return Err(PetalError::too_small(
            "max_pool",
            format!(
                "input {} doesn't fit a single {}x{} window",
                input.shape, pool_y, pool_x
            ),
        ));
    }

    let depth = input.shape.channels;
    let out_shape = Shape::new(out_height, out_width, depth);
    debug!(input = %input.shape, pool_y, pool_x, output = %out_shape, "max_pool");

    let mut out = vec![f32::NEG_INFINITY; out_shape.len()];
    if depth == 0 {
        return Ok(Tensor::from_parts(out, out_shape));
    }

    out.par_chunks_mut(out_width * depth)
        .enumerate()
        .for_each(|(y, out_row)| {
            for (x, cell) in out_row.chunks_mut(depth).enumerate() {
                for i in 0..pool_y {
                    for j in 0..pool_x {
                        let window = input.pixel(y * pool_y + i, x * pool_x + j);
                        for (m, &v) in cell.iter_mut().zip(window) {
                            *m = m.max(v);
                        }
                    }
                }
            }
        });

    Ok(Tensor::from_parts(out, out_shape))
}
