//! Flatten
//!
//! Turns the last feature map into the dense layer's input vector. The order
//! is row, then column, then channel:
//!
//! ```text
//! out[(y·W + x)·C + c] = in[y][x][c]
//! ```
//!
//! The first dense layer was trained against exactly this order. Any other
//! traversal still produces a vector of the right length and silently wrong
//! predictions, which is why it is pinned by tests here.
//!
//! Because [`Tensor`] stores HWC row-major, this is a copy of the buffer.

use crate::error::{PetalError, Result};
use crate::tensor::Tensor;
use tracing::debug;

pub fn flatten(input: &Tensor) -> Result<Vec<f32>> {
    input.check_consistent("flatten")?;
    if input.shape.height == 0 || input.shape.width == 0 {
        return Err(PetalError::too_small(
            "flatten",
            format!("input shape {} has an empty spatial dimension", input.shape),
        ));
    }
    debug!(input = %input.shape, output = input.shape.len(), "flatten");
    Ok(input.data.clone())
}
