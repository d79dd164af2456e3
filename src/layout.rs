//! Channel-First Layout Conversion
//!
//! The trained constants assume channel-last (HWC) feature maps and HWCK
//! kernels. Runtimes that work channel-first (CHW feature maps, KCHW kernels)
//! can reuse them after a one-time permutation:
//!
//! - feature maps: `hwc[(y·W + x)·C + c]` → `chw[c·H·W + y·W + x]`
//! - kernels: `hwck[ky][kx][c][k]` → `kchw[k][c][ky][kx]`
//! - the first dense layer: its rows are indexed by the *flattened* feature
//!   map, so they must be permuted the same way as the feature map, otherwise
//!   every weight meets the wrong feature
//!
//! With the dense rows reordered, a dense layer over the CHW-flattened
//! features gives the same outputs as the unpermuted layer over the
//! HWC-flattened features.

use crate::error::{PetalError, Result};
use crate::layers::{DenseWeights, KernelBank};
use crate::tensor::{Shape, Tensor};

/// CHW position of HWC element `(y, x, c)`
#[inline]
fn chw_index(shape: Shape, y: usize, x: usize, c: usize) -> usize {
    (c * shape.height + y) * shape.width + x
}

/// Linearise a tensor channel-first
///
/// # Errors
///
/// [`PetalError::InvalidInput`] if the tensor's buffer disagrees with its
/// shape.
pub fn to_chw(tensor: &Tensor) -> Result<Vec<f32>> {
    tensor.check_consistent("to_chw")?;
    let shape = tensor.shape;
    let mut out = vec![0.0; shape.len()];
    for y in 0..shape.height {
        for x in 0..shape.width {
            for c in 0..shape.channels {
                out[chw_index(shape, y, x, c)] = tensor.get(y, x, c);
            }
        }
    }
    Ok(out)
}

/// Kernel bank weights in KCHW order
pub fn kernel_to_kchw(kernels: &KernelBank) -> Vec<f32> {
    let [kh, kw, depth, nk] = kernels.dims();
    let mut out = Vec::with_capacity(kernels.data.len());
    for k in 0..nk {
        for c in 0..depth {
            for ky in 0..kh {
                for kx in 0..kw {
                    out.push(kernels.get(ky, kx, c, k));
                }
            }
        }
    }
    out
}

/// Permute dense weight rows trained on HWC-flattened input of `shape` so they
/// apply to CHW-flattened input
///
/// # Errors
///
/// [`PetalError::ShapeMismatch`] if the weight matrix doesn't have one row
/// per element of `shape`.
pub fn reorder_dense_for_chw(weights: &DenseWeights, shape: Shape) -> Result<DenseWeights> {
    if weights.inputs != shape.len() {
        return Err(PetalError::shape_mismatch(
            "reorder_dense_for_chw",
            format!("{} input rows for feature map {}", shape.len(), shape),
            format!("{} input rows", weights.inputs),
        ));
    }

    let out_size = weights.outputs;
    let mut data = vec![0.0; weights.data.len()];
    for y in 0..shape.height {
        for x in 0..shape.width {
            for c in 0..shape.channels {
                let in_ix = (y * shape.width + x) * shape.channels + c;
                let out_ix = chw_index(shape, y, x, c);
                data[out_ix * out_size..(out_ix + 1) * out_size]
                    .copy_from_slice(weights.row(in_ix));
            }
        }
    }
    DenseWeights::new(data, weights.inputs, out_size)
}
