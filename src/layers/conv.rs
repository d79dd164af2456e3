//! 2D Convolution
//!
//! "Valid" (unpadded) convolution with stride 1. Padding is a separate stage,
//! see [`zero_pad`](super::padding::zero_pad).
//!
//! ## Kernel Layout
//!
//! Kernel banks are stored **HWCK**: kernel row, kernel column, input channel,
//! output channel. This is how the trained weights were exported and it must
//! not be changed; the same constants in KCHW order (common in other runtimes)
//! would silently produce garbage. See [`crate::layout`] for the conversion.
//!
//! ## Forward Pass
//!
//! ```text
//! Input:   (H, W, C)
//! Kernels: (KH, KW, C, K)
//! Bias:    (K)
//! Output:  (H - KH + 1, W - KW + 1, K)
//!
//! out[y][x][k] = Σ_c Σ_ky Σ_kx kernel[ky][kx][c][k] · in[y+ky][x+kx][c]  + bias[k]
//! ```
//!
//! The sum for each output cell is accumulated in channel, kernel-row,
//! kernel-column order starting from zero, and the bias is added last.
//!
//! ## Implementation Notes
//!
//! HWCK puts the K output channels for one (ky, kx, c) tap next to each other,
//! so the innermost loop runs over output channels: one input value times a
//! contiguous run of K weights, accumulated into K contiguous outputs. That
//! loop auto-vectorises. Each output channel still sees its terms in the
//! order above, so results are identical to the naive six-deep loop.
//!
//! Output rows are independent and are computed in parallel with Rayon.
//! This stage dominates the cost of the whole forward pass.

use crate::error::{PetalError, Result};
use crate::tensor::{Shape, Tensor};
use rayon::prelude::*;
use tracing::debug;

/// A bank of K convolution kernels, each KH × KW × C, stored HWCK
#[derive(Clone, Debug, PartialEq)]
pub struct KernelBank {
    pub data: Vec<f32>,
    pub kernel_height: usize,
    pub kernel_width: usize,
    pub in_channels: usize,
    pub out_channels: usize,
}

impl KernelBank {
    /// Create a kernel bank from flat HWCK data
    ///
    /// # Errors
    ///
    /// [`PetalError::InvalidInput`] if any dimension is zero or the data
    /// length doesn't match.
    pub fn new(
        data: Vec<f32>,
        kernel_height: usize,
        kernel_width: usize,
        in_channels: usize,
        out_channels: usize,
    ) -> Result<Self> {
        let dims = [kernel_height, kernel_width, in_channels, out_channels];
        if dims.contains(&0) {
            return Err(PetalError::InvalidInput(format!(
                "kernel bank dimensions must be non-zero, got {:?}",
                dims
            )));
        }
        let expected = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        if expected != Some(data.len()) {
            return Err(PetalError::InvalidInput(format!(
                "kernel bank data length ({}) doesn't match dimensions {:?}",
                data.len(),
                dims
            )));
        }
        Ok(Self {
            data,
            kernel_height,
            kernel_width,
            in_channels,
            out_channels,
        })
    }

    /// Build from `weights[ky][kx][c][k]`, the nesting the training script exports
    pub fn from_nested(weights: &[Vec<Vec<Vec<f32>>>]) -> Result<Self> {
        let kh = weights.len();
        let kw = weights.first().map_or(0, |r| r.len());
        let c = weights
            .first()
            .and_then(|r| r.first())
            .map_or(0, |col| col.len());
        let k = weights
            .first()
            .and_then(|r| r.first())
            .and_then(|col| col.first())
            .map_or(0, |ch| ch.len());

        let mut data = Vec::with_capacity(kh * kw * c * k);
        for row in weights {
            if row.len() != kw {
                return Err(ragged("kernel width"));
            }
            for col in row {
                if col.len() != c {
                    return Err(ragged("input channel count"));
                }
                for ch in col {
                    if ch.len() != k {
                        return Err(ragged("output channel count"));
                    }
                    data.extend_from_slice(ch);
                }
            }
        }

        Self::new(data, kh, kw, c, k)
    }

    /// `[KH, KW, C, K]`
    pub fn dims(&self) -> [usize; 4] {
        [
            self.kernel_height,
            self.kernel_width,
            self.in_channels,
            self.out_channels,
        ]
    }

    /// Flat offset of weight `(ky, kx, c, k)`
    #[inline(always)]
    pub fn index(&self, ky: usize, kx: usize, c: usize, k: usize) -> usize {
        ((ky * self.kernel_width + kx) * self.in_channels + c) * self.out_channels + k
    }

    #[inline]
    pub fn get(&self, ky: usize, kx: usize, c: usize, k: usize) -> f32 {
        self.data[self.index(ky, kx, c, k)]
    }

    /// Weights for all K outputs of one tap
    #[inline(always)]
    fn tap(&self, ky: usize, kx: usize, c: usize) -> &[f32] {
        let start = self.index(ky, kx, c, 0);
        &self.data[start..start + self.out_channels]
    }
}

fn ragged(what: &str) -> PetalError {
    PetalError::InvalidInput(format!("ragged kernel bank: inconsistent {}", what))
}

/// A convolution stage: kernel bank plus one bias per output channel
#[derive(Clone, Debug, PartialEq)]
pub struct Conv2d {
    pub kernels: KernelBank,
    pub bias: Vec<f32>,
}

impl Conv2d {
    /// # Errors
    ///
    /// [`PetalError::ShapeMismatch`] if `bias.len()` isn't the kernel bank's
    /// output channel count.
    pub fn new(kernels: KernelBank, bias: Vec<f32>) -> Result<Self> {
        if bias.len() != kernels.out_channels {
            return Err(PetalError::shape_mismatch(
                "conv2d",
                format!("{} biases", kernels.out_channels),
                format!("{} biases", bias.len()),
            ));
        }
        Ok(Self { kernels, bias })
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        convolve(input, &self.kernels, &self.bias)
    }

    /// Output shape for a given input shape, without computing anything
    pub fn output_shape(&self, input: Shape) -> Result<Shape> {
        output_shape(input, &self.kernels)
    }
}

fn output_shape(input: Shape, kernels: &KernelBank) -> Result<Shape> {
    if input.channels != kernels.in_channels {
        return Err(PetalError::shape_mismatch(
            "convolve",
            format!("input depth {}", kernels.in_channels),
            format!("input depth {} (input shape {})", input.channels, input),
        ));
    }
    if input.height < kernels.kernel_height || input.width < kernels.kernel_width {
        return Err(PetalError::too_small(
            "convolve",
            format!(
                "input {} is smaller than {}x{} kernel",
                input, kernels.kernel_height, kernels.kernel_width
            ),
        ));
    }
    Ok(Shape::new(
        input.height - kernels.kernel_height + 1,
        input.width - kernels.kernel_width + 1,
        kernels.out_channels,
    ))
}

/// Accumulate `value * weights[k]` into `acc[k]` for every k
#[inline(always)]
fn accumulate_tap(value: f32, weights: &[f32], acc: &mut [f32]) {
    for (a, &w) in acc.iter_mut().zip(weights.iter()) {
        *a += w * value;
    }
}

/// Valid convolution of `input` with `kernels`, plus `bias`
///
/// # Errors
///
/// - [`PetalError::ShapeMismatch`] if the input depth differs from the kernel
///   bank's input channels, or `bias` has the wrong length
/// - [`PetalError::InputTooSmall`] if the input is smaller than the kernel
/// - [`PetalError::InvalidInput`] if the input buffer disagrees with its shape
pub fn convolve(input: &Tensor, kernels: &KernelBank, bias: &[f32]) -> Result<Tensor> {
    input.check_consistent("convolve")?;
    let out_shape = output_shape(input.shape, kernels)?;
    if bias.len() != kernels.out_channels {
        return Err(PetalError::shape_mismatch(
            "convolve",
            format!("{} biases", kernels.out_channels),
            format!("{} biases", bias.len()),
        ));
    }

    debug!(
        input = %input.shape,
        kernels = ?kernels.dims(),
        output = %out_shape,
        "convolve"
    );

    let nk = kernels.out_channels;
    let depth = input.shape.channels;
    let mut out = vec![0.0f32; out_shape.len()];

    out.par_chunks_mut(out_shape.width * nk)
        .enumerate()
        .for_each(|(y, out_row)| {
            for (x, acc) in out_row.chunks_mut(nk).enumerate() {
                for c in 0..depth {
                    for ky in 0..kernels.kernel_height {
                        for kx in 0..kernels.kernel_width {
                            let value = input.get(y + ky, x + kx, c);
                            accumulate_tap(value, kernels.tap(ky, kx, c), acc);
                        }
                    }
                }
                for (a, &b) in acc.iter_mut().zip(bias) {
                    *a += b;
                }
            }
        });

    Ok(Tensor::from_parts(out, out_shape))
}
