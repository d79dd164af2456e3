//! Dense Layer (Fully Connected)
//!
//! An affine transformation of a vector: `y = x @ W + b`
//!
//! ```text
//! Input:  x [N]
//! Weight: W [N, M]   (row i holds input unit i's weight to every output)
//! Bias:   b [M]
//! Output: y [M],  y[j] = Σ_i x[i] · W[i][j] + b[j]
//! ```
//!
//! ## Implementation Notes
//!
//! - Weights are input-major, exactly as the trained model exported them
//! - For each input unit, `x[i]` times row `i` is added into the outputs; the
//!   innermost loop is a contiguous multiply-add that LLVM vectorises
//! - Every output starts from zero, sums over `i` in order, then adds its
//!   bias, so block-parallel evaluation is bit-identical to a serial loop
//! - Output units are split into blocks processed in parallel with Rayon

use crate::error::{PetalError, Result};
use rayon::prelude::*;
use tracing::debug;

/// Output units per parallel work item
const BLOCK_SIZE: usize = 64;

/// Weight matrix of a dense layer, `[inputs, outputs]` row-major
#[derive(Clone, Debug, PartialEq)]
pub struct DenseWeights {
    pub data: Vec<f32>,
    pub inputs: usize,
    pub outputs: usize,
}

impl DenseWeights {
    /// # Errors
    ///
    /// [`PetalError::InvalidInput`] if the data length isn't `inputs * outputs`.
    pub fn new(data: Vec<f32>, inputs: usize, outputs: usize) -> Result<Self> {
        if inputs.checked_mul(outputs) != Some(data.len()) {
            return Err(PetalError::InvalidInput(format!(
                "dense weight data length ({}) doesn't match [{}, {}]",
                data.len(),
                inputs,
                outputs
            )));
        }
        Ok(Self {
            data,
            inputs,
            outputs,
        })
    }

    /// Build from `weights[i][j]` nested rows
    pub fn from_nested(rows: &[Vec<f32>]) -> Result<Self> {
        let inputs = rows.len();
        let outputs = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(inputs * outputs);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != outputs {
                return Err(PetalError::InvalidInput(format!(
                    "ragged dense weights: row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    outputs
                )));
            }
            data.extend_from_slice(row);
        }
        Self::new(data, inputs, outputs)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.outputs + j]
    }

    /// Weights from input unit `i` to every output
    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.outputs..(i + 1) * self.outputs]
    }
}

/// A dense stage: weight matrix plus one bias per output unit
#[derive(Clone, Debug, PartialEq)]
pub struct Dense {
    pub weights: DenseWeights,
    pub bias: Vec<f32>,
}

impl Dense {
    /// # Errors
    ///
    /// - [`PetalError::ShapeMismatch`] if the bias length isn't the weight
    ///   matrix's output width
    /// - [`PetalError::InvalidInput`] if the matrix has no output units
    pub fn new(weights: DenseWeights, bias: Vec<f32>) -> Result<Self> {
        check_bias(&weights, &bias)?;
        Ok(Self { weights, bias })
    }

    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>> {
        dense(input, &self.weights, &self.bias)
    }
}

fn check_bias(weights: &DenseWeights, bias: &[f32]) -> Result<()> {
    if weights.outputs == 0 {
        return Err(PetalError::InvalidInput(
            "dense weight matrix has no output units".to_string(),
        ));
    }
    if bias.len() != weights.outputs {
        return Err(PetalError::shape_mismatch(
            "dense",
            format!("{} biases", weights.outputs),
            format!("{} biases", bias.len()),
        ));
    }
    Ok(())
}

/// Multiply-add one weight row into the outputs
#[inline(always)]
fn accumulate_row(x: f32, row: &[f32], out: &mut [f32]) {
    for (o, &w) in out.iter_mut().zip(row.iter()) {
        *o += w * x;
    }
}

/// `out[j] = bias[j] + Σ_i input[i] · weights[i][j]`
///
/// # Errors
///
/// - [`PetalError::ShapeMismatch`] if `input` is empty or its length differs
///   from the weight matrix's input dimension, or if `bias.len()` differs
///   from the output dimension
/// - [`PetalError::InvalidInput`] if the matrix has no output units
pub fn dense(input: &[f32], weights: &DenseWeights, bias: &[f32]) -> Result<Vec<f32>> {
    if input.len() != weights.inputs || input.is_empty() {
        return Err(PetalError::shape_mismatch(
            "dense",
            format!("input length {}", weights.inputs),
            format!("input length {}", input.len()),
        ));
    }
    check_bias(weights, bias)?;

    debug!(input = input.len(), output = weights.outputs, "dense");

    let mut out = vec![0.0f32; weights.outputs];
    out.par_chunks_mut(BLOCK_SIZE)
        .enumerate()
        .for_each(|(block, out_block)| {
            let j_start = block * BLOCK_SIZE;
            let j_end = j_start + out_block.len();
            for (i, &x) in input.iter().enumerate() {
                accumulate_row(x, &weights.row(i)[j_start..j_end], out_block);
            }
            for (o, &b) in out_block.iter_mut().zip(&bias[j_start..j_end]) {
                *o += b;
            }
        });

    Ok(out)
}
