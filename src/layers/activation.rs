//! Activation Functions
//!
//! Two activations appear in the network:
//!
//! - **ReLU** after every convolution and after the first dense layer
//! - **Softmax** after the final ("labeller") dense layer
//!
//! Activations are named by string in the trained model description, so an
//! [`Activation`] can be parsed from `"relu"` / `"softmax"`. Any other name is
//! rejected with [`PetalError::InvalidInput`].
//!
//! ## Where each kind is allowed
//!
//! Feature maps (rank-3 tensors) only support ReLU; there is no meaningful
//! per-tensor softmax in this network. Vectors support both.
//!
//! ## Softmax
//!
//! ```text
//! softmax(x)[i] = exp(x[i]) / Σ_j exp(x[j])
//! ```
//!
//! The trained model's reference evaluator does **not** subtract the maximum
//! before exponentiating, and this implementation matches it so that scores
//! agree bit for bit. Inputs above ~88 overflow `f32::exp`; the labeller's
//! logits stay far below that in practice.

use crate::error::{PetalError, Result};
use crate::tensor::Tensor;
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Supported activation kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Activation {
    Relu,
    Softmax,
}

impl FromStr for Activation {
    type Err = PetalError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "relu" => Ok(Activation::Relu),
            "softmax" => Ok(Activation::Softmax),
            other => Err(PetalError::InvalidInput(format!(
                "unknown activation function '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Relu => write!(f, "relu"),
            Activation::Softmax => write!(f, "softmax"),
        }
    }
}

#[inline(always)]
fn relu(v: f32) -> f32 {
    if v < 0.0 {
        0.0
    } else {
        v
    }
}

/// Apply an activation to a feature map
///
/// # Errors
///
/// [`PetalError::InvalidInput`] for anything other than [`Activation::Relu`],
/// or if the input buffer disagrees with its shape.
pub fn activate_tensor(input: &Tensor, kind: Activation) -> Result<Tensor> {
    input.check_consistent("activate_tensor")?;
    match kind {
        Activation::Relu => Ok(input.map(relu)),
        other => Err(PetalError::InvalidInput(format!(
            "activation '{}' is not supported on feature maps",
            other
        ))),
    }
}

/// Apply an activation to a dense-layer output vector
pub fn activate_vector(input: &[f32], kind: Activation) -> Result<Vec<f32>> {
    match kind {
        Activation::Relu => Ok(input.par_iter().map(|&v| relu(v)).collect()),
        Activation::Softmax => Ok(softmax(input)),
    }
}

/// Normalised exponential, without max subtraction
///
/// Output entries are non-negative and sum to 1 up to rounding.
pub fn softmax(input: &[f32]) -> Vec<f32> {
    let exp_values: Vec<f32> = input.iter().map(|&v| v.exp()).collect();
    let sum: f32 = exp_values.iter().sum();
    exp_values.into_iter().map(|v| v / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Shape;

    #[test]
    fn test_parse_names() {
        assert_eq!("relu".parse::<Activation>().unwrap(), Activation::Relu);
        assert_eq!("softmax".parse::<Activation>().unwrap(), Activation::Softmax);
        assert_eq!(Activation::Relu.to_string(), "relu");
    }

    #[test]
    fn test_unknown_name_is_invalid_input() {
        let err = "tanh".parse::<Activation>().unwrap_err();
        assert!(matches!(err, PetalError::InvalidInput(_)));
        assert!(err.to_string().contains("tanh"));
    }

    #[test]
    fn test_relu_tensor() {
        let t = Tensor::new(vec![-1.0, 0.0, 2.5, -0.0], Shape::new(1, 2, 2)).unwrap();
        let out = activate_tensor(&t, Activation::Relu).unwrap();
        assert_eq!(out.data, vec![0.0, 0.0, 2.5, -0.0]);
        assert_eq!(out.shape, t.shape);
    }

    #[test]
    fn test_relu_is_idempotent() {
        let v = vec![-3.0, -0.5, 0.0, 0.5, 7.0];
        let once = activate_vector(&v, Activation::Relu).unwrap();
        let twice = activate_vector(&once, Activation::Relu).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_softmax_rejected_on_feature_maps() {
        let t = Tensor::zeros(Shape::new(2, 2, 1));
        assert!(matches!(
            activate_tensor(&t, Activation::Softmax),
            Err(PetalError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let out = activate_vector(&[1.0, 2.0, 3.0, -4.0, 0.0], Activation::Softmax).unwrap();
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(out.iter().all(|&p| p >= 0.0));
        // Order preserved: larger logits get larger probabilities
        assert!(out[2] > out[1] && out[1] > out[0]);
    }

    #[test]
    fn test_softmax_uniform_for_equal_inputs() {
        let out = softmax(&[0.0; 5]);
        for p in out {
            assert!((p - 0.2).abs() < 1e-7);
        }
    }
}
