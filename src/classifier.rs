//! Forward Pass
//!
//! Threads one image through the fixed sequence of stages:
//!
//! ```text
//! pad(1,1) → conv₁ → relu → pool(2,2)
//! pad(1,1) → conv₂ → relu → pool(2,2)
//! pad(1,1) → conv₃ → relu → pool(2,2)
//! pad(1,1) → conv₄ → relu → pool(2,2)
//! flatten → dense₁ → relu → labeller → softmax
//! ```
//!
//! Plain function composition: each stage consumes the previous stage's
//! output and the previous value is dropped. The first failing stage's error
//! is returned unchanged.
//!
//! Classification is a single blocking call and holds no state, so calling it
//! twice with the same model and image gives bit-identical results, and many
//! threads may classify different images against the same `&Model`.

use crate::error::{PetalError, Result};
use crate::layers::{
    activate_tensor, activate_vector, flatten, max_pool, zero_pad, Activation, Conv2d,
};
use crate::model::Model;
use crate::tensor::Tensor;
use tracing::debug_span;

/// pad → convolve → relu → pool
fn conv_stage(input: &Tensor, conv: &Conv2d, padding: usize, pool: usize) -> Result<Tensor> {
    let t = zero_pad(input, padding, padding)?;
    let t = conv.forward(&t)?;
    let t = activate_tensor(&t, Activation::Relu)?;
    max_pool(&t, pool, pool)
}

/// Classify one image, returning one probability per label
///
/// # Arguments
///
/// * `model` - Validated model constants
/// * `image` - `(H, W, C)` tensor in [0, 1] matching `model.config.input_shape()`
///
/// # Errors
///
/// [`PetalError::ShapeMismatch`] if the image shape isn't the model's input
/// shape; otherwise whatever the first failing stage reports.
///
/// # Example
///
/// ```rust
/// use petal::{classify, Config, Model, Tensor};
///
/// let model = Model::random(Config::tiny(), 1).unwrap();
/// let image = Tensor::filled(model.config.input_shape(), 0.5);
/// let probabilities = classify(&model, &image).unwrap();
/// assert_eq!(probabilities.len(), 5);
/// ```
pub fn classify(model: &Model, image: &Tensor) -> Result<Vec<f32>> {
    let expected = model.config.input_shape();
    if image.shape != expected {
        return Err(PetalError::shape_mismatch(
            "classify",
            format!("image {}", expected),
            format!("image {}", image.shape),
        ));
    }

    let _span = debug_span!("classify", input = %image.shape).entered();
    let padding = model.config.padding;
    let pool = model.config.pool_size;

    let mut t = conv_stage(image, &model.first_conv, padding, pool)?;
    for conv in [&model.second_conv, &model.third_conv, &model.fourth_conv] {
        t = conv_stage(&t, conv, padding, pool)?;
    }

    let flat = flatten(&t)?;
    let hidden = model.first_dense.forward(&flat)?;
    let hidden = activate_vector(&hidden, Activation::Relu)?;
    let scores = model.labeller.forward(&hidden)?;
    activate_vector(&scores, Activation::Softmax)
}

impl Model {
    /// Convenience for [`classify`]
    pub fn classify(&self, image: &Tensor) -> Result<Vec<f32>> {
        classify(self, image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Dense, DenseWeights, KernelBank};
    use crate::model::Config;
    use crate::tensor::Shape;

    /// Tiny model whose convolutions copy input channel 0 into every output
    /// channel and whose dense layers copy two features into the first two
    /// scores
    fn pass_through_model() -> Model {
        let config = Config::tiny();
        let k = config.kernel_size;
        let mut convs = Vec::new();
        for stage in 0..4 {
            let c = config.conv_in_channels(stage);
            let n = config.conv_filters[stage];
            let mut bank = KernelBank::new(vec![0.0; k * k * c * n], k, k, c, n).unwrap();
            // centre tap, input channel 0 -> every output channel
            for out in 0..n {
                let i = bank.index(1, 1, 0, out);
                bank.data[i] = 1.0;
            }
            convs.push(Conv2d::new(bank, vec![0.0; n]).unwrap());
        }
        let convs: [Conv2d; 4] = convs.try_into().unwrap();

        let mut first = vec![0.0; 2 * 8];
        first[0] = 1.0; // feature 0 -> hidden 0
        first[8 + 1] = 1.0; // feature 1 -> hidden 1
        let first_dense =
            Dense::new(DenseWeights::new(first, 2, 8).unwrap(), vec![0.0; 8]).unwrap();

        let mut last = vec![0.0; 8 * 5];
        last[0] = 1.0;
        last[5 + 1] = 1.0;
        let labeller = Dense::new(DenseWeights::new(last, 8, 5).unwrap(), vec![0.0; 5]).unwrap();

        Model::new(config, convs, first_dense, labeller).unwrap()
    }

    #[test]
    fn test_output_is_probability_vector() {
        let model = Model::random(Config::tiny(), 5).unwrap();
        let image = Tensor::filled(model.config.input_shape(), 0.25);
        let probs = classify(&model, &image).unwrap();
        assert_eq!(probs.len(), 5);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn test_deterministic() {
        let model = Model::random(Config::tiny(), 9).unwrap();
        let shape = model.config.input_shape();
        let data = (0..shape.len()).map(|i| (i % 17) as f32 / 16.0).collect();
        let image = Tensor::new(data, shape).unwrap();
        let a = classify(&model, &image).unwrap();
        let b = model.classify(&image).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hand_built_model() {
        // A bright pixel survives every pad/conv/pool stage through channel 0
        let model = pass_through_model();
        let mut image = Tensor::zeros(model.config.input_shape());
        image.set(3, 5, 0, 1.0);

        // Both final channels carry the pixel, so scores are [1, 1, 0, 0, 0]
        let probs = classify(&model, &image).unwrap();
        let e = std::f32::consts::E;
        let total = 2.0 * e + 3.0;
        assert!((probs[0] - e / total).abs() < 1e-6);
        assert!((probs[1] - e / total).abs() < 1e-6);
        for &p in &probs[2..] {
            assert!((p - 1.0 / total).abs() < 1e-6);
        }
    }

    #[test]
    fn test_wrong_image_shape() {
        let model = Model::random(Config::tiny(), 5).unwrap();
        let image = Tensor::zeros(Shape::new(16, 16, 4));
        assert!(matches!(
            classify(&model, &image),
            Err(PetalError::ShapeMismatch { op: "classify", .. })
        ));
    }

    #[test]
    fn test_stage_error_propagates_unchanged() {
        let mut model = Model::random(Config::tiny(), 5).unwrap();
        let wrong = KernelBank::new(vec![0.0; 9 * 7 * 4], 3, 3, 7, 4).unwrap();
        model.third_conv = Conv2d::new(wrong, vec![0.0; 4]).unwrap();
        let image = Tensor::zeros(model.config.input_shape());
        match classify(&model, &image) {
            Err(PetalError::ShapeMismatch { op, .. }) => assert_eq!(op, "convolve"),
            other => panic!("expected convolve shape mismatch, got {:?}", other),
        }
    }
}
