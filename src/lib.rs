//! Petal: Hand-Written CNN Inference
//!
//! Runs a small pretrained convolutional network that labels a 128×128 RGB
//! image as one of five flowers. All numeric work (padding, convolution,
//! pooling, dense layers, activations) is implemented here on flat `f32`
//! buffers; the only inputs are the trained constants and one image.
//!
//! # Modules
//!
//! - [`tensor`] - HWC tensors with explicit shapes
//! - [`layers`] - Padding, convolution, activation, pooling, flatten, dense
//! - [`model`] - Topology config, weight container, weight files
//! - [`classifier`] - The fixed forward pass
//! - [`image`] - 8-bit RGB to normalised tensor
//! - [`ranking`] - Probabilities to a ranked label list
//! - [`layout`] - Channel-first permutations of the constants
//! - [`logging`] - Tracing subscriber setup
//!
//! # Example
//!
//! ```rust,no_run
//! use petal::{classify, image, rank, Model};
//!
//! let model = Model::load("flowers.petal")?;
//! let img = image::read_rgb8("rose.rgb", model.config.input_shape())?;
//! let probabilities = classify(&model, &img)?;
//! for prediction in rank(&probabilities, model.labels())? {
//!     println!("{}", prediction);
//! }
//! # Ok::<(), petal::PetalError>(())
//! ```

pub mod classifier;
pub mod error;
pub mod image;
pub mod layers;
pub mod layout;
pub mod logging;
pub mod model;
pub mod ranking;
pub mod tensor;

// Re-export main types for convenience
pub use classifier::classify;
pub use error::{PetalError, Result};
pub use layers::{Activation, Conv2d, Dense, DenseWeights, KernelBank};
pub use model::{Config, Model};
pub use ranking::{rank, Prediction};
pub use tensor::{Shape, Tensor};
