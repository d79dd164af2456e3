//! Neural Network Layers
//!
//! Forward-only implementations of every stage the classifier uses. Each is a
//! pure function from a fresh input to a fresh output; nothing is mutated in
//! place and nothing is cached between calls.
//!
//! ## Layers
//!
//! - **padding**: Zero padding around a feature map
//! - **conv**: Valid 2D convolution with HWCK kernel banks
//! - **activation**: ReLU and softmax
//! - **pooling**: Non-overlapping max pooling
//! - **flatten**: Feature map to vector in HWC order
//! - **dense**: Fully connected layer
//!
//! ## Design Pattern
//!
//! Stages with parameters pair a plain function with a small struct holding
//! the constants:
//!
//! ```rust,ignore
//! pub fn convolve(input: &Tensor, kernels: &KernelBank, bias: &[f32]) -> Result<Tensor>;
//!
//! pub struct Conv2d { pub kernels: KernelBank, pub bias: Vec<f32> }
//! impl Conv2d {
//!     pub fn forward(&self, input: &Tensor) -> Result<Tensor> { convolve(input, &self.kernels, &self.bias) }
//! }
//! ```
//!
//! Every function checks its shape preconditions first and returns a
//! [`PetalError`](crate::PetalError) describing expected vs actual dimensions.

pub mod activation;
pub mod conv;
pub mod dense;
pub mod flatten;
pub mod padding;
pub mod pooling;

// Re-export main types for convenience
pub use activation::{activate_tensor, activate_vector, softmax, Activation};
pub use conv::{convolve, Conv2d, KernelBank};
pub use dense::{dense, Dense, DenseWeights};
pub use flatten::flatten;
pub use padding::zero_pad;
pub use pooling::max_pool;
