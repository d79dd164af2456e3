//! Error Types
//!
//! Every stage of the forward pass checks its preconditions on entry and fails
//! immediately with one of these errors. Nothing is retried and no partial
//! output is produced: a structurally invalid tensor means the weights or the
//! caller are wrong, not that something transient happened.
//!
//! ## Taxonomy
//!
//! - **ShapeMismatch**: input dimensions disagree with the paired constants
//!   (conv input depth vs kernel depth, dense input length vs weight rows, ...)
//! - **InputTooSmall**: a spatial dimension is below what the operation needs
//! - **InvalidInput**: unsupported activation, wrong image size, ragged data
//! - **TooManyCategories**: more probabilities than labels when ranking
//!
//! The remaining variants only come from reading or writing weight files.

use thiserror::Error;

/// Errors produced by tensor operations, model loading and ranking
#[derive(Error, Debug)]
pub enum PetalError {
    /// Input dimensions do not match what the operation's constants require
    #[error("{op}: shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        op: &'static str,
        expected: String,
        actual: String,
    },

    /// A spatial dimension is smaller than a structural requirement
    #[error("{op}: input too small: {detail}")]
    InputTooSmall { op: &'static str, detail: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("too many result categories: {outputs} outputs but only {labels} labels")]
    TooManyCategories { outputs: usize, labels: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Weight file is structurally broken (bad magic, version, truncated)
    #[error("invalid weight file: {0}")]
    InvalidFormat(String),
}

impl PetalError {
    pub(crate) fn shape_mismatch(
        op: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        PetalError::ShapeMismatch {
            op,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn too_small(op: &'static str, detail: impl Into<String>) -> Self {
        PetalError::InputTooSmall {
            op,
            detail: detail.into(),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PetalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message_has_both_shapes() {
        let err = PetalError::shape_mismatch("convolve", "depth 4", "depth 3");
        let msg = err.to_string();
        assert!(msg.contains("convolve"));
        assert!(msg.contains("depth 4"));
        assert!(msg.contains("depth 3"));
    }

    #[test]
    fn test_io_error_converts() {
        fn open() -> Result<std::fs::File> {
            Ok(std::fs::File::open("/definitely/not/a/real/path.bin")?)
        }
        assert!(matches!(open(), Err(PetalError::Io(_))));
    }
}
