//! Result Ranking
//!
//! Pairs each probability with its label and orders them most likely first.
//!
//! The i-th probability belongs to the i-th label; the label list must be in
//! the labeller's output order. Ranking sorts a list of pairs with a stable
//! sort, so two labels with exactly the same probability are both kept, in
//! label order. (Keying a map by probability would silently drop one of
//! them, which does happen with e.g. zeroed weights giving a uniform output.)

use crate::error::{PetalError, Result};
use std::fmt;

/// One label with its probability
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub probability: f32,
}

impl Prediction {
    pub fn percent(&self) -> f32 {
        self.probability * 100.0
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}%", self.label, self.percent())
    }
}

/// Rank `probabilities` against `labels`, highest first
///
/// # Errors
///
/// [`PetalError::TooManyCategories`] if there are more probabilities than
/// labels.
pub fn rank(probabilities: &[f32], labels: &[String]) -> Result<Vec<Prediction>> {
    if probabilities.len() > labels.len() {
        return Err(PetalError::TooManyCategories {
            outputs: probabilities.len(),
            labels: labels.len(),
        });
    }

    let mut ranked: Vec<Prediction> = probabilities
        .iter()
        .zip(labels)
        .map(|(&probability, label)| Prediction {
            label: label.clone(),
            probability,
        })
        .collect();
    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    Ok(ranked)
}
