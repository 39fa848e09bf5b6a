//! Modality matcher seam.
//!
//! The resolver consumes similarity scores in [0, 1]; producing them is
//! the job of an external matcher service per modality. The built-in
//! implementations score embeddings directly and exist so a deployment
//! without dedicated matcher backends still works end to end.

use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("matcher backend unavailable: {0}")]
    Unavailable(String),
    #[error("probe/reference dimension mismatch: {probe} vs {reference}")]
    DimensionMismatch { probe: usize, reference: usize },
}

/// Scores a probe against a stored reference template for one modality.
///
/// Implementations must return a similarity in [0, 1]; higher = more
/// similar. Implementations may block on I/O — callers are expected to
/// run scans off the async executor and apply their own timeouts.
pub trait ModalityMatcher: Send + Sync {
    fn score(&self, probe: &Embedding, reference: &Embedding) -> Result<f64, MatcherError>;
}

/// Cosine-similarity face matcher.
///
/// Cosine lands in [-1, 1]; negative similarity carries no identity
/// signal for this policy, so scores clamp at zero.
pub struct CosineMatcher;

impl ModalityMatcher for CosineMatcher {
    fn score(&self, probe: &Embedding, reference: &Embedding) -> Result<f64, MatcherError> {
        if probe.values.len() != reference.values.len() {
            return Err(MatcherError::DimensionMismatch {
                probe: probe.values.len(),
                reference: reference.values.len(),
            });
        }
        Ok(f64::from(probe.cosine_similarity(reference)).clamp(0.0, 1.0))
    }
}

/// Voice matcher: Euclidean distance mapped to a similarity via
/// `1 / (1 + distance)`, so 0 distance scores 1.0 and large distances
/// approach 0.
pub struct InverseDistanceMatcher;

impl ModalityMatcher for InverseDistanceMatcher {
    fn score(&self, probe: &Embedding, reference: &Embedding) -> Result<f64, MatcherError> {
        if probe.values.len() != reference.values.len() {
            return Err(MatcherError::DimensionMismatch {
                probe: probe.values.len(),
                reference: reference.values.len(),
            });
        }
        let distance = f64::from(probe.euclidean_distance(reference));
        Ok(1.0 / (1.0 + distance))
    }
}
