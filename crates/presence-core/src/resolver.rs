//! Identity resolver.
//!
//! Picks the best match across every eligible candidate — argmax of the
//! fused score, not first-over-threshold — and applies the acceptance
//! threshold. Ties break toward the lowest person id so repeated calls
//! over the same directory are deterministic.

use crate::fusion::{self, FusionError, FusionWeights};
use crate::types::{MatchResult, RejectReason};

/// Per-person modality scores collected by scanning the directory.
///
/// A candidate appears here only if the person is active and owns at
/// least one template compatible with the sample's modalities; a score
/// is `None` when the person lacks that template or the modality was
/// not supplied.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub person_id: String,
    pub face: Option<f64>,
    pub voice: Option<f64>,
}

/// Injected acceptance policy. The same resolver serves general
/// verification and face-only admin login; callers vary the candidate
/// set and the threshold, never the algorithm.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// Minimum fused score for a verified match. Inclusive: a fused
    /// score exactly equal to the threshold verifies.
    pub threshold: f64,
    pub weights: FusionWeights,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            threshold: 0.80,
            weights: FusionWeights::default(),
        }
    }
}

/// Resolve a scored candidate set into an identity decision.
///
/// Never errors for "not found": an empty candidate set or a best score
/// below threshold is a normal negative outcome carrying the best
/// scores seen, for observability.
pub fn resolve(candidates: &[Candidate], config: &ResolverConfig) -> MatchResult {
    let mut best: Option<(&Candidate, fusion::Fused)> = None;

    for candidate in candidates {
        let fused = match fusion::fuse(candidate.face, candidate.voice, &config.weights) {
            Ok(f) => f,
            // A candidate with no scores at all is not eligible.
            Err(FusionError::InsufficientInput) => continue,
            Err(err) => {
                tracing::warn!(person_id = %candidate.person_id, error = %err, "skipping candidate");
                continue;
            }
        };

        let better = match &best {
            None => true,
            Some((prev, prev_fused)) => {
                fused.score > prev_fused.score
                    || (fused.score == prev_fused.score && candidate.person_id < prev.person_id)
            }
        };
        if better {
            best = Some((candidate, fused));
        }
    }

    let Some((candidate, fused)) = best else {
        return MatchResult::empty_directory();
    };

    let verified = fused.score >= config.threshold;
    tracing::debug!(
        person_id = %candidate.person_id,
        fused = fused.score,
        threshold = config.threshold,
        verified,
        "resolution complete"
    );

    MatchResult {
        verified,
        person_id: verified.then(|| candidate.person_id.clone()),
        face_score: candidate.face,
        voice_score: candidate.voice,
        fused_score: fused.score,
        single_modality: fused.single_modality(),
        reason: (!verified).then_some(RejectReason::NoMatchAboveThreshold),
    }
}
