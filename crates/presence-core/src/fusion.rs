//! Score fusion policy.
//!
//! Combines per-modality similarity scores into one fused confidence
//! value. Face is the primary modality; voice corroborates. A missing
//! modality is never fabricated: with one score present the fused score
//! is that score unchanged, and the result is flagged single-modality.

use crate::types::ModalitySet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scores are quantized to basis points (1/10 000) before weighted
/// fusion, so decimal score/weight combinations that are exact in
/// decimal are exact here too and the accept decision does not depend
/// on platform float rounding.
const SCALE: i64 = 10_000;

#[derive(Error, Debug, PartialEq)]
pub enum FusionError {
    #[error("at least one modality score is required")]
    InsufficientInput,
    #[error("modality weights must be non-negative and sum to 1.0 (got face={face}, voice={voice})")]
    InvalidWeights { face: f64, voice: f64 },
    #[error("{modality} score {value} outside [0.0, 1.0]")]
    ScoreOutOfRange { modality: &'static str, value: f64 },
}

/// Relative weight of each modality when both scores are present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub face: f64,
    pub voice: f64,
}

impl FusionWeights {
    /// Validated constructor: both weights non-negative, summing to 1.0.
    pub fn new(face: f64, voice: f64) -> Result<Self, FusionError> {
        if face < 0.0 || voice < 0.0 || (face + voice - 1.0).abs() > 1e-9 {
            return Err(FusionError::InvalidWeights { face, voice });
        }
        Ok(Self { face, voice })
    }

    fn face_bp(&self) -> i64 {
        (self.face * SCALE as f64).round() as i64
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { face: 0.6, voice: 0.4 }
    }
}

/// A fused confidence value plus the modalities that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fused {
    /// Fused confidence in [0, 1].
    pub score: f64,
    pub modalities: ModalitySet,
}

impl Fused {
    pub fn single_modality(&self) -> bool {
        self.modalities.single()
    }
}

fn check_range(modality: &'static str, score: f64) -> Result<f64, FusionError> {
    if !(0.0..=1.0).contains(&score) || score.is_nan() {
        return Err(FusionError::ScoreOutOfRange { modality, value: score });
    }
    Ok(score)
}

/// Fuse per-modality scores under the given weights.
///
/// Both present: weighted average in basis-point arithmetic.
/// Exactly one present: that score, bit-exact, flagged single-modality.
/// Neither present: `InsufficientInput`.
///
/// Pure and deterministic; output always stays in [0, 1].
pub fn fuse(
    face: Option<f64>,
    voice: Option<f64>,
    weights: &FusionWeights,
) -> Result<Fused, FusionError> {
    match (face, voice) {
        (Some(f), Some(v)) => {
            let f = check_range("face", f)?;
            let v = check_range("voice", v)?;
            let wf = weights.face_bp();
            let wv = SCALE - wf;
            let f_bp = (f * SCALE as f64).round() as i64;
            let v_bp = (v * SCALE as f64).round() as i64;
            // Round-half-up weighted average in integer space.
            let fused_bp = (f_bp * wf + v_bp * wv + SCALE / 2) / SCALE;
            Ok(Fused {
                score: fused_bp as f64 / SCALE as f64,
                modalities: ModalitySet { face: true, voice: true },
            })
        }
        (Some(f), None) => Ok(Fused {
            score: check_range("face", f)?,
            modalities: ModalitySet { face: true, voice: false },
        }),
        (None, Some(v)) => Ok(Fused {
            score: check_range("voice", v)?,
            modalities: ModalitySet { face: false, voice: true },
        }),
        (None, None) => Err(FusionError::InsufficientInput),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w() -> FusionWeights {
        FusionWeights::default()
    }

    #[test]
    fn both_modalities_weighted_average() {
        // 0.7 * 0.6 + 0.95 * 0.4 = 0.80 exactly under basis-point fusion.
        let fused = fuse(Some(0.70), Some(0.95), &w()).unwrap();
        assert_eq!(fused.score, 0.80);
        assert!(!fused.single_modality());
    }

    #[test]
    fn single_modality_passes_through_bit_exact() {
        for x in [0.0, 0.123456789, 0.5, 0.92, 1.0] {
            let fused = fuse(Some(x), None, &w()).unwrap();
            assert_eq!(fused.score, x);
            assert!(fused.single_modality());
            assert!(fused.modalities.face);

            let fused = fuse(None, Some(x), &w()).unwrap();
            assert_eq!(fused.score, x);
            assert!(fused.single_modality());
            assert!(fused.modalities.voice);
        }
    }

    #[test]
    fn no_modalities_is_insufficient_input() {
        assert_eq!(fuse(None, None, &w()), Err(FusionError::InsufficientInput));
    }

    #[test]
    fn fused_score_stays_in_domain() {
        let fused = fuse(Some(1.0), Some(1.0), &w()).unwrap();
        assert_eq!(fused.score, 1.0);
        let fused = fuse(Some(0.0), Some(0.0), &w()).unwrap();
        assert_eq!(fused.score, 0.0);
    }

    #[test]
    fn monotonic_in_each_present_score() {
        // Fused score never decreases as either input increases.
        let steps: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();
        for &fixed in &steps {
            let mut prev = -1.0;
            for &x in &steps {
                let s = fuse(Some(x), Some(fixed), &w()).unwrap().score;
                assert!(s >= prev, "face sweep regressed at x={x}, fixed={fixed}");
                prev = s;
            }
            let mut prev = -1.0;
            for &x in &steps {
                let s = fuse(Some(fixed), Some(x), &w()).unwrap().score;
                assert!(s >= prev, "voice sweep regressed at x={x}, fixed={fixed}");
                prev = s;
            }
        }
    }

    #[test]
    fn out_of_range_score_rejected() {
        assert!(matches!(
            fuse(Some(1.2), None, &w()),
            Err(FusionError::ScoreOutOfRange { modality: "face", .. })
        ));
        assert!(matches!(
            fuse(Some(0.5), Some(-0.1), &w()),
            Err(FusionError::ScoreOutOfRange { modality: "voice", .. })
        ));
    }

    #[test]
    fn weights_must_sum_to_one() {
        assert!(FusionWeights::new(0.6, 0.4).is_ok());
        assert!(FusionWeights::new(0.5, 0.5).is_ok());
        assert!(FusionWeights::new(0.7, 0.4).is_err());
        assert!(FusionWeights::new(-0.1, 1.1).is_err());
    }

    #[test]
    fn custom_weights_respected() {
        let even = FusionWeights::new(0.5, 0.5).unwrap();
        let fused = fuse(Some(0.6), Some(0.8), &even).unwrap();
        assert_eq!(fused.score, 0.7);
    }
}
