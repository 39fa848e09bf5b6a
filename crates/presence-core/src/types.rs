use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One biometric channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Face,
    Voice,
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modality::Face => write!(f, "face"),
            Modality::Voice => write!(f, "voice"),
        }
    }
}

/// Opaque embedding vector for either modality.
///
/// The core never inspects how a vector was produced; feature extraction
/// happens upstream of this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar.
    /// Always processes all dimensions; no early exit.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Stored reference embedding for one of a person's modalities,
/// created at enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub embedding: Embedding,
    pub enrolled_at: DateTime<Utc>,
}

/// Transient verification input: at most one probe per modality.
/// Never persisted; lives only for the duration of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSample {
    pub face: Option<Embedding>,
    pub voice: Option<Embedding>,
    pub taken_at: DateTime<Utc>,
}

impl VerificationSample {
    pub fn is_empty(&self) -> bool {
        self.face.is_none() && self.voice.is_none()
    }
}

/// Which modalities contributed to a fused score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModalitySet {
    pub face: bool,
    pub voice: bool,
}

impl ModalitySet {
    pub fn single(&self) -> bool {
        self.face != self.voice
    }
}

/// Why a resolution did not produce a verified identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Best fused score fell below the acceptance threshold.
    NoMatchAboveThreshold,
    /// No enrolled person was eligible for the supplied modalities.
    EmptyDirectory,
}

/// Outcome of resolving a sample against the directory.
///
/// Absence of a match is a normal outcome, conveyed through
/// `verified = false` plus a reason, never through an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub verified: bool,
    /// Best-matching person, only set when `verified`.
    pub person_id: Option<String>,
    /// Per-modality scores of the best candidate, in [0, 1].
    pub face_score: Option<f64>,
    pub voice_score: Option<f64>,
    /// Fused confidence in [0, 1]; 0.0 when the directory was empty.
    pub fused_score: f64,
    /// Set when only one modality contributed to the fused score.
    pub single_modality: bool,
    pub reason: Option<RejectReason>,
}

impl MatchResult {
    /// Non-match against an empty (or incompatible) directory.
    pub fn empty_directory() -> Self {
        Self {
            verified: false,
            person_id: None,
            face_score: None,
            voice_score: None,
            fused_score: 0.0,
            single_modality: false,
            reason: Some(RejectReason::EmptyDirectory),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.cosine_similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert!((a.cosine_similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.cosine_similarity(&b), 0.0);
    }

    #[test]
    fn euclidean_distance_basic() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn modality_set_single() {
        assert!(ModalitySet { face: true, voice: false }.single());
        assert!(ModalitySet { face: false, voice: true }.single());
        assert!(!ModalitySet { face: true, voice: true }.single());
        assert!(!ModalitySet::default().single());
    }
}
