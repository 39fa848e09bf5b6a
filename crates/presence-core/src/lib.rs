//! presence-core — Multi-modal verification and attendance decisions.
//!
//! Pure decision logic: score fusion across face and voice, best-match
//! identity resolution, the per-day attendance state machine, and the
//! derived reporting projections. No I/O lives here; storage and
//! matcher orchestration belong to the daemon.

pub mod analytics;
pub mod attendance;
pub mod fusion;
pub mod matcher;
pub mod resolver;
pub mod types;

pub use attendance::{AttendanceRecord, AttendanceStatus, CheckoutPolicy, DayRules, Transition};
pub use fusion::{FusionError, FusionWeights};
pub use matcher::{CosineMatcher, InverseDistanceMatcher, MatcherError, ModalityMatcher};
pub use resolver::{Candidate, ResolverConfig};
pub use types::{Embedding, MatchResult, Modality, ModalitySet, RejectReason, Template, VerificationSample};
