//! Verification engine.
//!
//! Orchestrates one request end to end: load the gallery, fan the
//! face/voice scans out concurrently, resolve the best match, and feed
//! verified check-ins into the attendance state machine. A degraded
//! matcher backend costs one modality, not the whole request.

use crate::config::Config;
use crate::store::{
    AttendanceView, DirectoryFilter, GalleryEntry, Person, PersonDraft, Store, StoreError,
};
use chrono::{DateTime, NaiveDate, Utc};
use presence_core::analytics::{self, DailyOverview, PersonStats};
use presence_core::attendance::{AttendanceRecord, DayRules, Transition};
use presence_core::fusion::{FusionError, FusionWeights};
use presence_core::matcher::{CosineMatcher, InverseDistanceMatcher, ModalityMatcher};
use presence_core::resolver::{self, Candidate, ResolverConfig};
use presence_core::types::{Embedding, MatchResult, Modality, RejectReason, VerificationSample};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no biometric input supplied")]
    InsufficientInput,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid fusion configuration: {0}")]
    Config(#[from] FusionError),
}

/// Per-modality and fused scores reported with every verification,
/// including negative outcomes, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct Scores {
    pub face: Option<f64>,
    pub voice: Option<f64>,
    pub fused: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonSummary {
    pub id: String,
    pub name: String,
    pub employee_id: Option<String>,
    pub department: String,
}

impl From<&Person> for PersonSummary {
    fn from(person: &Person) -> Self {
        Self {
            id: person.id.clone(),
            name: person.name.clone(),
            employee_id: person.employee_id.clone(),
            department: person.department.clone(),
        }
    }
}

/// What a verified check-in did to today's record.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceOutcome {
    /// One of `checked_in`, `checked_out`, `duplicate`, `already_completed`.
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<AttendanceRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person: Option<PersonSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<AttendanceOutcome>,
    pub scores: Scores,
    pub single_modality: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminLoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<PersonSummary>,
    pub scores: Scores,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonAnalytics {
    pub stats: PersonStats,
    /// Most recent first.
    pub history: Vec<AttendanceRecord>,
}

pub struct Engine {
    store: Store,
    weights: FusionWeights,
    threshold: f64,
    admin_threshold: f64,
    day_rules: DayRules,
    exclude_weekends: bool,
    matcher_timeout: Duration,
    face_matcher: Arc<dyn ModalityMatcher>,
    voice_matcher: Arc<dyn ModalityMatcher>,
}

impl Engine {
    /// Build an engine with the built-in embedding matchers.
    pub fn new(store: Store, config: &Config) -> Result<Self, EngineError> {
        Self::with_matchers(
            store,
            config,
            Arc::new(CosineMatcher),
            Arc::new(InverseDistanceMatcher),
        )
    }

    /// Build an engine with injected matcher backends.
    pub fn with_matchers(
        store: Store,
        config: &Config,
        face_matcher: Arc<dyn ModalityMatcher>,
        voice_matcher: Arc<dyn ModalityMatcher>,
    ) -> Result<Self, EngineError> {
        let weights = FusionWeights::new(config.face_weight, config.voice_weight)?;
        let offset = chrono::FixedOffset::east_opt(config.utc_offset_minutes * 60)
            .unwrap_or_else(|| chrono::FixedOffset::east_opt(0).expect("zero offset"));
        Ok(Self {
            store,
            weights,
            threshold: config.threshold,
            admin_threshold: config.admin_threshold,
            day_rules: DayRules {
                late_cutoff: config.late_cutoff,
                offset,
                checkout_policy: config.checkout_policy,
            },
            exclude_weekends: config.exclude_weekends,
            matcher_timeout: Duration::from_millis(config.matcher_timeout_ms),
            face_matcher,
            voice_matcher,
        })
    }

    pub async fn enroll(
        &self,
        draft: PersonDraft,
        face: Option<Embedding>,
        voice: Option<Embedding>,
        now: DateTime<Utc>,
    ) -> Result<Person, EngineError> {
        let person = self.store.enroll(draft, face, voice, now).await?;
        tracing::info!(
            person_id = %person.id,
            name = %person.name,
            department = %person.department,
            has_voice = person.has_voice,
            "person enrolled"
        );
        Ok(person)
    }

    /// Replace a person's stored templates (re-enrollment).
    pub async fn update_templates(
        &self,
        person_id: &str,
        face: Option<Embedding>,
        voice: Option<Embedding>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if face.is_none() && voice.is_none() {
            return Err(EngineError::InsufficientInput);
        }
        self.store.update_templates(person_id, face, voice, now).await?;
        tracing::info!(person_id, "templates updated");
        Ok(())
    }

    /// Verify a sample against the full directory; when `check_in` is
    /// set and the identity verifies, record the attendance event at
    /// the sample's timestamp.
    pub async fn verify(
        &self,
        sample: VerificationSample,
        check_in: bool,
    ) -> Result<VerificationResponse, EngineError> {
        if sample.is_empty() {
            return Err(EngineError::InsufficientInput);
        }

        let gallery = self.store.gallery(false).await?;
        let resolution = self
            .resolve_sample(&sample, gallery, self.threshold)
            .await?;

        let result = match resolution {
            Resolution::Match(result) => result,
            Resolution::MatcherUnavailable => {
                return Ok(unavailable_response(&sample));
            }
        };

        let mut response = VerificationResponse {
            verified: result.verified,
            person: None,
            attendance: None,
            scores: Scores {
                face: result.face_score,
                voice: result.voice_score,
                fused: result.fused_score,
            },
            single_modality: result.single_modality,
            message: reject_message(result.reason),
        };

        let Some(person_id) = result.person_id else {
            return Ok(response);
        };
        let person = self
            .store
            .person(&person_id)
            .await?
            .ok_or_else(|| StoreError::PersonNotFound(person_id.clone()))?;

        if check_in {
            let transition = self
                .store
                .apply_attendance(&person.id, &person.department, sample.taken_at, self.day_rules)
                .await?;
            response.attendance = Some(outcome(transition));
        }
        response.person = Some(PersonSummary::from(&person));
        Ok(response)
    }

    /// Face-only verification against the admin-flagged subset of the
    /// directory.
    pub async fn admin_login(
        &self,
        face: Embedding,
        now: DateTime<Utc>,
    ) -> Result<AdminLoginResponse, EngineError> {
        let sample = VerificationSample {
            face: Some(face),
            voice: None,
            taken_at: now,
        };
        let gallery = self.store.gallery(true).await?;
        let resolution = self
            .resolve_sample(&sample, gallery, self.admin_threshold)
            .await?;

        let result = match resolution {
            Resolution::Match(result) => result,
            Resolution::MatcherUnavailable => {
                return Ok(AdminLoginResponse {
                    success: false,
                    admin: None,
                    scores: Scores { face: None, voice: None, fused: 0.0 },
                    message: Some("matcher unavailable".to_string()),
                });
            }
        };

        let admin = match &result.person_id {
            Some(id) => self.store.person(id).await?.as_ref().map(PersonSummary::from),
            None => None,
        };
        tracing::info!(success = result.verified, fused = result.fused_score, "admin login");
        Ok(AdminLoginResponse {
            success: result.verified,
            admin,
            scores: Scores {
                face: result.face_score,
                voice: result.voice_score,
                fused: result.fused_score,
            },
            message: reject_message(result.reason),
        })
    }

    pub async fn list(&self, filter: DirectoryFilter) -> Result<Vec<Person>, EngineError> {
        Ok(self.store.list(filter).await?)
    }

    pub async fn person(&self, id: &str) -> Result<Person, EngineError> {
        Ok(self
            .store
            .person(id)
            .await?
            .ok_or_else(|| StoreError::PersonNotFound(id.to_string()))?)
    }

    pub async fn deactivate(&self, id: &str) -> Result<(), EngineError> {
        self.store.deactivate(id).await?;
        tracing::info!(person_id = id, "person deactivated");
        Ok(())
    }

    pub async fn overview(&self, now: DateTime<Utc>) -> Result<DailyOverview, EngineError> {
        let day = self.day_rules.day_key(now);
        let total_active = self.store.count_active().await?;
        let records = self.store.records_for_day(day).await?;
        Ok(analytics::overview(day, total_active, &records))
    }

    pub async fn person_analytics(
        &self,
        person_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PersonAnalytics, EngineError> {
        let person = self.person(person_id).await?;
        let history = self
            .store
            .history(Some(person_id.to_string()), None, None)
            .await?;
        let stats = analytics::person_stats(
            &history,
            self.day_rules.day_key(person.enrolled_at),
            self.day_rules.day_key(now),
            self.exclude_weekends,
        );
        Ok(PersonAnalytics { stats, history })
    }

    pub async fn today(&self, now: DateTime<Utc>) -> Result<Vec<AttendanceView>, EngineError> {
        Ok(self.store.day_view(self.day_rules.day_key(now)).await?)
    }

    pub async fn history(
        &self,
        person_id: Option<String>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceRecord>, EngineError> {
        Ok(self.store.history(person_id, start, end).await?)
    }

    pub async fn count_active(&self) -> Result<u64, EngineError> {
        Ok(self.store.count_active().await?)
    }

    /// Scan the supplied modalities concurrently and resolve.
    ///
    /// A modality whose scan fails (after one retry) is treated as
    /// absent; only when every supplied modality fails does the whole
    /// request degrade to `MatcherUnavailable`.
    async fn resolve_sample(
        &self,
        sample: &VerificationSample,
        gallery: Vec<GalleryEntry>,
        threshold: f64,
    ) -> Result<Resolution, EngineError> {
        let face_refs: Vec<(String, Embedding)> = gallery
            .iter()
            .filter_map(|e| e.face.clone().map(|t| (e.person_id.clone(), t)))
            .collect();
        let voice_refs: Vec<(String, Embedding)> = gallery
            .iter()
            .filter_map(|e| e.voice.clone().map(|t| (e.person_id.clone(), t)))
            .collect();

        let face_scan = self.scan_if_requested(Modality::Face, sample.face.as_ref(), face_refs);
        let voice_scan = self.scan_if_requested(Modality::Voice, sample.voice.as_ref(), voice_refs);
        let (face_scores, voice_scores) = tokio::join!(face_scan, voice_scan);

        let face_failed = sample.face.is_some() && face_scores.is_none();
        let voice_failed = sample.voice.is_some() && voice_scores.is_none();
        let face_scores = face_scores.unwrap_or_default();
        let voice_scores = voice_scores.unwrap_or_default();

        if face_failed && (sample.voice.is_none() || voice_failed) {
            return Ok(Resolution::MatcherUnavailable);
        }
        if voice_failed && sample.face.is_none() {
            return Ok(Resolution::MatcherUnavailable);
        }

        let candidates: Vec<Candidate> = gallery
            .iter()
            .map(|entry| Candidate {
                person_id: entry.person_id.clone(),
                face: face_scores.get(&entry.person_id).copied(),
                voice: voice_scores.get(&entry.person_id).copied(),
            })
            .collect();

        let config = ResolverConfig {
            threshold,
            weights: self.weights,
        };
        Ok(Resolution::Match(resolver::resolve(&candidates, &config)))
    }

    /// Scan one modality if the sample supplies it. `None` means the
    /// scan failed twice (or timed out twice); an empty map means the
    /// modality was not requested or had no references.
    async fn scan_if_requested(
        &self,
        modality: Modality,
        probe: Option<&Embedding>,
        refs: Vec<(String, Embedding)>,
    ) -> Option<HashMap<String, f64>> {
        let probe = probe?;
        if refs.is_empty() {
            return Some(HashMap::new());
        }

        let matcher = match modality {
            Modality::Face => Arc::clone(&self.face_matcher),
            Modality::Voice => Arc::clone(&self.voice_matcher),
        };

        // Transient failures get exactly one local retry before the
        // modality degrades to absent.
        for attempt in 1..=2u8 {
            match scan_once(
                Arc::clone(&matcher),
                probe.clone(),
                refs.clone(),
                self.matcher_timeout,
            )
            .await
            {
                Ok(scores) => return Some(scores),
                Err(reason) => {
                    tracing::warn!(%modality, attempt, %reason, "modality scan failed");
                }
            }
        }
        None
    }
}

enum Resolution {
    Match(MatchResult),
    MatcherUnavailable,
}

/// Run one gallery scan on the blocking pool under a timeout.
async fn scan_once(
    matcher: Arc<dyn ModalityMatcher>,
    probe: Embedding,
    refs: Vec<(String, Embedding)>,
    timeout: Duration,
) -> Result<HashMap<String, f64>, String> {
    let handle = tokio::task::spawn_blocking(move || {
        let mut scores = HashMap::with_capacity(refs.len());
        for (person_id, reference) in &refs {
            let score = matcher.score(&probe, reference)?;
            scores.insert(person_id.clone(), score.clamp(0.0, 1.0));
        }
        Ok::<_, presence_core::MatcherError>(scores)
    });

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(Ok(scores))) => Ok(scores),
        Ok(Ok(Err(err))) => Err(err.to_string()),
        Ok(Err(join)) => Err(format!("scan task panicked: {join}")),
        Err(_) => Err("scan timed out".to_string()),
    }
}

fn outcome(transition: Transition) -> AttendanceOutcome {
    match transition {
        Transition::CheckedIn(record) => AttendanceOutcome {
            action: "checked_in",
            record: Some(record),
        },
        Transition::CheckedOut(record) => AttendanceOutcome {
            action: "checked_out",
            record: Some(record),
        },
        Transition::Duplicate => AttendanceOutcome {
            action: "duplicate",
            record: None,
        },
        Transition::AlreadyCompleted => AttendanceOutcome {
            action: "already_completed",
            record: None,
        },
    }
}

fn reject_message(reason: Option<RejectReason>) -> Option<String> {
    match reason {
        Some(RejectReason::NoMatchAboveThreshold) => Some("no matching person found".to_string()),
        Some(RejectReason::EmptyDirectory) => Some("no eligible persons enrolled".to_string()),
        None => None,
    }
}

fn unavailable_response(sample: &VerificationSample) -> VerificationResponse {
    VerificationResponse {
        verified: false,
        person: None,
        attendance: None,
        scores: Scores {
            face: None,
            voice: None,
            fused: 0.0,
        },
        single_modality: sample.face.is_some() != sample.voice.is_some(),
        message: Some("matcher unavailable".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use presence_core::matcher::MatcherError;
    use presence_core::AttendanceStatus;
    use presence_core::CheckoutPolicy;

    /// Test matcher: the score is the reference template's first
    /// component, rounded to four decimals so assertions are exact.
    struct ScriptedMatcher;

    impl ModalityMatcher for ScriptedMatcher {
        fn score(&self, _probe: &Embedding, reference: &Embedding) -> Result<f64, MatcherError> {
            let raw = f64::from(reference.values[0]);
            Ok((raw * 10_000.0).round() / 10_000.0)
        }
    }

    struct FailingMatcher;

    impl ModalityMatcher for FailingMatcher {
        fn score(&self, _probe: &Embedding, _reference: &Embedding) -> Result<f64, MatcherError> {
            Err(MatcherError::Unavailable("backend down".to_string()))
        }
    }

    fn config() -> Config {
        Config::default()
    }

    async fn engine_with(config: &Config) -> Engine {
        let store = Store::open_in_memory().await.unwrap();
        Engine::with_matchers(store, config, Arc::new(ScriptedMatcher), Arc::new(ScriptedMatcher))
            .unwrap()
    }

    fn draft(name: &str, employee_id: Option<&str>, department: &str) -> PersonDraft {
        PersonDraft {
            name: name.to_string(),
            employee_id: employee_id.map(str::to_string),
            department: Some(department.to_string()),
            ..PersonDraft::default()
        }
    }

    fn emb(score: f32) -> Embedding {
        Embedding::new(vec![score])
    }

    fn probe() -> Embedding {
        Embedding::new(vec![0.0])
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 25, h, m, 0).unwrap()
    }

    fn sample(face: Option<Embedding>, voice: Option<Embedding>, taken_at: DateTime<Utc>) -> VerificationSample {
        VerificationSample { face, voice, taken_at }
    }

    #[tokio::test]
    async fn scenario_a_face_only_verifies_single_modality() {
        let engine = engine_with(&config()).await;
        engine
            .enroll(draft("Alice", Some("E1"), "Engineering"), Some(emb(0.92)), None, at(8, 0))
            .await
            .unwrap();

        let response = engine
            .verify(sample(Some(probe()), None, at(9, 0)), true)
            .await
            .unwrap();
        assert!(response.verified);
        assert!(response.single_modality);
        assert_eq!(response.scores.fused, 0.92);
        assert_eq!(response.scores.face, Some(0.92));
        assert_eq!(response.scores.voice, None);
        assert_eq!(response.person.as_ref().unwrap().name, "Alice");

        let attendance = response.attendance.unwrap();
        assert_eq!(attendance.action, "checked_in");
        assert_eq!(attendance.record.unwrap().status, AttendanceStatus::OnTime);
    }

    #[tokio::test]
    async fn scenario_b_weighted_fusion_verifies_at_boundary() {
        let engine = engine_with(&config()).await;
        engine
            .enroll(draft("Decoy", None, "Sales"), Some(emb(0.20)), Some(emb(0.10)), at(8, 0))
            .await
            .unwrap();
        engine
            .enroll(draft("Bob", Some("E2"), "Engineering"), Some(emb(0.70)), Some(emb(0.95)), at(8, 0))
            .await
            .unwrap();

        let response = engine
            .verify(sample(Some(probe()), Some(probe()), at(9, 0)), false)
            .await
            .unwrap();
        // 0.70 * 0.6 + 0.95 * 0.4 = 0.80, exactly the default threshold.
        assert!(response.verified);
        assert_eq!(response.scores.fused, 0.80);
        assert!(!response.single_modality);
        assert_eq!(response.person.as_ref().unwrap().name, "Bob");
        // Plain verify never touches attendance.
        assert!(response.attendance.is_none());
    }

    #[tokio::test]
    async fn scenario_c_repeat_checkins_one_record() {
        let engine = engine_with(&config()).await;
        engine
            .enroll(draft("Bob", None, "Engineering"), Some(emb(0.9)), None, at(8, 0))
            .await
            .unwrap();

        let first = engine
            .verify(sample(Some(probe()), None, at(9, 0)), true)
            .await
            .unwrap();
        assert_eq!(first.attendance.as_ref().unwrap().action, "checked_in");

        let second = engine
            .verify(sample(Some(probe()), None, at(17, 0)), true)
            .await
            .unwrap();
        assert_eq!(second.attendance.as_ref().unwrap().action, "checked_out");

        let third = engine
            .verify(sample(Some(probe()), None, at(18, 0)), true)
            .await
            .unwrap();
        assert_eq!(third.attendance.as_ref().unwrap().action, "already_completed");

        let today = engine.today(at(19, 0)).await.unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].person_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn idempotent_ignore_policy_reports_duplicates() {
        let mut cfg = config();
        cfg.checkout_policy = CheckoutPolicy::IdempotentIgnore;
        let engine = engine_with(&cfg).await;
        engine
            .enroll(draft("Bob", None, "Engineering"), Some(emb(0.9)), None, at(8, 0))
            .await
            .unwrap();

        engine.verify(sample(Some(probe()), None, at(9, 0)), true).await.unwrap();
        let second = engine
            .verify(sample(Some(probe()), None, at(17, 0)), true)
            .await
            .unwrap();
        assert_eq!(second.attendance.as_ref().unwrap().action, "duplicate");

        let today = engine.today(at(19, 0)).await.unwrap();
        assert_eq!(today.len(), 1);
        assert!(today[0].check_out.is_none());
    }

    #[tokio::test]
    async fn below_threshold_reports_scores_without_identity() {
        let engine = engine_with(&config()).await;
        engine
            .enroll(draft("Alice", None, "Engineering"), Some(emb(0.70)), None, at(8, 0))
            .await
            .unwrap();

        let response = engine
            .verify(sample(Some(probe()), None, at(9, 0)), true)
            .await
            .unwrap();
        assert!(!response.verified);
        assert!(response.person.is_none());
        assert!(response.attendance.is_none());
        assert_eq!(response.scores.fused, 0.70);
        assert_eq!(response.message.as_deref(), Some("no matching person found"));
    }

    #[tokio::test]
    async fn empty_directory_is_reported_not_raised() {
        let engine = engine_with(&config()).await;
        let response = engine
            .verify(sample(Some(probe()), None, at(9, 0)), true)
            .await
            .unwrap();
        assert!(!response.verified);
        assert_eq!(response.message.as_deref(), Some("no eligible persons enrolled"));
    }

    #[tokio::test]
    async fn empty_sample_is_insufficient_input() {
        let engine = engine_with(&config()).await;
        let err = engine
            .verify(sample(None, None, at(9, 0)), true)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientInput));
    }

    #[tokio::test]
    async fn one_degraded_modality_falls_back_to_single() {
        let cfg = config();
        let store = Store::open_in_memory().await.unwrap();
        let engine = Engine::with_matchers(
            store,
            &cfg,
            Arc::new(ScriptedMatcher),
            Arc::new(FailingMatcher),
        )
        .unwrap();
        engine
            .enroll(draft("Alice", None, "Engineering"), Some(emb(0.92)), Some(emb(0.9)), at(8, 0))
            .await
            .unwrap();

        let response = engine
            .verify(sample(Some(probe()), Some(probe()), at(9, 0)), false)
            .await
            .unwrap();
        assert!(response.verified);
        assert!(response.single_modality);
        assert_eq!(response.scores.voice, None);
        assert_eq!(response.scores.fused, 0.92);
    }

    #[tokio::test]
    async fn all_modalities_failing_is_matcher_unavailable() {
        let cfg = config();
        let store = Store::open_in_memory().await.unwrap();
        let engine = Engine::with_matchers(
            store,
            &cfg,
            Arc::new(FailingMatcher),
            Arc::new(FailingMatcher),
        )
        .unwrap();
        engine
            .enroll(draft("Alice", None, "Engineering"), Some(emb(0.92)), None, at(8, 0))
            .await
            .unwrap();

        let response = engine
            .verify(sample(Some(probe()), None, at(9, 0)), true)
            .await
            .unwrap();
        assert!(!response.verified);
        assert_eq!(response.message.as_deref(), Some("matcher unavailable"));
        assert!(response.attendance.is_none());
    }

    #[tokio::test]
    async fn admin_login_restricted_to_admin_subset() {
        let engine = engine_with(&config()).await;
        // A regular person whose template would score 0.95 must not
        // grant admin access.
        engine
            .enroll(draft("Mallory", None, "Engineering"), Some(emb(0.95)), None, at(8, 0))
            .await
            .unwrap();

        let login = engine.admin_login(probe(), at(9, 0)).await.unwrap();
        assert!(!login.success);
        assert!(login.admin.is_none());

        let mut admin_draft = draft("Root", None, "IT");
        admin_draft.is_admin = true;
        engine
            .enroll(admin_draft, Some(emb(0.90)), None, at(8, 0))
            .await
            .unwrap();

        let login = engine.admin_login(probe(), at(9, 0)).await.unwrap();
        assert!(login.success);
        assert_eq!(login.admin.as_ref().unwrap().name, "Root");
        assert_eq!(login.scores.fused, 0.90);
    }

    #[tokio::test]
    async fn overview_matches_recorded_attendance() {
        let engine = engine_with(&config()).await;
        engine
            .enroll(draft("Alice", None, "Engineering"), Some(emb(0.9)), None, at(8, 0))
            .await
            .unwrap();
        // Second active person who never checks in today.
        let bob = engine
            .enroll(draft("Bob", None, "Sales"), Some(emb(0.1)), None, at(8, 0))
            .await
            .unwrap();

        engine.verify(sample(Some(probe()), None, at(9, 30)), true).await.unwrap();

        let overview = engine.overview(at(12, 0)).await.unwrap();
        assert_eq!(overview.total_persons, 2);
        assert_eq!(overview.present_today, 1);
        assert_eq!(overview.late_today, 1);
        assert_eq!(overview.attendance_rate, 0.5);

        // Deactivation shrinks the denominator but keeps history.
        engine.deactivate(&bob.id).await.unwrap();
        let overview = engine.overview(at(13, 0)).await.unwrap();
        assert_eq!(overview.total_persons, 1);
        assert_eq!(overview.attendance_rate, 1.0);
    }

    #[tokio::test]
    async fn person_analytics_returns_stats_and_history() {
        let engine = engine_with(&config()).await;
        let alice = engine
            .enroll(draft("Alice", None, "Engineering"), Some(emb(0.9)), None, at(8, 0))
            .await
            .unwrap();

        // On time on the 25th (Tuesday), late on the 26th.
        engine.verify(sample(Some(probe()), None, at(9, 0)), true).await.unwrap();
        let wednesday = Utc.with_ymd_and_hms(2026, 8, 26, 10, 0, 0).unwrap();
        engine
            .verify(sample(Some(probe()), None, wednesday), true)
            .await
            .unwrap();

        let analytics = engine.person_analytics(&alice.id, wednesday).await.unwrap();
        assert_eq!(analytics.stats.total_days_present, 2);
        assert_eq!(analytics.stats.on_time_count, 1);
        assert_eq!(analytics.stats.late_count, 1);
        // Two working days since enrollment, both present.
        assert_eq!(analytics.stats.attendance_percentage, 100.0);
        assert_eq!(analytics.history.len(), 2);
        assert!(analytics.history[0].day > analytics.history[1].day);
    }

    #[tokio::test]
    async fn unknown_person_analytics_is_not_found() {
        let engine = engine_with(&config()).await;
        let err = engine.person_analytics("nope", at(9, 0)).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::PersonNotFound(_))));
    }
}
