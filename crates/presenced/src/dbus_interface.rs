use crate::engine::{Engine, EngineError};
use crate::store::{DirectoryFilter, PersonDraft, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use presence_core::types::{Embedding, VerificationSample};
use serde::Deserialize;
use std::sync::Arc;
use zbus::interface;

/// D-Bus interface for the Presence attendance daemon.
///
/// Bus name: org.freedesktop.Presence1
/// Object path: /org/freedesktop/Presence1
///
/// Payloads are JSON strings; field casing and transport framing are a
/// presentation concern, so every method simply serializes the engine's
/// read models.
pub struct PresenceService {
    engine: Arc<Engine>,
    db_path: String,
}

/// Wire shape for a verification sample. Embeddings arrive
/// pre-extracted; `taken_at` defaults to the time of the call.
#[derive(Deserialize)]
struct SampleInput {
    face: Option<Vec<f32>>,
    voice: Option<Vec<f32>>,
    taken_at: Option<DateTime<Utc>>,
}

impl SampleInput {
    fn into_sample(self) -> VerificationSample {
        VerificationSample {
            face: self.face.map(Embedding::new),
            voice: self.voice.map(Embedding::new),
            taken_at: self.taken_at.unwrap_or_else(Utc::now),
        }
    }
}

impl PresenceService {
    pub fn new(engine: Arc<Engine>, db_path: String) -> Self {
        Self { engine, db_path }
    }
}

#[interface(name = "org.freedesktop.Presence1")]
impl PresenceService {
    /// Enroll a new person. `draft` is a JSON object of identity
    /// fields; `face`/`voice` are JSON arrays of embedding components
    /// (empty string = modality not enrolled).
    async fn enroll(&self, draft: &str, face: &str, voice: &str) -> zbus::fdo::Result<String> {
        let draft: PersonDraft = parse_json("draft", draft)?;
        let face = parse_embedding("face", face)?;
        let voice = parse_embedding("voice", voice)?;
        tracing::info!(name = %draft.name, "enroll requested");

        let person = self
            .engine
            .enroll(draft, face, voice, Utc::now())
            .await
            .map_err(to_fdo)?;
        to_json(&person)
    }

    /// Replace a person's templates; at least one modality required.
    async fn update_templates(&self, id: &str, face: &str, voice: &str) -> zbus::fdo::Result<bool> {
        let face = parse_embedding("face", face)?;
        let voice = parse_embedding("voice", voice)?;
        tracing::info!(person_id = id, "template update requested");
        self.engine
            .update_templates(id, face, voice, Utc::now())
            .await
            .map_err(to_fdo)?;
        Ok(true)
    }

    /// Verify a sample against the directory. With `check_in` set, a
    /// verified identity also records today's attendance event.
    async fn verify(&self, sample: &str, check_in: bool) -> zbus::fdo::Result<String> {
        let input: SampleInput = parse_json("sample", sample)?;
        let response = self
            .engine
            .verify(input.into_sample(), check_in)
            .await
            .map_err(to_fdo)?;
        to_json(&response)
    }

    /// Face-only authentication against admin-flagged persons.
    async fn admin_login(&self, face: &str) -> zbus::fdo::Result<String> {
        let face = parse_embedding("face", face)?
            .ok_or_else(|| zbus::fdo::Error::InvalidArgs("face embedding required".into()))?;
        let response = self
            .engine
            .admin_login(face, Utc::now())
            .await
            .map_err(to_fdo)?;
        to_json(&response)
    }

    /// List persons, filtered by department equality and/or
    /// case-insensitive substring search (empty string = no filter).
    async fn list_persons(
        &self,
        department: &str,
        search: &str,
        include_inactive: bool,
    ) -> zbus::fdo::Result<String> {
        let filter = DirectoryFilter {
            department: non_empty(department),
            search: non_empty(search),
            include_inactive,
        };
        let persons = self.engine.list(filter).await.map_err(to_fdo)?;
        to_json(&persons)
    }

    /// Person detail; templates are never exposed.
    async fn person(&self, id: &str) -> zbus::fdo::Result<String> {
        let person = self.engine.person(id).await.map_err(to_fdo)?;
        to_json(&person)
    }

    /// Soft-deactivate a person. Attendance history is retained.
    async fn deactivate(&self, id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(person_id = id, "deactivate requested");
        self.engine.deactivate(id).await.map_err(to_fdo)?;
        Ok(true)
    }

    /// Dashboard overview for today.
    async fn overview(&self) -> zbus::fdo::Result<String> {
        let overview = self.engine.overview(Utc::now()).await.map_err(to_fdo)?;
        to_json(&overview)
    }

    /// Per-person statistics and full history, most recent first.
    async fn person_analytics(&self, id: &str) -> zbus::fdo::Result<String> {
        let analytics = self
            .engine
            .person_analytics(id, Utc::now())
            .await
            .map_err(to_fdo)?;
        to_json(&analytics)
    }

    /// Today's attendance rows with person names joined in.
    async fn today(&self) -> zbus::fdo::Result<String> {
        let rows = self.engine.today(Utc::now()).await.map_err(to_fdo)?;
        to_json(&rows)
    }

    /// Attendance history; all filters optional (empty string = none),
    /// dates as YYYY-MM-DD.
    async fn history(&self, person_id: &str, start: &str, end: &str) -> zbus::fdo::Result<String> {
        let records = self
            .engine
            .history(
                non_empty(person_id),
                parse_date("start", start)?,
                parse_date("end", end)?,
            )
            .await
            .map_err(to_fdo)?;
        to_json(&records)
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let active = self.engine.count_active().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "db_path": self.db_path,
            "active_persons": active,
        })
        .to_string())
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_json<T: serde::de::DeserializeOwned>(field: &str, raw: &str) -> zbus::fdo::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid {field}: {e}")))
}

fn parse_embedding(field: &str, raw: &str) -> zbus::fdo::Result<Option<Embedding>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let values: Vec<f32> = parse_json(field, raw)?;
    Ok(Some(Embedding::new(values)))
}

fn parse_date(field: &str, raw: &str) -> zbus::fdo::Result<Option<NaiveDate>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(Some)
        .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid {field} date: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value)
        .map_err(|e| zbus::fdo::Error::Failed(format!("serialization failed: {e}")))
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::InsufficientInput => zbus::fdo::Error::InvalidArgs(err.to_string()),
        EngineError::Store(StoreError::Validation(_))
        | EngineError::Store(StoreError::DuplicateEmployeeId(_)) => {
            zbus::fdo::Error::InvalidArgs(err.to_string())
        }
        EngineError::Store(StoreError::PersonNotFound(_)) => {
            zbus::fdo::Error::UnknownObject(err.to_string())
        }
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}
