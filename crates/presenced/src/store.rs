//! SQLite-backed directory and attendance store.
//!
//! Owns Person rows (with their modality templates as opaque BLOBs) and
//! AttendanceRecord rows. Attendance transitions run read-decide-write
//! inside one immediate transaction so the one-record-per-(person, day)
//! invariant holds under concurrent check-ins.

use chrono::{DateTime, NaiveDate, Utc};
use presence_core::attendance::{self, AttendanceRecord, AttendanceStatus, DayRules, Transition};
use presence_core::types::Embedding;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("{0}")]
    Validation(String),
    #[error("employee id {0:?} already enrolled")]
    DuplicateEmployeeId(String),
    #[error("person not found: {0}")]
    PersonNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonStatus {
    Active,
    Inactive,
}

impl PersonStatus {
    fn parse(raw: &str) -> rusqlite::Result<Self> {
        match raw {
            "active" => Ok(PersonStatus::Active),
            "inactive" => Ok(PersonStatus::Inactive),
            other => Err(text_conversion_error(format!("bad person status {other:?}"))),
        }
    }
}

/// Identity record. Templates are never serialized out of the store;
/// the presentation layer only sees which modalities are enrolled.
#[derive(Debug, Clone, Serialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub employee_id: Option<String>,
    pub department: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: PersonStatus,
    pub is_admin: bool,
    pub enrolled_at: DateTime<Utc>,
    pub has_face: bool,
    pub has_voice: bool,
}

/// Enrollment input fields, before the store assigns an id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonDraft {
    pub name: String,
    pub employee_id: Option<String>,
    pub department: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Templates of one active person, loaded for a directory scan.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub person_id: String,
    pub face: Option<Embedding>,
    pub voice: Option<Embedding>,
}

/// Listing filter: substring search and department equality are
/// AND-combined when both are present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryFilter {
    pub department: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// Attendance row joined with the person's current display name.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceView {
    pub person_id: String,
    pub person_name: Option<String>,
    pub day: NaiveDate,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub department: String,
}

const PERSON_COLUMNS: &str = "id, name, employee_id, department, date_of_birth, gender, email, \
     phone, status, is_admin, enrolled_at, face_template IS NOT NULL, voice_template IS NOT NULL";

#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Validation(format!("cannot create data dir: {e}")))?;
        }
        let conn = Connection::open(path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS persons (
                        id TEXT PRIMARY KEY,
                        name TEXT NOT NULL,
                        employee_id TEXT,
                        department TEXT NOT NULL,
                        date_of_birth TEXT,
                        gender TEXT,
                        email TEXT,
                        phone TEXT,
                        status TEXT NOT NULL DEFAULT 'active',
                        is_admin INTEGER NOT NULL DEFAULT 0,
                        enrolled_at TEXT NOT NULL,
                        face_template BLOB,
                        face_enrolled_at TEXT,
                        voice_template BLOB,
                        voice_enrolled_at TEXT
                    );
                    CREATE UNIQUE INDEX IF NOT EXISTS idx_persons_active_employee_id
                        ON persons(employee_id)
                        WHERE employee_id IS NOT NULL AND status = 'active';
                    CREATE INDEX IF NOT EXISTS idx_persons_department
                        ON persons(department);
                    CREATE TABLE IF NOT EXISTS attendance (
                        person_id TEXT NOT NULL,
                        day TEXT NOT NULL,
                        check_in TEXT NOT NULL,
                        check_out TEXT,
                        status TEXT NOT NULL,
                        department TEXT NOT NULL,
                        PRIMARY KEY (person_id, day)
                    );
                    CREATE INDEX IF NOT EXISTS idx_attendance_day ON attendance(day);",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Enroll a new person. Name and a face template are required; an
    /// employee id must be unused among active persons.
    pub async fn enroll(
        &self,
        draft: PersonDraft,
        face: Option<Embedding>,
        voice: Option<Embedding>,
        now: DateTime<Utc>,
    ) -> Result<Person, StoreError> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::Validation("name is required".into()));
        }
        let Some(face) = face else {
            return Err(StoreError::Validation("face template is required".into()));
        };

        let id = uuid::Uuid::new_v4().to_string();
        self.conn
            .call(move |conn| Ok(enroll_inner(conn, id, name, draft, face, voice, now)))
            .await?
    }

    /// Replace a person's templates (re-enrollment).
    pub async fn update_templates(
        &self,
        person_id: &str,
        face: Option<Embedding>,
        voice: Option<Embedding>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let person_id = person_id.to_string();
        self.conn
            .call(move |conn| {
                Ok((|| {
                    let mut changed = 0;
                    if let Some(face) = &face {
                        changed += conn.execute(
                            "UPDATE persons SET face_template = ?1, face_enrolled_at = ?2 WHERE id = ?3",
                            params![encode_embedding(face), now.to_rfc3339(), person_id],
                        )?;
                    }
                    if let Some(voice) = &voice {
                        changed += conn.execute(
                            "UPDATE persons SET voice_template = ?1, voice_enrolled_at = ?2 WHERE id = ?3",
                            params![encode_embedding(voice), now.to_rfc3339(), person_id],
                        )?;
                    }
                    if (face.is_some() || voice.is_some()) && changed == 0 {
                        return Err(StoreError::PersonNotFound(person_id.clone()));
                    }
                    Ok(())
                })())
            })
            .await?
    }

    pub async fn person(&self, id: &str) -> Result<Option<Person>, StoreError> {
        let id = id.to_string();
        let person = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {PERSON_COLUMNS} FROM persons WHERE id = ?1");
                Ok(conn
                    .query_row(&sql, [id], person_from_row)
                    .optional()?)
            })
            .await?;
        Ok(person)
    }

    /// List persons: case-insensitive substring over name/employee id,
    /// AND-combined with department equality.
    pub async fn list(&self, filter: DirectoryFilter) -> Result<Vec<Person>, StoreError> {
        let persons = self
            .conn
            .call(move |conn| {
                let mut sql = format!("SELECT {PERSON_COLUMNS} FROM persons WHERE 1=1");
                let mut args: Vec<String> = Vec::new();
                if !filter.include_inactive {
                    sql.push_str(" AND status = 'active'");
                }
                if let Some(department) = &filter.department {
                    args.push(department.clone());
                    sql.push_str(&format!(" AND department = ?{}", args.len()));
                }
                if let Some(search) = &filter.search {
                    args.push(format!("%{}%", search.to_lowercase()));
                    let n = args.len();
                    sql.push_str(&format!(
                        " AND (LOWER(name) LIKE ?{n} OR LOWER(COALESCE(employee_id, '')) LIKE ?{n})"
                    ));
                }
                sql.push_str(" ORDER BY name, id");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(args), person_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        Ok(persons)
    }

    /// Soft-deactivate; attendance history is untouched.
    pub async fn deactivate(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                Ok((|| {
                    let changed = conn.execute(
                        "UPDATE persons SET status = 'inactive' WHERE id = ?1",
                        [&id],
                    )?;
                    if changed == 0 {
                        return Err(StoreError::PersonNotFound(id.clone()));
                    }
                    Ok(())
                })())
            })
            .await?
    }

    /// Templates of all active persons with at least one modality
    /// enrolled, ordered by id for deterministic scans.
    pub async fn gallery(&self, admin_only: bool) -> Result<Vec<GalleryEntry>, StoreError> {
        let entries = self
            .conn
            .call(move |conn| {
                let mut sql = String::from(
                    "SELECT id, face_template, voice_template FROM persons
                     WHERE status = 'active'
                       AND (face_template IS NOT NULL OR voice_template IS NOT NULL)",
                );
                if admin_only {
                    sql.push_str(" AND is_admin = 1");
                }
                sql.push_str(" ORDER BY id");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| {
                    let face: Option<Vec<u8>> = row.get(1)?;
                    let voice: Option<Vec<u8>> = row.get(2)?;
                    Ok(GalleryEntry {
                        person_id: row.get(0)?,
                        face: face.as_deref().map(decode_embedding),
                        voice: voice.as_deref().map(decode_embedding),
                    })
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        Ok(entries)
    }

    pub async fn count_active(&self) -> Result<u64, StoreError> {
        let count = self
            .conn
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM persons WHERE status = 'active'",
                    [],
                    |row| row.get::<_, i64>(0),
                )?)
            })
            .await?;
        Ok(count as u64)
    }

    /// Feed one verified event into the attendance state machine,
    /// atomically for the (person, day) key. A conflicting insert is
    /// retried once with the latest read, never silently dropped.
    pub async fn apply_attendance(
        &self,
        person_id: &str,
        department: &str,
        at: DateTime<Utc>,
        rules: DayRules,
    ) -> Result<Transition, StoreError> {
        let person_id = person_id.to_string();
        let department = department.to_string();
        self.conn
            .call(move |conn| Ok(apply_attendance_inner(conn, &person_id, &department, at, &rules)))
            .await?
    }

    pub async fn records_for_day(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT person_id, day, check_in, check_out, status, department
                     FROM attendance WHERE day = ?1 ORDER BY check_in",
                )?;
                let rows = stmt.query_map([day_to_str(day)], record_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        Ok(records)
    }

    /// Today's attendance joined with current person names for display.
    pub async fn day_view(&self, day: NaiveDate) -> Result<Vec<AttendanceView>, StoreError> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT a.person_id, p.name, a.day, a.check_in, a.check_out, a.status, a.department
                     FROM attendance a LEFT JOIN persons p ON p.id = a.person_id
                     WHERE a.day = ?1 ORDER BY a.check_in",
                )?;
                let rows = stmt.query_map([day_to_str(day)], |row| {
                    Ok(AttendanceView {
                        person_id: row.get(0)?,
                        person_name: row.get(1)?,
                        day: parse_day(&row.get::<_, String>(2)?)?,
                        check_in: parse_utc(&row.get::<_, String>(3)?)?,
                        check_out: row
                            .get::<_, Option<String>>(4)?
                            .map(|s| parse_utc(&s))
                            .transpose()?,
                        status: parse_status(&row.get::<_, String>(5)?)?,
                        department: row.get(6)?,
                    })
                })?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        Ok(rows)
    }

    /// Attendance history, most recent first, optionally scoped to a
    /// person and/or a date range.
    pub async fn history(
        &self,
        person_id: Option<String>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let records = self
            .conn
            .call(move |conn| {
                let mut sql = String::from(
                    "SELECT person_id, day, check_in, check_out, status, department
                     FROM attendance WHERE 1=1",
                );
                let mut args: Vec<String> = Vec::new();
                if let Some(person_id) = &person_id {
                    args.push(person_id.clone());
                    sql.push_str(&format!(" AND person_id = ?{}", args.len()));
                }
                if let Some(start) = start {
                    args.push(day_to_str(start));
                    sql.push_str(&format!(" AND day >= ?{}", args.len()));
                }
                if let Some(end) = end {
                    args.push(day_to_str(end));
                    sql.push_str(&format!(" AND day <= ?{}", args.len()));
                }
                sql.push_str(" ORDER BY day DESC, check_in DESC");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(args), record_from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        Ok(records)
    }
}

fn enroll_inner(
    conn: &mut rusqlite::Connection,
    id: String,
    name: String,
    draft: PersonDraft,
    face: Embedding,
    voice: Option<Embedding>,
    now: DateTime<Utc>,
) -> Result<Person, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(employee_id) = &draft.employee_id {
        let taken: Option<String> = tx
            .query_row(
                "SELECT id FROM persons WHERE employee_id = ?1 AND status = 'active'",
                [employee_id],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(StoreError::DuplicateEmployeeId(employee_id.clone()));
        }
    }

    let department = draft.department.clone().unwrap_or_else(|| "General".to_string());
    tx.execute(
        "INSERT INTO persons (id, name, employee_id, department, date_of_birth, gender, email,
                              phone, status, is_admin, enrolled_at,
                              face_template, face_enrolled_at, voice_template, voice_enrolled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active', ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            id,
            name,
            draft.employee_id,
            department,
            draft.date_of_birth.map(day_to_str),
            draft.gender,
            draft.email,
            draft.phone,
            draft.is_admin,
            now.to_rfc3339(),
            encode_embedding(&face),
            now.to_rfc3339(),
            voice.as_ref().map(encode_embedding),
            voice.as_ref().map(|_| now.to_rfc3339()),
        ],
    )?;
    tx.commit()?;

    Ok(Person {
        id,
        name,
        employee_id: draft.employee_id,
        department,
        date_of_birth: draft.date_of_birth,
        gender: draft.gender,
        email: draft.email,
        phone: draft.phone,
        status: PersonStatus::Active,
        is_admin: draft.is_admin,
        enrolled_at: now,
        has_face: true,
        has_voice: voice.is_some(),
    })
}

fn apply_attendance_inner(
    conn: &mut rusqlite::Connection,
    person_id: &str,
    department: &str,
    at: DateTime<Utc>,
    rules: &DayRules,
) -> Result<Transition, StoreError> {
    let day = rules.day_key(at);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = tx
            .query_row(
                "SELECT person_id, day, check_in, check_out, status, department
                 FROM attendance WHERE person_id = ?1 AND day = ?2",
                params![person_id, day_to_str(day)],
                record_from_row,
            )
            .optional()?;

        let transition = attendance::apply_event(existing.as_ref(), person_id, department, at, rules);
        match &transition {
            Transition::CheckedIn(record) => {
                let inserted = tx.execute(
                    "INSERT INTO attendance (person_id, day, check_in, check_out, status, department)
                     VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
                    params![
                        record.person_id,
                        day_to_str(record.day),
                        record.check_in.to_rfc3339(),
                        status_str(record.status),
                        record.department,
                    ],
                );
                if let Err(err) = inserted {
                    if is_unique_violation(&err) && attempt == 1 {
                        // Lost a race for this (person, day); retry on
                        // the latest read.
                        drop(tx);
                        tracing::warn!(person_id, day = %day, "conflicting check-in, retrying");
                        continue;
                    }
                    return Err(err.into());
                }
            }
            Transition::CheckedOut(record) => {
                tx.execute(
                    "UPDATE attendance SET check_out = ?1 WHERE person_id = ?2 AND day = ?3",
                    params![
                        record.check_out.map(|t| t.to_rfc3339()),
                        record.person_id,
                        day_to_str(record.day),
                    ],
                )?;
            }
            Transition::Duplicate | Transition::AlreadyCompleted => {}
        }
        tx.commit()?;
        return Ok(transition);
    }
}

fn person_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get(0)?,
        name: row.get(1)?,
        employee_id: row.get(2)?,
        department: row.get(3)?,
        date_of_birth: row
            .get::<_, Option<String>>(4)?
            .map(|s| parse_day(&s))
            .transpose()?,
        gender: row.get(5)?,
        email: row.get(6)?,
        phone: row.get(7)?,
        status: PersonStatus::parse(&row.get::<_, String>(8)?)?,
        is_admin: row.get(9)?,
        enrolled_at: parse_utc(&row.get::<_, String>(10)?)?,
        has_face: row.get(11)?,
        has_voice: row.get(12)?,
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        person_id: row.get(0)?,
        day: parse_day(&row.get::<_, String>(1)?)?,
        check_in: parse_utc(&row.get::<_, String>(2)?)?,
        check_out: row
            .get::<_, Option<String>>(3)?
            .map(|s| parse_utc(&s))
            .transpose()?,
        status: parse_status(&row.get::<_, String>(4)?)?,
        department: row.get(5)?,
    })
}

/// Templates persist as little-endian f32 byte strings; the store never
/// interprets the vector contents.
fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.values.len() * 4);
    for value in &embedding.values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn decode_embedding(bytes: &[u8]) -> Embedding {
    Embedding::new(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

fn day_to_str(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn parse_day(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| text_conversion_error(format!("bad day {raw:?}: {e}")))
}

fn parse_utc(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| text_conversion_error(format!("bad timestamp {raw:?}: {e}")))
}

fn status_str(status: AttendanceStatus) -> &'static str {
    match status {
        AttendanceStatus::OnTime => "on_time",
        AttendanceStatus::Late => "late",
    }
}

fn parse_status(raw: &str) -> rusqlite::Result<AttendanceStatus> {
    match raw {
        "on_time" => Ok(AttendanceStatus::OnTime),
        "late" => Ok(AttendanceStatus::Late),
        other => Err(text_conversion_error(format!("bad attendance status {other:?}"))),
    }
}

fn text_conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
