//! Attendance state machine.
//!
//! One record per (person, local calendar day) with exactly three
//! reachable states: Absent (no record), CheckedIn, CheckedOut. The
//! on-time/late classification is computed once at check-in and frozen;
//! day rollover makes a record immutable.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// On-time/late classification, frozen at check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    OnTime,
    Late,
}

/// What a second verified event on an already-open day does.
///
/// The observed client only ever issues a "check-in" action, so
/// check-out semantics are a deployment policy, not a hard rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPolicy {
    /// Second verified event fills the check-out timestamp and closes
    /// the day. Matches deployments wanting complete in/out records
    /// from a single kiosk action.
    #[default]
    FillCheckout,
    /// Second verified event is a duplicate confirmation; the record
    /// stays open all day.
    IdempotentIgnore,
}

/// One attendance entry per (person, day).
///
/// `department` is snapshotted from the person at check-in so history
/// stays accurate if the person later moves departments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub person_id: String,
    pub day: NaiveDate,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub department: String,
}

/// Process-wide calendar rules for deriving day keys and classifying
/// check-ins.
#[derive(Debug, Clone, Copy)]
pub struct DayRules {
    /// Latest local time that still counts as on-time (inclusive).
    pub late_cutoff: NaiveTime,
    /// Fixed offset used to derive local dates and times.
    pub offset: FixedOffset,
    pub checkout_policy: CheckoutPolicy,
}

impl Default for DayRules {
    fn default() -> Self {
        Self {
            late_cutoff: NaiveTime::from_hms_opt(9, 15, 0).expect("valid cutoff"),
            offset: FixedOffset::east_opt(0).expect("valid offset"),
            checkout_policy: CheckoutPolicy::default(),
        }
    }
}

impl DayRules {
    /// Local calendar date scoping one record per person per day.
    pub fn day_key(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// On-time iff the local check-in time is at or before the cutoff.
    pub fn classify(&self, at: DateTime<Utc>) -> AttendanceStatus {
        if at.with_timezone(&self.offset).time() <= self.late_cutoff {
            AttendanceStatus::OnTime
        } else {
            AttendanceStatus::Late
        }
    }
}

/// Outcome of feeding one verified event into the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Absent → CheckedIn: a new record was created.
    CheckedIn(AttendanceRecord),
    /// CheckedIn → CheckedOut: the existing record was closed.
    CheckedOut(AttendanceRecord),
    /// Duplicate confirmation under `IdempotentIgnore`; no mutation.
    Duplicate,
    /// The (person, day) pair is already CheckedOut; no mutation.
    AlreadyCompleted,
}

impl Transition {
    /// The record to persist, if this transition mutates state.
    pub fn record(&self) -> Option<&AttendanceRecord> {
        match self {
            Transition::CheckedIn(r) | Transition::CheckedOut(r) => Some(r),
            Transition::Duplicate | Transition::AlreadyCompleted => None,
        }
    }
}

/// Apply one verified check-in event for `person_id` at `at`.
///
/// `existing` is the current record for (person, day key of `at`), if
/// any. Pure: the caller owns persistence and must run read-decide-write
/// atomically per (person, day).
pub fn apply_event(
    existing: Option<&AttendanceRecord>,
    person_id: &str,
    department: &str,
    at: DateTime<Utc>,
    rules: &DayRules,
) -> Transition {
    match existing {
        None => {
            let record = AttendanceRecord {
                person_id: person_id.to_string(),
                day: rules.day_key(at),
                check_in: at,
                check_out: None,
                status: rules.classify(at),
                department: department.to_string(),
            };
            tracing::info!(
                person_id,
                day = %record.day,
                status = ?record.status,
                "attendance opened"
            );
            Transition::CheckedIn(record)
        }
        Some(record) if record.check_out.is_some() => Transition::AlreadyCompleted,
        Some(record) => match rules.checkout_policy {
            CheckoutPolicy::FillCheckout => {
                let mut closed = record.clone();
                closed.check_out = Some(at);
                tracing::info!(person_id, day = %closed.day, "attendance closed");
                Transition::CheckedOut(closed)
            }
            CheckoutPolicy::IdempotentIgnore => Transition::Duplicate,
        },
    }
}
