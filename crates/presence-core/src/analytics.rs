//! Derived reporting projections.
//!
//! Overviews and per-person statistics are recomputed from attendance
//! history on every call; nothing here is cached or stored. Dataset
//! sizes are organizational-scale, so an O(records) scan per request is
//! the right trade.

use crate::attendance::{AttendanceRecord, AttendanceStatus};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

/// Dashboard snapshot for a single day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyOverview {
    pub total_persons: u64,
    pub present_today: u64,
    pub late_today: u64,
    /// `present_today / total_persons` as a fraction in [0, 1];
    /// 0 when there are no active persons.
    pub attendance_rate: f64,
}

/// Historical statistics for one person.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonStats {
    pub total_days_present: u64,
    pub on_time_count: u64,
    pub late_count: u64,
    /// Days present over working days since enrollment, as 0–100 with
    /// two-decimal rounding.
    pub attendance_percentage: f64,
}

/// Compute the overview for `day` from that day's records and the
/// active-person count.
pub fn overview(day: NaiveDate, total_active: u64, records: &[AttendanceRecord]) -> DailyOverview {
    let todays = records.iter().filter(|r| r.day == day);
    let mut present = 0u64;
    let mut late = 0u64;
    for record in todays {
        present += 1;
        if record.status == AttendanceStatus::Late {
            late += 1;
        }
    }

    let attendance_rate = if total_active == 0 {
        0.0
    } else {
        present as f64 / total_active as f64
    };

    DailyOverview {
        total_persons: total_active,
        present_today: present,
        late_today: late,
        attendance_rate,
    }
}

/// Count working days in `start..=end`; zero when the range is empty.
pub fn working_days(start: NaiveDate, end: NaiveDate, exclude_weekends: bool) -> u64 {
    if start > end {
        return 0;
    }
    let mut count = 0u64;
    let mut day = start;
    while day <= end {
        let weekend = matches!(day.weekday(), Weekday::Sat | Weekday::Sun);
        if !(exclude_weekends && weekend) {
            count += 1;
        }
        day = day.succ_opt().expect("date overflow");
    }
    count
}

/// Compute per-person statistics from their full attendance history.
///
/// The percentage denominator is the distinct working days from the
/// person's enrollment date through `today`.
pub fn person_stats(
    records: &[AttendanceRecord],
    enrolled: NaiveDate,
    today: NaiveDate,
    exclude_weekends: bool,
) -> PersonStats {
    let total = records.len() as u64;
    let on_time = records
        .iter()
        .filter(|r| r.status == AttendanceStatus::OnTime)
        .count() as u64;

    let denominator = working_days(enrolled, today, exclude_weekends);
    let percentage = if denominator == 0 {
        0.0
    } else {
        round2(total as f64 / denominator as f64 * 100.0)
    };

    PersonStats {
        total_days_present: total,
        on_time_count: on_time,
        late_count: total - on_time,
        attendance_percentage: percentage,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, d).unwrap()
    }

    fn record(person: &str, d: u32, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            person_id: person.to_string(),
            day: day(d),
            check_in: DateTime::<Utc>::from_timestamp(1_787_000_000, 0).unwrap(),
            check_out: None,
            status,
            department: "Engineering".to_string(),
        }
    }

    #[test]
    fn overview_counts_only_requested_day() {
        let records = vec![
            record("p1", 25, AttendanceStatus::OnTime),
            record("p2", 25, AttendanceStatus::Late),
            record("p3", 24, AttendanceStatus::OnTime),
        ];
        let ov = overview(day(25), 4, &records);
        assert_eq!(ov.present_today, 2);
        assert_eq!(ov.late_today, 1);
        assert_eq!(ov.total_persons, 4);
        assert_eq!(ov.attendance_rate, 0.5);
    }

    #[test]
    fn overview_with_no_active_persons_reports_zero_rate() {
        let ov = overview(day(25), 0, &[]);
        assert_eq!(ov.attendance_rate, 0.0);
        assert_eq!(ov.present_today, 0);
    }

    #[test]
    fn working_days_full_week() {
        // 2026-08-24 is a Monday; Mon..=Sun spans 7 calendar days.
        assert_eq!(working_days(day(24), day(30), false), 7);
        assert_eq!(working_days(day(24), day(30), true), 5);
    }

    #[test]
    fn working_days_empty_and_single() {
        assert_eq!(working_days(day(25), day(24), true), 0);
        // 2026-08-25 is a Tuesday.
        assert_eq!(working_days(day(25), day(25), true), 1);
        // 2026-08-29 is a Saturday.
        assert_eq!(working_days(day(29), day(29), true), 0);
        assert_eq!(working_days(day(29), day(29), false), 1);
    }

    #[test]
    fn person_stats_counts_and_percentage() {
        let records = vec![
            record("p1", 24, AttendanceStatus::OnTime),
            record("p1", 25, AttendanceStatus::Late),
            record("p1", 26, AttendanceStatus::OnTime),
        ];
        // Enrolled Monday the 24th, today Friday the 28th: 5 working days.
        let stats = person_stats(&records, day(24), day(28), true);
        assert_eq!(stats.total_days_present, 3);
        assert_eq!(stats.on_time_count, 2);
        assert_eq!(stats.late_count, 1);
        assert_eq!(stats.attendance_percentage, 60.0);
    }

    #[test]
    fn person_stats_empty_history() {
        let stats = person_stats(&[], day(24), day(28), true);
        assert_eq!(stats.total_days_present, 0);
        assert_eq!(stats.attendance_percentage, 0.0);
    }

    #[test]
    fn person_stats_enrolled_today() {
        let records = vec![record("p1", 25, AttendanceStatus::OnTime)];
        let stats = person_stats(&records, day(25), day(25), true);
        assert_eq!(stats.attendance_percentage, 100.0);
    }
}
