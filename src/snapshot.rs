//! Same-day present/absent/leave tally for the attendance dashboards.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{AttendanceRecord, DaySnapshot, Mark};

/// What the snapshot's `total` counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TotalScope {
    /// Students with any record on the day.
    ActiveToday,
    /// Every distinct student in the loaded records.
    #[default]
    FullRoster,
}

impl std::str::FromStr for TotalScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active-today" | "activeToday" => Ok(TotalScope::ActiveToday),
            "full-roster" | "fullRoster" => Ok(TotalScope::FullRoster),
            other => Err(format!(
                "unknown total scope {other:?} (expected active-today or full-roster)"
            )),
        }
    }
}

/// A student with several records on `date` is counted once, by the first record.
pub fn snapshot_for_date(
    records: &[AttendanceRecord],
    date: NaiveDate,
    scope: TotalScope,
) -> DaySnapshot {
    let mut first_mark: HashMap<&str, Mark> = HashMap::new();
    let mut roster: HashSet<&str> = HashSet::new();

    for record in records {
        roster.insert(record.student_id.as_str());
        if record.class_date == date {
            first_mark
                .entry(record.student_id.as_str())
                .or_insert(record.mark);
        }
    }

    let mut snapshot = DaySnapshot::default();
    for mark in first_mark.values() {
        match mark {
            Mark::Present => snapshot.present += 1,
            Mark::Absent => snapshot.absent += 1,
            Mark::Leave => snapshot.leave += 1,
        }
    }
    snapshot.total = match scope {
        TotalScope::ActiveToday => first_mark.len(),
        TotalScope::FullRoster => roster.len(),
    };
    snapshot
}

/// Mark a student received on `date`, `None` when nothing was recorded.
pub fn mark_on(
    records: &[AttendanceRecord],
    student_id: &str,
    class_id: &str,
    section: &str,
    date: NaiveDate,
) -> Option<Mark> {
    records
        .iter()
        .find(|record| {
            record.student_id == student_id
                && record.class_id == class_id
                && record.section == section
                && record.class_date == date
        })
        .map(|record| record.mark)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn record(student_id: &str, class_date: &str, mark: Mark) -> AttendanceRecord {
        AttendanceRecord {
            student_id: student_id.to_string(),
            student_name: format!("Student {student_id}"),
            class_id: "5".to_string(),
            section: "A".to_string(),
            class_date: day(class_date),
            mark,
            session_id: "2024-25".to_string(),
            marked_by: "SYSTEM".to_string(),
            teacher_name: None,
        }
    }

    fn sample() -> Vec<AttendanceRecord> {
        vec![
            record("S1", "2024-03-01", Mark::Present),
            record("S2", "2024-03-01", Mark::Absent),
            record("S3", "2024-03-01", Mark::Leave),
            record("S4", "2024-02-28", Mark::Present),
            record("S1", "2024-03-01", Mark::Absent),
        ]
    }

    #[test]
    fn full_roster_counts_every_student() {
        let snapshot = snapshot_for_date(&sample(), day("2024-03-01"), TotalScope::FullRoster);
        assert_eq!(
            snapshot,
            DaySnapshot {
                present: 1,
                absent: 1,
                leave: 1,
                total: 4
            }
        );
    }

    #[test]
    fn active_today_counts_students_marked_that_day() {
        let snapshot = snapshot_for_date(&sample(), day("2024-03-01"), TotalScope::ActiveToday);
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.present, 1);
    }

    #[test]
    fn day_without_marks_keeps_roster_total() {
        let snapshot = snapshot_for_date(&sample(), day("2024-03-05"), TotalScope::FullRoster);
        assert!(!snapshot.has_marks());
        assert_eq!(snapshot.total, 4);
        let active = snapshot_for_date(&sample(), day("2024-03-05"), TotalScope::ActiveToday);
        assert_eq!(active.total, 0);
    }

    #[test]
    fn mark_lookup_matches_on_class_and_date() {
        let records = sample();
        assert_eq!(
            mark_on(&records, "S2", "5", "A", day("2024-03-01")),
            Some(Mark::Absent)
        );
        assert_eq!(mark_on(&records, "S2", "5", "B", day("2024-03-01")), None);
        assert_eq!(mark_on(&records, "S4", "5", "A", day("2024-03-01")), None);
    }

    #[test]
    fn scope_names_parse() {
        assert_eq!("active-today".parse::<TotalScope>(), Ok(TotalScope::ActiveToday));
        assert_eq!("fullRoster".parse::<TotalScope>(), Ok(TotalScope::FullRoster));
        assert!("everyone".parse::<TotalScope>().is_err());
    }
}
