//! Narrowing record lists by date, date range, calendar month or name search.
//!
//! Every filter takes the list it narrows by reference and returns a fresh
//! `Vec`, keeping the input order. Chaining runs the filters in the order the
//! criteria were given, always starting from the list handed in.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::models::{AttendanceRecord, AttendanceSummary, FeePayment};

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Records carrying the calendar date the date-based filters look at.
pub trait Dated {
    fn record_date(&self) -> NaiveDate;
}

/// Entities matched by the free-text search.
pub trait Searchable {
    fn display_name(&self) -> &str;

    /// `term` is already lowercased.
    fn matches_term(&self, term: &str) -> bool {
        self.display_name().to_lowercase().contains(term)
    }
}

impl Dated for AttendanceRecord {
    fn record_date(&self) -> NaiveDate {
        self.class_date
    }
}

impl Dated for FeePayment {
    fn record_date(&self) -> NaiveDate {
        self.payment_date
    }
}

impl Searchable for AttendanceRecord {
    fn display_name(&self) -> &str {
        &self.student_name
    }
}

impl Searchable for AttendanceSummary {
    fn display_name(&self) -> &str {
        &self.name
    }
}

impl Searchable for FeePayment {
    fn display_name(&self) -> &str {
        &self.student_name
    }

    fn matches_term(&self, term: &str) -> bool {
        self.student_name.to_lowercase().contains(term)
            || self
                .transaction_id
                .as_deref()
                .is_some_and(|id| id.to_lowercase().contains(term))
    }
}

/// A calendar month; the month is always within 1-12, deserialization included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMonthYear")]
pub struct MonthYear {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct RawMonthYear {
    year: i32,
    month: u32,
}

impl TryFrom<RawMonthYear> for MonthYear {
    type Error = LedgerError;

    fn try_from(raw: RawMonthYear) -> Result<Self> {
        Self::new(raw.month, raw.year)
    }
}

impl MonthYear {
    pub fn new(month: u32, year: i32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::data("month", month.to_string(), "expected 1-12"));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// 1-based calendar month.
    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Month option label such as `JAN 2024`.
    pub fn label(&self) -> String {
        format!("{} {}", MONTHS[(self.month - 1) as usize], self.year)
    }

    pub fn parse_label(label: &str) -> Result<Self> {
        let mut parts = label.split_whitespace();
        let (Some(month), Some(year), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(LedgerError::data("month", label, "expected e.g. JAN 2024"));
        };
        let month = MONTHS
            .iter()
            .position(|name| name.eq_ignore_ascii_case(month))
            .ok_or_else(|| LedgerError::data("month", label, "unknown month name"))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| LedgerError::data("month", label, "year is not a number"))?;
        Self::new(month as u32 + 1, year)
    }
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterCriteria {
    None,
    ExactDate(NaiveDate),
    DateRange { start: NaiveDate, end: NaiveDate },
    Month(MonthYear),
    Search(String),
}

impl FilterCriteria {
    /// Builds a range criterion. A one-day range is refused with
    /// `SingleDayRange` so the caller moves the user to the exact-date filter.
    pub fn date_range(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(LedgerError::InvalidRange { start, end });
        }
        if start == end {
            return Err(LedgerError::SingleDayRange { date: start });
        }
        Ok(Self::DateRange { start, end })
    }
}

pub fn filter_by_exact_date<T: Dated + Clone>(records: &[T], date: NaiveDate) -> Vec<T> {
    records
        .iter()
        .filter(|record| record.record_date() == date)
        .cloned()
        .collect()
}

/// Inclusive on both ends.
pub fn filter_by_range<T: Dated + Clone>(
    records: &[T],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<T>> {
    if start > end {
        return Err(LedgerError::InvalidRange { start, end });
    }
    Ok(records
        .iter()
        .filter(|record| {
            let date = record.record_date();
            date >= start && date <= end
        })
        .cloned()
        .collect())
}

pub fn filter_by_month<T: Dated + Clone>(records: &[T], month: MonthYear) -> Vec<T> {
    records
        .iter()
        .filter(|record| month.contains(record.record_date()))
        .cloned()
        .collect()
}

/// Case-insensitive substring match on the term as typed; only the empty term
/// keeps every record.
pub fn filter_by_search_term<T: Searchable + Clone>(records: &[T], term: &str) -> Vec<T> {
    let term = term.to_lowercase();
    if term.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|record| record.matches_term(&term))
        .cloned()
        .collect()
}

pub fn apply_criterion<T: Dated + Searchable + Clone>(
    records: &[T],
    criterion: &FilterCriteria,
) -> Result<Vec<T>> {
    Ok(match criterion {
        FilterCriteria::None => records.to_vec(),
        FilterCriteria::ExactDate(date) => filter_by_exact_date(records, *date),
        FilterCriteria::DateRange { start, end } if start == end => {
            return Err(LedgerError::SingleDayRange { date: *start });
        }
        FilterCriteria::DateRange { start, end } => filter_by_range(records, *start, *end)?,
        FilterCriteria::Month(month) => filter_by_month(records, *month),
        FilterCriteria::Search(term) => filter_by_search_term(records, term),
    })
}

/// Applies every criterion in turn, each narrowing the previous result.
pub fn apply_all<T: Dated + Searchable + Clone>(
    records: &[T],
    criteria: &[FilterCriteria],
) -> Result<Vec<T>> {
    let mut current = records.to_vec();
    for criterion in criteria {
        current = apply_criterion(&current, criterion)?;
    }
    Ok(current)
}

/// Distinct months present in the records, oldest first.
pub fn available_months<T: Dated>(records: &[T]) -> Vec<MonthYear> {
    records
        .iter()
        .map(|record| MonthYear::of(record.record_date()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
