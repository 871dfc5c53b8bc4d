//! Error types shared by the record store, filters and aggregators.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Backend unreachable, non-success status, or a body that is not the expected JSON
    #[error("fetch from {endpoint} failed: {reason}")]
    Fetch { endpoint: String, reason: String },

    /// Range filter whose start lies after its end
    #[error("start date {start} cannot be after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// Range filter collapsed to one day; callers switch to the exact-date filter
    #[error("range {date} to {date} covers one day; filter by exact date instead")]
    SingleDayRange { date: NaiveDate },

    /// A record field is missing, non-numeric or outside its enum
    #[error("invalid {field} value {value:?}: {reason}")]
    Data {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl LedgerError {
    pub fn fetch(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn data(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Data {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch { .. })
    }
}
