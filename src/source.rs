use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{AttendanceRow, FeeLedgerEntry, FeePaymentRow, Scope};

/// Where raw records come from: the school backend over HTTP, or the Postgres mirror.
///
/// An empty `Vec` means the backend had nothing for a valid scope; failures to
/// reach it or to decode its answer are `LedgerError::Fetch`.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_attendance(&self, scope: &Scope) -> Result<Vec<AttendanceRow>>;

    async fn fetch_attendance_for_date(
        &self,
        scope: &Scope,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRow>>;

    async fn fetch_payments(&self, scope: &Scope) -> Result<Vec<FeePaymentRow>>;

    async fn fetch_fee_ledger(&self, scope: &Scope) -> Result<Vec<FeeLedgerEntry>>;

    /// Persists a full day's marks; each row replaces any earlier mark for that student and date.
    async fn save_attendance(&self, rows: &[AttendanceRow]) -> Result<()>;
}
