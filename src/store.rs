//! Holds the record list for the current scope selection.
//!
//! Each scope change starts a new load and drops the previous list. Loads are
//! numbered; a response carrying an older number than the newest load is
//! discarded, so a slow fetch for an abandoned selection never overwrites the
//! records of the current one.

use std::future::Future;

use chrono::NaiveDate;

use crate::error::{LedgerError, Result};
use crate::models::{
    ingest_attendance, ingest_payments, AttendanceRecord, AttendanceRow, FeePayment, Mark, Scope,
    SYSTEM_MARKER,
};
use crate::source::RecordSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    seq: u64,
    scope: Scope,
}

impl LoadTicket {
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { records: usize },
    /// A newer load started after this one; its result was dropped.
    Stale,
}

#[derive(Debug, Clone)]
pub struct RecordStore<T> {
    scope: Option<Scope>,
    records: Vec<T>,
    latest_seq: u64,
}

impl<T> Default for RecordStore<T> {
    fn default() -> Self {
        Self {
            scope: None,
            records: Vec::new(),
            latest_seq: 0,
        }
    }
}

impl<T> RecordStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Starts a load for `scope`, clearing whatever the previous scope held.
    pub fn begin(&mut self, scope: Scope) -> LoadTicket {
        self.latest_seq += 1;
        self.scope = Some(scope.clone());
        self.records.clear();
        LoadTicket {
            seq: self.latest_seq,
            scope,
        }
    }

    /// Applies a finished load unless a newer one has begun since.
    pub fn complete(&mut self, ticket: LoadTicket, result: Result<Vec<T>>) -> Result<LoadOutcome> {
        if ticket.seq != self.latest_seq {
            tracing::warn!(
                seq = ticket.seq,
                latest = self.latest_seq,
                scope = %ticket.scope,
                "dropping response for superseded load"
            );
            return Ok(LoadOutcome::Stale);
        }
        let records = result?;
        let count = records.len();
        self.records = records;
        if count == 0 {
            tracing::info!(scope = %ticket.scope, "no records for scope");
        }
        Ok(LoadOutcome::Applied { records: count })
    }

    /// Begins a load, awaits `fetch` and completes it in one call. The store is
    /// borrowed mutably across the await, so only one such load runs at a time;
    /// callers with overlapping fetches hold their own `LoadTicket` from
    /// [`RecordStore::begin`] and hand each result to [`RecordStore::complete`].
    pub async fn load_with<F, Fut>(&mut self, scope: Scope, fetch: F) -> Result<LoadOutcome>
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let ticket = self.begin(scope);
        let result = fetch(ticket.scope.clone()).await;
        self.complete(ticket, result)
    }
}

impl RecordStore<AttendanceRecord> {
    pub async fn load(&mut self, source: &dyn RecordSource, scope: Scope) -> Result<LoadOutcome> {
        self.load_with(scope, |scope| async move {
            ingest_attendance(source.fetch_attendance(&scope).await?)
        })
        .await
    }

    pub async fn load_day(
        &mut self,
        source: &dyn RecordSource,
        scope: Scope,
        date: NaiveDate,
    ) -> Result<LoadOutcome> {
        self.load_with(scope, |scope| async move {
            ingest_attendance(source.fetch_attendance_for_date(&scope, date).await?)
        })
        .await
    }

    /// Replaces the student's record for `date` with a freshly built one carrying
    /// the new mark, the loaded scope, and the marker (`SYSTEM` when unknown).
    pub fn edit_mark(
        &mut self,
        student_id: &str,
        date: NaiveDate,
        mark: Mark,
        marked_by: Option<&str>,
    ) -> Result<&AttendanceRecord> {
        let scope = self.scope.clone();
        let position = self
            .records
            .iter()
            .position(|record| record.student_id == student_id && record.class_date == date)
            .ok_or_else(|| {
                LedgerError::data("sId", student_id, format!("no attendance record on {date}"))
            })?;

        let previous = &self.records[position];
        let (session_id, class_id, section) = match &scope {
            Some(Scope {
                session_id,
                class_id: Some(class_id),
                section: Some(section),
            }) => (session_id.clone(), class_id.clone(), section.clone()),
            _ => (
                previous.session_id.clone(),
                previous.class_id.clone(),
                previous.section.clone(),
            ),
        };
        let replacement = AttendanceRecord {
            student_id: previous.student_id.clone(),
            student_name: previous.student_name.clone(),
            teacher_name: previous.teacher_name.clone(),
            session_id,
            class_id,
            section,
            class_date: date,
            mark,
            marked_by: marked_by.unwrap_or(SYSTEM_MARKER).to_string(),
        };
        tracing::debug!(student_id, %date, mark = %mark, "attendance mark edited");
        self.records[position] = replacement;
        Ok(&self.records[position])
    }

    pub async fn save(&self, source: &dyn RecordSource) -> Result<usize> {
        let rows: Vec<AttendanceRow> = self.records.iter().map(AttendanceRow::from).collect();
        source.save_attendance(&rows).await?;
        Ok(rows.len())
    }
}

impl RecordStore<FeePayment> {
    pub async fn load(&mut self, source: &dyn RecordSource, scope: Scope) -> Result<LoadOutcome> {
        self.load_with(scope, |scope| async move {
            ingest_payments(&source.fetch_payments(&scope).await?)
        })
        .await
    }
}
