//! Attendance and fee statistics for the school administration backend.
//!
//! Raw rows come from a [`source::RecordSource`] into a [`store::RecordStore`],
//! are narrowed by the [`filter`] functions and reduced by [`aggregate`] into
//! per-student summaries and collection totals. [`view`] ties the steps into
//! one pure recomputation.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod report;
pub mod snapshot;
pub mod source;
pub mod store;
pub mod view;

pub use error::{LedgerError, Result};
