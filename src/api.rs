//! School backend client.
//!
//! The backend exposes one PHP endpoint per screen. Every answer is a JSON
//! object with an `error` flag and the payload under a screen-specific key:
//!
//! ```json
//! { "error": false, "attData": [ { "sId": "S1", "classDate": "2024-01-01", "att": "P", ... } ] }
//! ```
//!
//! A raised `error` flag on a read means "nothing recorded for this scope",
//! which is returned as an empty list.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{LedgerError, Result};
use crate::models::{AttendanceRow, FeeLedgerEntry, FeePaymentRow, Scope, DATE_FORMAT};
use crate::source::RecordSource;

const ATTENDANCE_BY_CLASS: &str = "getAttDataByClass.php";
const ATTENDANCE_BY_DATE: &str = "getAttendanceData.php";
const SAVE_ATTENDANCE: &str = "saveAttendanceData.php";
const STUDENT_PAYMENTS: &str = "getStdPayments.php";
const PENDING_PAYMENTS: &str = "getPendingPaySubmissions.php";
const FEE_LEDGER: &str = "getStudentsFeeData.php";

#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LedgerError::fetch(base_url.as_str(), err))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<String> {
        let response = self
            .http
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|err| LedgerError::fetch(endpoint, err))?;
        read_body(endpoint, response).await
    }

    async fn get(&self, endpoint: &str) -> Result<String> {
        let response = self
            .http
            .get(self.url(endpoint))
            .send()
            .await
            .map_err(|err| LedgerError::fetch(endpoint, err))?;
        read_body(endpoint, response).await
    }

    /// Online payments waiting for an administrator to approve them.
    pub async fn fetch_pending_payments(&self) -> Result<Vec<FeePaymentRow>> {
        let body = self.get(PENDING_PAYMENTS).await?;
        parse_list(PENDING_PAYMENTS, &body, "paymentsData")
    }
}

async fn read_body(endpoint: &str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(LedgerError::fetch(endpoint, format!("HTTP {status}")));
    }
    response
        .text()
        .await
        .map_err(|err| LedgerError::fetch(endpoint, err))
}

fn scope_body(scope: &Scope) -> Value {
    json!({
        "sessionId": scope.session_id,
        "classId": scope.class_id,
        "section": scope.section,
    })
}

fn error_flag(envelope: &serde_json::Map<String, Value>) -> bool {
    match envelope.get("error") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_i64().is_some_and(|n| n != 0),
        Some(Value::String(text)) => !text.is_empty() && text != "false" && text != "0",
        _ => false,
    }
}

fn parse_envelope(endpoint: &str, body: &str) -> Result<serde_json::Map<String, Value>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| LedgerError::fetch(endpoint, format!("malformed JSON: {err}")))?;
    match value {
        Value::Object(envelope) => Ok(envelope),
        other => Err(LedgerError::fetch(
            endpoint,
            format!("expected a JSON object, got {other}"),
        )),
    }
}

/// Pulls the list stored under `key`, treating the backend's `error` flag as no data.
pub fn parse_list<T: DeserializeOwned>(endpoint: &str, body: &str, key: &str) -> Result<Vec<T>> {
    let mut envelope = parse_envelope(endpoint, body)?;
    if error_flag(&envelope) {
        tracing::info!(endpoint, "backend reports no data for scope");
        return Ok(Vec::new());
    }
    match envelope.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(list) => serde_json::from_value(list)
            .map_err(|err| LedgerError::fetch(endpoint, format!("malformed {key}: {err}"))),
    }
}

/// Write endpoints answer with the same envelope; a raised flag is a failure there.
pub fn parse_ack(endpoint: &str, body: &str) -> Result<()> {
    let envelope = parse_envelope(endpoint, body)?;
    if error_flag(&envelope) {
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("backend rejected the request");
        return Err(LedgerError::fetch(endpoint, message));
    }
    Ok(())
}

#[async_trait]
impl RecordSource for ApiClient {
    async fn fetch_attendance(&self, scope: &Scope) -> Result<Vec<AttendanceRow>> {
        let body = self.post(ATTENDANCE_BY_CLASS, &scope_body(scope)).await?;
        let rows: Vec<AttendanceRow> = parse_list(ATTENDANCE_BY_CLASS, &body, "attData")?;
        tracing::info!(%scope, rows = rows.len(), "fetched attendance");
        Ok(rows)
    }

    async fn fetch_attendance_for_date(
        &self,
        scope: &Scope,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRow>> {
        let mut request = scope_body(scope);
        request["date"] = Value::String(date.format(DATE_FORMAT).to_string());
        let body = self.post(ATTENDANCE_BY_DATE, &request).await?;
        parse_list(ATTENDANCE_BY_DATE, &body, "attData")
    }

    async fn fetch_payments(&self, scope: &Scope) -> Result<Vec<FeePaymentRow>> {
        let body = self
            .post(STUDENT_PAYMENTS, &json!({ "stdData": scope_body(scope) }))
            .await?;
        let rows: Vec<FeePaymentRow> = parse_list(STUDENT_PAYMENTS, &body, "paymentsData")?;
        tracing::info!(%scope, rows = rows.len(), "fetched fee payments");
        Ok(rows)
    }

    async fn fetch_fee_ledger(&self, scope: &Scope) -> Result<Vec<FeeLedgerEntry>> {
        let body = self.post(FEE_LEDGER, &scope_body(scope)).await?;
        parse_list(FEE_LEDGER, &body, "feeData")
    }

    async fn save_attendance(&self, rows: &[AttendanceRow]) -> Result<()> {
        let body = self
            .post(SAVE_ATTENDANCE, &json!({ "attData": rows }))
            .await?;
        parse_ack(SAVE_ATTENDANCE, &body)?;
        tracing::info!(rows = rows.len(), "saved attendance");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_is_read_from_named_key() {
        let body = r#"{"error":false,"attData":[{"sId":"S1","studentName":"Asha Verma","sessionId":"2024-25","classId":"5","section":"A","classDate":"2024-01-01","att":"P","markedBy":"SYSTEM"}]}"#;
        let rows: Vec<AttendanceRow> = parse_list(ATTENDANCE_BY_CLASS, body, "attData").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_id, "S1");
        assert_eq!(rows[0].att.as_deref(), Some("P"));
    }

    #[test]
    fn error_flag_means_no_data() {
        let body = r#"{"error":true,"message":"No records"}"#;
        let rows: Vec<AttendanceRow> = parse_list(ATTENDANCE_BY_CLASS, body, "attData").unwrap();
        assert!(rows.is_empty());
        let numeric: Vec<AttendanceRow> =
            parse_list(ATTENDANCE_BY_CLASS, r#"{"error":1}"#, "attData").unwrap();
        assert!(numeric.is_empty());
    }

    #[test]
    fn missing_key_means_no_data() {
        let rows: Vec<FeePaymentRow> =
            parse_list(STUDENT_PAYMENTS, r#"{"error":false}"#, "paymentsData").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn malformed_json_is_a_fetch_error() {
        let err = parse_list::<AttendanceRow>(ATTENDANCE_BY_CLASS, "<html>oops</html>", "attData")
            .unwrap_err();
        assert!(err.is_fetch());
        let err = parse_list::<AttendanceRow>(ATTENDANCE_BY_CLASS, "[]", "attData").unwrap_err();
        assert!(err.is_fetch());
    }

    #[test]
    fn wrongly_shaped_rows_are_a_fetch_error() {
        let err =
            parse_list::<AttendanceRow>(ATTENDANCE_BY_CLASS, r#"{"attData":[{"sId":1}]}"#, "attData")
                .unwrap_err();
        assert!(err.is_fetch());
    }

    #[test]
    fn payments_keep_raw_amounts() {
        let body = r#"{"paymentsData":[{"sessionId":"2024-25","sId":"S1","studentName":"Asha","classId":"5","section":"A","amount":"500","paymentDate":"2024-04-01","paymentMode":"Cash","remark":""}]}"#;
        let rows: Vec<FeePaymentRow> = parse_list(STUDENT_PAYMENTS, body, "paymentsData").unwrap();
        assert_eq!(rows[0].amount, Value::String("500".to_string()));
    }

    #[test]
    fn rejected_save_is_a_fetch_error() {
        assert!(parse_ack(SAVE_ATTENDANCE, r#"{"error":false}"#).is_ok());
        let err = parse_ack(SAVE_ATTENDANCE, r#"{"error":true,"message":"locked"}"#).unwrap_err();
        assert_eq!(
            err,
            LedgerError::fetch(SAVE_ATTENDANCE, "locked")
        );
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let client = ApiClient::new("https://school.test/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url(ATTENDANCE_BY_CLASS),
            "https://school.test/api/getAttDataByClass.php"
        );
    }
}
