use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const SYSTEM_MARKER: &str = "SYSTEM";

/// Session, class and section narrowing which records are fetched.
/// A scope without class/section covers the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub session_id: String,
    pub class_id: Option<String>,
    pub section: Option<String>,
}

impl Scope {
    pub fn class_section(
        session_id: impl Into<String>,
        class_id: impl Into<String>,
        section: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            class_id: Some(class_id.into()),
            section: Some(section.into()),
        }
    }

    pub fn whole_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            class_id: None,
            section: None,
        }
    }

    pub fn is_whole_session(&self) -> bool {
        self.class_id.is_none() && self.section.is_none()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.class_id, &self.section) {
            (Some(class_id), Some(section)) => {
                write!(f, "session {} class {}-{}", self.session_id, class_id, section)
            }
            (Some(class_id), None) => write!(f, "session {} class {}", self.session_id, class_id),
            _ => write!(f, "session {}", self.session_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    #[serde(rename = "P")]
    Present,
    #[serde(rename = "A")]
    Absent,
    #[serde(rename = "L")]
    Leave,
}

impl Mark {
    pub fn code(self) -> &'static str {
        match self {
            Mark::Present => "P",
            Mark::Absent => "A",
            Mark::Leave => "L",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mark::Present => "Present",
            Mark::Absent => "Absent",
            Mark::Leave => "Leave",
        }
    }
}

impl FromStr for Mark {
    type Err = LedgerError;

    /// Accepts the backend codes (`P`, `A`, `L`) and the form labels.
    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "P" | "Present" => Ok(Mark::Present),
            "A" | "Absent" => Ok(Mark::Absent),
            "L" | "Leave" => Ok(Mark::Leave),
            other => Err(LedgerError::data("att", other, "expected P, A or L")),
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|err| LedgerError::data(field, value, format!("expected YYYY-MM-DD ({err})")))
}

/// Attendance row exactly as the backend sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRow {
    #[serde(rename = "sId")]
    pub student_id: String,
    pub student_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_name: Option<String>,
    pub session_id: String,
    pub class_id: String,
    pub section: String,
    pub class_date: String,
    #[serde(default)]
    pub att: Option<String>,
    #[serde(default)]
    pub marked_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub section: String,
    pub class_date: NaiveDate,
    pub mark: Mark,
    pub session_id: String,
    pub marked_by: String,
    pub teacher_name: Option<String>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = LedgerError;

    fn try_from(row: AttendanceRow) -> Result<Self> {
        let mark = match row.att.as_deref() {
            Some(code) => code.parse()?,
            None => {
                return Err(LedgerError::data(
                    "att",
                    "",
                    format!("missing mark for student {}", row.student_id),
                ))
            }
        };
        Ok(Self {
            class_date: parse_date("classDate", &row.class_date)?,
            mark,
            marked_by: row.marked_by.unwrap_or_else(|| SYSTEM_MARKER.to_string()),
            student_id: row.student_id,
            student_name: row.student_name,
            class_id: row.class_id,
            section: row.section,
            session_id: row.session_id,
            teacher_name: row.teacher_name,
        })
    }
}

impl From<&AttendanceRecord> for AttendanceRow {
    fn from(record: &AttendanceRecord) -> Self {
        Self {
            student_id: record.student_id.clone(),
            student_name: record.student_name.clone(),
            teacher_name: record.teacher_name.clone(),
            session_id: record.session_id.clone(),
            class_id: record.class_id.clone(),
            section: record.section.clone(),
            class_date: record.class_date.format(DATE_FORMAT).to_string(),
            att: Some(record.mark.code().to_string()),
            marked_by: Some(record.marked_by.clone()),
        }
    }
}

pub fn ingest_attendance(rows: Vec<AttendanceRow>) -> Result<Vec<AttendanceRecord>> {
    rows.into_iter().map(AttendanceRecord::try_from).collect()
}

/// Share of class sessions a student was present for.
///
/// `Undefined` stands in for a zero-session denominator; presenters show it as `N/A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttendancePercentage {
    Percent(u8),
    Undefined,
}

impl AttendancePercentage {
    pub fn value(self) -> Option<u8> {
        match self {
            AttendancePercentage::Percent(value) => Some(value),
            AttendancePercentage::Undefined => None,
        }
    }
}

impl fmt::Display for AttendancePercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendancePercentage::Percent(value) => write!(f, "{value}%"),
            AttendancePercentage::Undefined => f.write_str("N/A"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub student_id: String,
    pub name: String,
    pub class_id: String,
    pub section: String,
    pub total_records: usize,
    pub present_count: usize,
    pub absent_count: usize,
    pub leave_count: usize,
    pub unique_date_count: usize,
    pub attendance_percentage: AttendancePercentage,
    /// Set when present days exceeded the class-session universe and the percentage was capped at 100.
    pub clamped: bool,
}

/// Per-student summaries keyed by student id, iterated in first-appearance order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceSummaries {
    entries: Vec<AttendanceSummary>,
    index: HashMap<String, usize>,
}

impl AttendanceSummaries {
    pub(crate) fn entry_or_insert_with(
        &mut self,
        student_id: &str,
        make: impl FnOnce() -> AttendanceSummary,
    ) -> &mut AttendanceSummary {
        let position = match self.index.get(student_id) {
            Some(position) => *position,
            None => {
                self.entries.push(make());
                self.index
                    .insert(student_id.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[position]
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut AttendanceSummary> {
        self.entries.iter_mut()
    }

    pub fn get(&self, student_id: &str) -> Option<&AttendanceSummary> {
        self.index.get(student_id).map(|position| &self.entries[*position])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttendanceSummary> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<AttendanceSummary> {
        self.entries
    }

    pub fn sorted_by_name(&self) -> Vec<AttendanceSummary> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.student_id.cmp(&b.student_id))
        });
        sorted
    }
}

impl<'a> IntoIterator for &'a AttendanceSummaries {
    type Item = &'a AttendanceSummary;
    type IntoIter = std::slice::Iter<'a, AttendanceSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMode {
    Cash,
    #[serde(rename = "UPI")]
    Upi,
    Card,
    Cheque,
}

impl PaymentMode {
    pub fn is_online(self) -> bool {
        matches!(self, PaymentMode::Upi | PaymentMode::Card)
    }
}

impl FromStr for PaymentMode {
    type Err = LedgerError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMode::Cash),
            "upi" => Ok(PaymentMode::Upi),
            "card" => Ok(PaymentMode::Card),
            "cheque" | "check" => Ok(PaymentMode::Cheque),
            _ => Err(LedgerError::data(
                "paymentMode",
                value,
                "expected Cash, UPI, Card or Cheque",
            )),
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::Upi => "UPI",
            PaymentMode::Card => "Card",
            PaymentMode::Cheque => "Cheque",
        })
    }
}

/// Fee payment row as the backend sends it; `amount` arrives as a string or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePaymentRow {
    #[serde(default)]
    pub session_id: String,
    #[serde(rename = "sId", default)]
    pub student_id: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub amount: serde_json::Value,
    #[serde(default)]
    pub payment_date: String,
    #[serde(default)]
    pub payment_mode: String,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePayment {
    pub session_id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub section: String,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_mode: PaymentMode,
    pub remark: String,
    pub transaction_id: Option<String>,
}

pub fn parse_amount(value: &serde_json::Value) -> Result<Decimal> {
    let amount = match value {
        serde_json::Value::String(text) => Decimal::from_str(text.trim())
            .map_err(|err| LedgerError::data("amount", text.as_str(), err.to_string()))?,
        serde_json::Value::Number(number) => Decimal::from_str(&number.to_string())
            .or_else(|_| Decimal::from_scientific(&number.to_string()))
            .map_err(|err| LedgerError::data("amount", number.to_string(), err.to_string()))?,
        serde_json::Value::Null => {
            return Err(LedgerError::data("amount", "", "missing amount"));
        }
        other => {
            return Err(LedgerError::data("amount", other.to_string(), "not a number"));
        }
    };
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LedgerError::data(
            "amount",
            amount.to_string(),
            "amount cannot be negative",
        ));
    }
    Ok(amount)
}

impl TryFrom<&FeePaymentRow> for FeePayment {
    type Error = LedgerError;

    fn try_from(row: &FeePaymentRow) -> Result<Self> {
        Ok(Self {
            amount: parse_amount(&row.amount)?,
            payment_mode: row.payment_mode.parse()?,
            payment_date: parse_date("paymentDate", &row.payment_date)?,
            session_id: row.session_id.clone(),
            student_id: row.student_id.clone(),
            student_name: row.student_name.clone(),
            class_id: row.class_id.clone(),
            section: row.section.clone(),
            remark: row.remark.clone().unwrap_or_default(),
            transaction_id: row.transaction_id.clone(),
        })
    }
}

pub fn ingest_payments(rows: &[FeePaymentRow]) -> Result<Vec<FeePayment>> {
    rows.iter().map(FeePayment::try_from).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCollectionTotals {
    pub cash_total: Decimal,
    /// UPI and card payments together
    pub online_total: Decimal,
    pub cheque_total: Decimal,
    pub grand_total: Decimal,
    pub payment_count: usize,
}

/// Student fee ledger line (`getStudentsFeeData`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLedgerEntry {
    pub session_id: String,
    #[serde(rename = "sId")]
    pub student_id: String,
    pub class_id: String,
    pub section: String,
    pub fee: Decimal,
    pub discount: Decimal,
    pub paid: Decimal,
    pub student_name: String,
}

impl FeeLedgerEntry {
    pub fn outstanding(&self) -> Decimal {
        (self.fee - self.discount - self.paid).max(Decimal::ZERO)
    }

    /// Entry-time check a new payment must pass before it is recorded.
    pub fn check_payment(&self, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::data(
                "amount",
                amount.to_string(),
                "payment must be greater than zero",
            ));
        }
        let outstanding = self.outstanding();
        if amount > outstanding {
            return Err(LedgerError::data(
                "amount",
                amount.to_string(),
                format!("exceeds outstanding fee {outstanding} for {}", self.student_id),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySnapshot {
    pub present: usize,
    pub absent: usize,
    pub leave: usize,
    pub total: usize,
}

impl DaySnapshot {
    pub fn has_marks(&self) -> bool {
        self.present + self.absent + self.leave > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(att: Option<&str>, class_date: &str) -> AttendanceRow {
        AttendanceRow {
            student_id: "S1".to_string(),
            student_name: "Asha Verma".to_string(),
            teacher_name: None,
            session_id: "2024-25".to_string(),
            class_id: "5".to_string(),
            section: "A".to_string(),
            class_date: class_date.to_string(),
            att: att.map(str::to_string),
            marked_by: None,
        }
    }

    #[test]
    fn attendance_row_decodes_backend_json() {
        let raw = json!({
            "sId": "S7",
            "studentName": "Ravi Kumar",
            "teacherName": "Mrs. Rao",
            "sessionId": "2024-25",
            "classId": "5",
            "section": "A",
            "classDate": "2024-01-02",
            "att": "L",
            "markedBy": "rao@school.test"
        });
        let row: AttendanceRow = serde_json::from_value(raw).unwrap();
        let record = AttendanceRecord::try_from(row).unwrap();
        assert_eq!(record.student_id, "S7");
        assert_eq!(record.mark, Mark::Leave);
        assert_eq!(record.class_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(record.marked_by, "rao@school.test");
    }

    #[test]
    fn unknown_mark_is_a_data_error() {
        let err = AttendanceRecord::try_from(row(Some("X"), "2024-01-01")).unwrap_err();
        assert!(matches!(err, LedgerError::Data { field: "att", .. }));
    }

    #[test]
    fn missing_mark_is_a_data_error() {
        let err = AttendanceRecord::try_from(row(None, "2024-01-01")).unwrap_err();
        assert!(matches!(err, LedgerError::Data { field: "att", .. }));
    }

    #[test]
    fn malformed_date_is_a_data_error() {
        let err = AttendanceRecord::try_from(row(Some("P"), "01/02/2024")).unwrap_err();
        assert!(matches!(err, LedgerError::Data { field: "classDate", .. }));
    }

    #[test]
    fn missing_marker_defaults_to_system() {
        let record = AttendanceRecord::try_from(row(Some("P"), "2024-01-01")).unwrap();
        assert_eq!(record.marked_by, SYSTEM_MARKER);
    }

    #[test]
    fn amounts_parse_from_strings_and_numbers() {
        assert_eq!(parse_amount(&json!("500")).unwrap(), Decimal::new(500, 0));
        assert_eq!(parse_amount(&json!(" 250.50 ")).unwrap(), Decimal::new(25050, 2));
        assert_eq!(parse_amount(&json!(300)).unwrap(), Decimal::new(300, 0));
    }

    #[test]
    fn bad_amounts_are_rejected() {
        assert!(parse_amount(&json!("five hundred")).is_err());
        assert!(parse_amount(&json!("")).is_err());
        assert!(parse_amount(&json!(null)).is_err());
        assert!(parse_amount(&json!(true)).is_err());
        assert!(parse_amount(&json!("-20")).is_err());
    }

    #[test]
    fn payment_modes_parse_case_insensitively() {
        assert_eq!("UPI".parse::<PaymentMode>().unwrap(), PaymentMode::Upi);
        assert_eq!("cash".parse::<PaymentMode>().unwrap(), PaymentMode::Cash);
        assert!("Crypto".parse::<PaymentMode>().is_err());
        assert!(PaymentMode::Card.is_online());
        assert!(!PaymentMode::Cheque.is_online());
    }

    #[test]
    fn ledger_rejects_overpayment() {
        let entry = FeeLedgerEntry {
            session_id: "2024-25".to_string(),
            student_id: "S1".to_string(),
            class_id: "5".to_string(),
            section: "A".to_string(),
            fee: Decimal::new(12000, 0),
            discount: Decimal::new(2000, 0),
            paid: Decimal::new(4000, 0),
            student_name: "Asha Verma".to_string(),
        };
        assert_eq!(entry.outstanding(), Decimal::new(6000, 0));
        assert!(entry.check_payment(Decimal::new(6000, 0)).is_ok());
        assert!(entry.check_payment(Decimal::new(6001, 0)).is_err());
        assert!(entry.check_payment(Decimal::ZERO).is_err());
    }

    #[test]
    fn undefined_percentage_renders_as_not_available() {
        assert_eq!(AttendancePercentage::Undefined.to_string(), "N/A");
        assert_eq!(AttendancePercentage::Percent(75).to_string(), "75%");
        assert_eq!(
            serde_json::to_value(AttendancePercentage::Undefined).unwrap(),
            json!(null)
        );
    }
}
