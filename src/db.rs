use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{
    AttendanceRecord, AttendanceRow, FeeLedgerEntry, FeePayment, FeePaymentRow, Scope,
    DATE_FORMAT,
};
use crate::source::RecordSource;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = [
        ("S101", "Asha Verma"),
        ("S102", "Ravi Kumar"),
        ("S103", "Meera Iyer"),
    ];
    let days = [
        (NaiveDate::from_ymd_opt(2024, 4, 1).context("invalid date")?, ["P", "P", "A"]),
        (NaiveDate::from_ymd_opt(2024, 4, 2).context("invalid date")?, ["P", "A", "P"]),
        (NaiveDate::from_ymd_opt(2024, 4, 3).context("invalid date")?, ["L", "P", "P"]),
    ];

    for (class_date, marks) in days {
        for ((student_id, student_name), att) in students.iter().zip(marks) {
            let record = AttendanceRecord {
                student_id: student_id.to_string(),
                student_name: student_name.to_string(),
                class_id: "5".to_string(),
                section: "A".to_string(),
                class_date,
                mark: att.parse()?,
                session_id: "2024-25".to_string(),
                marked_by: "SYSTEM".to_string(),
                teacher_name: Some("Mrs. Rao".to_string()),
            };
            insert_attendance(pool, &record, false).await?;
        }
    }

    let payments = [
        ("seed-001", "S101", "Asha Verma", "500", "Cash", "2024-04-05"),
        ("seed-002", "S102", "Ravi Kumar", "300", "UPI", "2024-04-06"),
        ("seed-003", "S103", "Meera Iyer", "200", "Cheque", "2024-04-06"),
    ];
    for (source_key, student_id, student_name, amount, mode, date) in payments {
        let row = FeePaymentRow {
            session_id: "2024-25".to_string(),
            student_id: student_id.to_string(),
            student_name: student_name.to_string(),
            class_id: "5".to_string(),
            section: "A".to_string(),
            amount: serde_json::Value::String(amount.to_string()),
            payment_date: date.to_string(),
            payment_mode: mode.to_string(),
            remark: Some("first instalment".to_string()),
            transaction_id: None,
        };
        insert_payment(pool, &FeePayment::try_from(&row)?, source_key).await?;
    }

    for (student_id, student_name) in students {
        sqlx::query(
            r#"
            INSERT INTO school_roll.fee_ledger
            (session_id, student_id, student_name, class_id, section, fee, discount, paid)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (session_id, student_id) DO NOTHING
            "#,
        )
        .bind("2024-25")
        .bind(student_id)
        .bind(student_name)
        .bind("5")
        .bind("A")
        .bind(Decimal::new(12000, 0))
        .bind(Decimal::ZERO)
        .bind(Decimal::ZERO)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn insert_attendance(
    pool: &PgPool,
    record: &AttendanceRecord,
    overwrite: bool,
) -> std::result::Result<bool, sqlx::Error> {
    let conflict = if overwrite {
        "ON CONFLICT (session_id, student_id, class_date) DO UPDATE \
         SET att = EXCLUDED.att, marked_by = EXCLUDED.marked_by, \
         class_id = EXCLUDED.class_id, section = EXCLUDED.section"
    } else {
        "ON CONFLICT (session_id, student_id, class_date) DO NOTHING"
    };
    let query = format!(
        "INSERT INTO school_roll.attendance \
         (id, session_id, student_id, student_name, class_id, section, class_date, att, marked_by, teacher_name) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) {conflict}"
    );
    let result = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(&record.session_id)
        .bind(&record.student_id)
        .bind(&record.student_name)
        .bind(&record.class_id)
        .bind(&record.section)
        .bind(record.class_date)
        .bind(record.mark.code())
        .bind(&record.marked_by)
        .bind(record.teacher_name.as_deref())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_payment(
    pool: &PgPool,
    payment: &FeePayment,
    source_key: &str,
) -> std::result::Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO school_roll.fee_payments
        (id, session_id, student_id, student_name, class_id, section, amount,
         payment_date, payment_mode, remark, transaction_id, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&payment.session_id)
    .bind(&payment.student_id)
    .bind(&payment.student_name)
    .bind(&payment.class_id)
    .bind(&payment.section)
    .bind(payment.amount)
    .bind(payment.payment_date)
    .bind(payment.payment_mode.to_string())
    .bind(&payment.remark)
    .bind(payment.transaction_id.as_deref())
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Reads an attendance export whose headers match the backend keys
/// (`sId,studentName,sessionId,classId,section,classDate,att,markedBy`).
pub fn read_attendance_csv(csv_path: &Path) -> anyhow::Result<Vec<AttendanceRecord>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut records = Vec::new();
    for (index, result) in reader.deserialize::<AttendanceRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("line {line}: unreadable row"))?;
        let record =
            AttendanceRecord::try_from(row).with_context(|| format!("line {line}: invalid row"))?;
        records.push(record);
    }
    Ok(records)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentCsvRow {
    session_id: String,
    #[serde(rename = "sId")]
    student_id: String,
    student_name: String,
    class_id: String,
    section: String,
    amount: String,
    payment_date: String,
    payment_mode: String,
    remark: Option<String>,
    transaction_id: Option<String>,
    source_key: Option<String>,
}

/// Reads a payments export; rows without a `sourceKey` get a generated one.
pub fn read_payments_csv(csv_path: &Path) -> anyhow::Result<Vec<(FeePayment, String)>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut payments = Vec::new();
    for (index, result) in reader.deserialize::<PaymentCsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("line {line}: unreadable row"))?;
        let source_key = row
            .source_key
            .clone()
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let wire = FeePaymentRow {
            session_id: row.session_id,
            student_id: row.student_id,
            student_name: row.student_name,
            class_id: row.class_id,
            section: row.section,
            amount: serde_json::Value::String(row.amount),
            payment_date: row.payment_date,
            payment_mode: row.payment_mode,
            remark: row.remark,
            transaction_id: row.transaction_id,
        };
        let payment =
            FeePayment::try_from(&wire).with_context(|| format!("line {line}: invalid row"))?;
        payments.push((payment, source_key));
    }
    Ok(payments)
}

pub async fn import_attendance_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let records = read_attendance_csv(csv_path)?;
    let mut inserted = 0usize;
    for record in &records {
        if insert_attendance(pool, record, true).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

async fn ledger_entry(
    pool: &PgPool,
    session_id: &str,
    student_id: &str,
) -> std::result::Result<Option<FeeLedgerEntry>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT session_id, student_id, student_name, class_id, section, fee, discount, paid
        FROM school_roll.fee_ledger
        WHERE session_id = $1 AND student_id = $2
        "#,
    )
    .bind(session_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(ledger_row).transpose()
}

/// Imported payments are checked against the student's ledger balance when one
/// exists, and the ledger's paid amount moves with every inserted payment.
pub async fn import_payments_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let payments = read_payments_csv(csv_path)?;
    let mut inserted = 0usize;
    for (payment, source_key) in &payments {
        if let Some(entry) = ledger_entry(pool, &payment.session_id, &payment.student_id).await? {
            entry.check_payment(payment.amount).with_context(|| {
                format!("payment {source_key} for {}", payment.student_id)
            })?;
        }
        if insert_payment(pool, payment, source_key).await? {
            sqlx::query(
                r#"
                UPDATE school_roll.fee_ledger
                SET paid = paid + $3
                WHERE session_id = $1 AND student_id = $2
                "#,
            )
            .bind(&payment.session_id)
            .bind(&payment.student_id)
            .bind(payment.amount)
            .execute(pool)
            .await?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

fn db_error(err: sqlx::Error) -> LedgerError {
    LedgerError::fetch("postgres", err)
}

fn attendance_row(row: &PgRow) -> std::result::Result<AttendanceRow, sqlx::Error> {
    let class_date: NaiveDate = row.try_get("class_date")?;
    Ok(AttendanceRow {
        student_id: row.try_get("student_id")?,
        student_name: row.try_get("student_name")?,
        teacher_name: row.try_get("teacher_name")?,
        session_id: row.try_get("session_id")?,
        class_id: row.try_get("class_id")?,
        section: row.try_get("section")?,
        class_date: class_date.format(DATE_FORMAT).to_string(),
        att: row.try_get("att")?,
        marked_by: row.try_get("marked_by")?,
    })
}

fn payment_row(row: &PgRow) -> std::result::Result<FeePaymentRow, sqlx::Error> {
    let amount: Decimal = row.try_get("amount")?;
    let payment_date: NaiveDate = row.try_get("payment_date")?;
    Ok(FeePaymentRow {
        session_id: row.try_get("session_id")?,
        student_id: row.try_get("student_id")?,
        student_name: row.try_get("student_name")?,
        class_id: row.try_get("class_id")?,
        section: row.try_get("section")?,
        amount: serde_json::Value::String(amount.to_string()),
        payment_date: payment_date.format(DATE_FORMAT).to_string(),
        payment_mode: row.try_get("payment_mode")?,
        remark: row.try_get("remark")?,
        transaction_id: row.try_get("transaction_id")?,
    })
}

fn ledger_row(row: &PgRow) -> std::result::Result<FeeLedgerEntry, sqlx::Error> {
    Ok(FeeLedgerEntry {
        session_id: row.try_get("session_id")?,
        student_id: row.try_get("student_id")?,
        class_id: row.try_get("class_id")?,
        section: row.try_get("section")?,
        fee: row.try_get("fee")?,
        discount: row.try_get("discount")?,
        paid: row.try_get("paid")?,
        student_name: row.try_get("student_name")?,
    })
}

const SCOPE_FILTER: &str = "session_id = $1 \
     AND ($2::text IS NULL OR class_id = $2) \
     AND ($3::text IS NULL OR section = $3)";

/// Postgres mirror of the school backend.
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSource for PgSource {
    async fn fetch_attendance(&self, scope: &Scope) -> Result<Vec<AttendanceRow>> {
        let query = format!(
            "SELECT student_id, student_name, teacher_name, session_id, class_id, section, \
             class_date, att, marked_by \
             FROM school_roll.attendance WHERE {SCOPE_FILTER} \
             ORDER BY class_date, student_name"
        );
        let rows = sqlx::query(&query)
            .bind(&scope.session_id)
            .bind(scope.class_id.as_deref())
            .bind(scope.section.as_deref())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter()
            .map(attendance_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error)
    }

    async fn fetch_attendance_for_date(
        &self,
        scope: &Scope,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceRow>> {
        let query = format!(
            "SELECT student_id, student_name, teacher_name, session_id, class_id, section, \
             class_date, att, marked_by \
             FROM school_roll.attendance WHERE {SCOPE_FILTER} AND class_date = $4 \
             ORDER BY student_name"
        );
        let rows = sqlx::query(&query)
            .bind(&scope.session_id)
            .bind(scope.class_id.as_deref())
            .bind(scope.section.as_deref())
            .bind(date)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter()
            .map(attendance_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error)
    }

    async fn fetch_payments(&self, scope: &Scope) -> Result<Vec<FeePaymentRow>> {
        let query = format!(
            "SELECT session_id, student_id, student_name, class_id, section, amount, \
             payment_date, payment_mode, remark, transaction_id \
             FROM school_roll.fee_payments WHERE {SCOPE_FILTER} \
             ORDER BY payment_date, student_name"
        );
        let rows = sqlx::query(&query)
            .bind(&scope.session_id)
            .bind(scope.class_id.as_deref())
            .bind(scope.section.as_deref())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        rows.iter()
            .map(payment_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error)
    }

    async fn fetch_fee_ledger(&self, scope: &Scope) -> Result<Vec<FeeLedgerEntry>> {
        let query = format!(
            "SELECT session_id, student_id, student_name, class_id, section, fee, discount, paid \
             FROM school_roll.fee_ledger WHERE {SCOPE_FILTER} ORDER BY student_name"
        );
        let rows = sqlx::query(&query)
            .bind(&scope.session_id)
            .bind(scope.class_id.as_deref())
            .bind(scope.section.as_deref())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter()
            .map(ledger_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error)
    }

    async fn save_attendance(&self, rows: &[AttendanceRow]) -> Result<()> {
        let records = rows
            .iter()
            .cloned()
            .map(AttendanceRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        for record in &records {
            insert_attendance(&self.pool, record, true)
                .await
                .map_err(db_error)?;
        }
        tracing::info!(rows = records.len(), "saved attendance to mirror");
        Ok(())
    }
}
