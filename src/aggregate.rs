use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::models::{
    AttendancePercentage, AttendanceRecord, AttendanceSummaries, AttendanceSummary,
    FeeCollectionTotals, FeePayment, FeePaymentRow, Mark, PaymentMode,
};

pub fn aggregate_attendance(records: &[AttendanceRecord]) -> AttendanceSummaries {
    let mut summaries = AttendanceSummaries::default();
    let mut class_dates: HashMap<(&str, &str), HashSet<NaiveDate>> = HashMap::new();

    for record in records {
        class_dates
            .entry((record.class_id.as_str(), record.section.as_str()))
            .or_default()
            .insert(record.class_date);

        let entry = summaries.entry_or_insert_with(&record.student_id, || AttendanceSummary {
            student_id: record.student_id.clone(),
            name: record.student_name.clone(),
            class_id: record.class_id.clone(),
            section: record.section.clone(),
            total_records: 0,
            present_count: 0,
            absent_count: 0,
            leave_count: 0,
            unique_date_count: 0,
            attendance_percentage: AttendancePercentage::Undefined,
            clamped: false,
        });

        entry.total_records += 1;
        match record.mark {
            Mark::Present => entry.present_count += 1,
            Mark::Absent => entry.absent_count += 1,
            Mark::Leave => entry.leave_count += 1,
        }
    }

    for summary in summaries.iter_mut() {
        summary.unique_date_count = class_dates
            .get(&(summary.class_id.as_str(), summary.section.as_str()))
            .map_or(0, HashSet::len);
        let (percentage, clamped) =
            attendance_percentage(summary.present_count, summary.unique_date_count);
        if clamped {
            tracing::warn!(
                student_id = %summary.student_id,
                present = summary.present_count,
                class_days = summary.unique_date_count,
                "present days exceed class days; percentage capped at 100"
            );
        }
        summary.attendance_percentage = percentage;
        summary.clamped = clamped;
    }

    tracing::debug!(
        records = records.len(),
        students = summaries.len(),
        "aggregated attendance"
    );
    summaries
}

/// Rounds half up like the attendance screens do and caps the result at 100.
/// The flag reports whether the cap was applied.
pub fn attendance_percentage(present: usize, class_days: usize) -> (AttendancePercentage, bool) {
    if class_days == 0 {
        return (AttendancePercentage::Undefined, false);
    }
    let rounded = (present as u64 * 200 + class_days as u64) / (class_days as u64 * 2);
    if rounded > 100 {
        (AttendancePercentage::Percent(100), true)
    } else {
        (AttendancePercentage::Percent(rounded as u8), false)
    }
}

pub fn fee_totals(payments: &[FeePayment]) -> FeeCollectionTotals {
    let mut totals = FeeCollectionTotals::default();
    for payment in payments {
        match payment.payment_mode {
            PaymentMode::Cash => totals.cash_total += payment.amount,
            PaymentMode::Upi | PaymentMode::Card => totals.online_total += payment.amount,
            PaymentMode::Cheque => totals.cheque_total += payment.amount,
        }
        totals.grand_total += payment.amount;
        totals.payment_count += 1;
    }
    totals
}

/// Sums raw backend rows, refusing the whole batch if any amount or mode is malformed.
pub fn aggregate_fee_totals(rows: &[FeePaymentRow]) -> Result<FeeCollectionTotals> {
    let payments = rows
        .iter()
        .map(FeePayment::try_from)
        .collect::<Result<Vec<_>>>()?;
    Ok(fee_totals(&payments))
}

/// Collected amount per student id, used by the fee report.
pub fn collected_by_student(payments: &[FeePayment]) -> HashMap<String, Decimal> {
    let mut collected: HashMap<String, Decimal> = HashMap::new();
    for payment in payments {
        *collected.entry(payment.student_id.clone()).or_default() += payment.amount;
    }
    collected
}
