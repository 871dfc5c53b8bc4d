//! Derived views recomputed from scratch whenever records or criteria change.

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::{aggregate_attendance, fee_totals};
use crate::error::Result;
use crate::filter::{apply_criterion, filter_by_search_term, FilterCriteria};
use crate::models::{
    AttendanceRecord, AttendanceSummary, DaySnapshot, FeeCollectionTotals, FeePayment,
};
use crate::snapshot::{snapshot_for_date, TotalScope};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceView {
    /// Records left after the date filters
    pub records: Vec<AttendanceRecord>,
    /// Per-student summaries in first-appearance order, narrowed by any search term
    pub summaries: Vec<AttendanceSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeView {
    pub payments: Vec<FeePayment>,
    pub totals: FeeCollectionTotals,
}

/// Date-dimension criteria narrow the records before aggregation; search terms
/// narrow the summaries afterwards so each class keeps its full date universe.
pub fn derive_view(
    records: &[AttendanceRecord],
    criteria: &[FilterCriteria],
) -> Result<AttendanceView> {
    let mut narrowed = records.to_vec();
    let mut terms = Vec::new();
    for criterion in criteria {
        match criterion {
            FilterCriteria::Search(term) => terms.push(term.as_str()),
            other => narrowed = apply_criterion(&narrowed, other)?,
        }
    }

    let mut summaries = aggregate_attendance(&narrowed).into_vec();
    for term in terms {
        summaries = filter_by_search_term(&summaries, term);
    }

    tracing::debug!(
        criteria = criteria.len(),
        records = narrowed.len(),
        summaries = summaries.len(),
        "derived attendance view"
    );
    Ok(AttendanceView {
        records: narrowed,
        summaries,
    })
}

/// All criteria, search included, narrow the payments before they are totalled.
pub fn derive_fee_view(payments: &[FeePayment], criteria: &[FilterCriteria]) -> Result<FeeView> {
    let mut narrowed = payments.to_vec();
    for criterion in criteria {
        narrowed = apply_criterion(&narrowed, criterion)?;
    }
    let totals = fee_totals(&narrowed);
    tracing::debug!(
        payments = narrowed.len(),
        grand_total = %totals.grand_total,
        "derived fee view"
    );
    Ok(FeeView {
        payments: narrowed,
        totals,
    })
}

/// Dashboard tally over the unfiltered records.
pub fn today_snapshot(
    records: &[AttendanceRecord],
    today: NaiveDate,
    scope: TotalScope,
) -> DaySnapshot {
    snapshot_for_date(records, today, scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::filter::MonthYear;
    use crate::models::{AttendancePercentage, Mark, PaymentMode};
    use rust_decimal::Decimal;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn record(student_id: &str, name: &str, class_date: &str, mark: Mark) -> AttendanceRecord {
        AttendanceRecord {
            student_id: student_id.to_string(),
            student_name: name.to_string(),
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
            record("S1", "Asha Verma", "2024-01-01", Mark::Present),
            record("S1", "Asha Verma", "2024-01-02", Mark::Absent),
            record("S2", "Ravi Kumar", "2024-01-01", Mark::Present),
        ]
    }

    fn payment(name: &str, amount: i64, mode: PaymentMode, date: &str) -> FeePayment {
        FeePayment {
            session_id: "2024-25".to_string(),
            student_id: name.to_lowercase(),
            student_name: name.to_string(),
            class_id: "5".to_string(),
            section: "A".to_string(),
            amount: Decimal::new(amount, 0),
            payment_date: day(date),
            payment_mode: mode,
            remark: String::new(),
            transaction_id: None,
        }
    }

    #[test]
    fn month_view_matches_full_view_for_single_month_data() {
        let january = derive_view(
            &sample(),
            &[FilterCriteria::Month(MonthYear::new(1, 2024).unwrap())],
        )
        .unwrap();
        assert_eq!(january.records.len(), 3);
        assert_eq!(january, derive_view(&sample(), &[]).unwrap());

        let february = derive_view(
            &sample(),
            &[FilterCriteria::Month(MonthYear::new(2, 2024).unwrap())],
        )
        .unwrap();
        assert!(february.records.is_empty());
        assert!(february.summaries.is_empty());
    }

    #[test]
    fn search_keeps_class_wide_denominator() {
        let view = derive_view(&sample(), &[FilterCriteria::Search("ravi".to_string())]).unwrap();
        assert_eq!(view.summaries.len(), 1);
        let ravi = &view.summaries[0];
        assert_eq!(ravi.student_id, "S2");
        assert_eq!(ravi.unique_date_count, 2);
        assert_eq!(ravi.attendance_percentage, AttendancePercentage::Percent(50));
        assert_eq!(view.records.len(), 3);
    }

    #[test]
    fn exact_date_view_recomputes_percentages() {
        let view = derive_view(&sample(), &[FilterCriteria::ExactDate(day("2024-01-02"))]).unwrap();
        assert_eq!(view.summaries.len(), 1);
        assert_eq!(view.summaries[0].unique_date_count, 1);
        assert_eq!(
            view.summaries[0].attendance_percentage,
            AttendancePercentage::Percent(0)
        );
    }

    #[test]
    fn reversed_range_surfaces_invalid_range() {
        let err = derive_view(
            &sample(),
            &[FilterCriteria::DateRange {
                start: day("2024-05-10"),
                end: day("2024-05-01"),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRange { .. }));
    }

    #[test]
    fn one_day_range_is_refused_not_computed() {
        let criteria: Vec<FilterCriteria> = serde_json::from_str(
            r#"[{"DateRange":{"start":"2024-01-01","end":"2024-01-01"}}]"#,
        )
        .unwrap();
        assert_eq!(
            derive_view(&sample(), &criteria).unwrap_err(),
            LedgerError::SingleDayRange {
                date: day("2024-01-01")
            }
        );
        assert!(matches!(
            derive_view(&[], &criteria),
            Err(LedgerError::SingleDayRange { .. })
        ));
        assert!(matches!(
            derive_fee_view(&[], &criteria),
            Err(LedgerError::SingleDayRange { .. })
        ));
    }

    #[test]
    fn fee_view_totals_follow_filters() {
        let payments = vec![
            payment("Asha", 500, PaymentMode::Cash, "2024-04-01"),
            payment("Ravi", 300, PaymentMode::Upi, "2024-04-15"),
            payment("Asha", 200, PaymentMode::Cheque, "2024-05-02"),
        ];
        let april = derive_fee_view(
            &payments,
            &[FilterCriteria::Month(MonthYear::new(4, 2024).unwrap())],
        )
        .unwrap();
        assert_eq!(april.payments.len(), 2);
        assert_eq!(april.totals.grand_total, Decimal::new(800, 0));

        let asha = derive_fee_view(&payments, &[FilterCriteria::Search("asha".to_string())]).unwrap();
        assert_eq!(asha.totals.cash_total, Decimal::new(500, 0));
        assert_eq!(asha.totals.cheque_total, Decimal::new(200, 0));
        assert_eq!(asha.totals.online_total, Decimal::ZERO);
    }

    #[test]
    fn payment_search_matches_transaction_ids() {
        let mut upi = payment("Ravi", 300, PaymentMode::Upi, "2024-04-15");
        upi.transaction_id = Some("TXN-8841".to_string());
        let payments = vec![payment("Asha", 500, PaymentMode::Cash, "2024-04-01"), upi];
        let view = derive_fee_view(&payments, &[FilterCriteria::Search("txn-88".to_string())]).unwrap();
        assert_eq!(view.payments.len(), 1);
        assert_eq!(view.payments[0].student_name, "Ravi");
    }
}
