use std::fmt::Write;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::aggregate::collected_by_student;
use crate::filter::FilterCriteria;
use crate::models::{AttendancePercentage, DaySnapshot, FeeLedgerEntry, Scope, DATE_FORMAT};
use crate::snapshot::mark_on;
use crate::view::{AttendanceView, FeeView};

pub fn criteria_label(criteria: &[FilterCriteria]) -> String {
    let parts: Vec<String> = criteria
        .iter()
        .filter_map(|criterion| match criterion {
            FilterCriteria::None => None,
            FilterCriteria::ExactDate(date) => Some(format!("on {date}")),
            FilterCriteria::DateRange { start, end } => Some(format!("from {start} to {end}")),
            FilterCriteria::Month(month) => Some(format!("in {month}")),
            FilterCriteria::Search(term) if term.is_empty() => None,
            FilterCriteria::Search(term) => Some(format!("matching \"{term}\"")),
        })
        .collect();
    if parts.is_empty() {
        "all recorded days".to_string()
    } else {
        parts.join(", ")
    }
}

/// Export file stem such as `attendance_5_A_JAN 2024_searchTerm_asha`.
pub fn export_file_name(base: &str, scope: &Scope, criteria: &[FilterCriteria]) -> String {
    let mut name = base.to_string();
    if let Some(class_id) = &scope.class_id {
        let _ = write!(name, "_{class_id}");
    }
    if let Some(section) = &scope.section {
        let _ = write!(name, "_{section}");
    }
    for criterion in criteria {
        match criterion {
            FilterCriteria::None => {}
            FilterCriteria::Month(month) => {
                let _ = write!(name, "_{month}");
            }
            FilterCriteria::ExactDate(date) => {
                let _ = write!(name, "_{}", date.format(DATE_FORMAT));
            }
            FilterCriteria::DateRange { start, end } => {
                let _ = write!(
                    name,
                    "_{}_to_{}",
                    start.format(DATE_FORMAT),
                    end.format(DATE_FORMAT)
                );
            }
            FilterCriteria::Search(term) if term.is_empty() => {}
            FilterCriteria::Search(term) => {
                let _ = write!(name, "_searchTerm_{term}");
            }
        }
    }
    name
}

pub fn build_attendance_report(
    scope: &Scope,
    criteria: &[FilterCriteria],
    view: &AttendanceView,
    today: NaiveDate,
    snapshot: &DaySnapshot,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Attendance Report");
    let _ = writeln!(
        output,
        "Generated for {} ({})",
        scope,
        criteria_label(criteria)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Today ({today})");
    let _ = writeln!(output, "- Total students: {}", snapshot.total);
    if snapshot.has_marks() {
        let _ = writeln!(output, "- Present: {}", snapshot.present);
        let _ = writeln!(output, "- Absent: {}", snapshot.absent);
        let _ = writeln!(output, "- Leave: {}", snapshot.leave);
    } else {
        let _ = writeln!(output, "No attendance marked today.");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students");

    if view.summaries.is_empty() {
        let _ = writeln!(output, "No attendance recorded for this selection.");
        return output;
    }

    let marked_day = criteria.iter().find_map(|criterion| match criterion {
        FilterCriteria::ExactDate(date) => Some(*date),
        _ => None,
    });
    let _ = write!(
        output,
        "| Student | Class | Present | Absent | Leave | Days | Attendance |"
    );
    match marked_day {
        Some(date) => {
            let _ = writeln!(output, " {} |", date.format(DATE_FORMAT));
            let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
        }
        None => {
            let _ = writeln!(output);
            let _ = writeln!(output, "|---|---|---|---|---|---|---|");
        }
    }
    let mut rows = view.summaries.clone();
    rows.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    for summary in &rows {
        let _ = write!(
            output,
            "| {} | {}-{} | {} | {} | {} | {} | {} |",
            summary.name,
            summary.class_id,
            summary.section,
            summary.present_count,
            summary.absent_count,
            summary.leave_count,
            summary.unique_date_count,
            summary.attendance_percentage
        );
        if let Some(date) = marked_day {
            let mark = mark_on(
                &view.records,
                &summary.student_id,
                &summary.class_id,
                &summary.section,
                date,
            );
            let _ = write!(output, " {} |", mark.map_or("-", |mark| mark.code()));
        }
        let _ = writeln!(output);
    }

    let mut lowest: Vec<_> = view
        .summaries
        .iter()
        .filter_map(|summary| match summary.attendance_percentage {
            AttendancePercentage::Percent(value) => Some((value, summary)),
            AttendancePercentage::Undefined => None,
        })
        .collect();
    lowest.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.name.cmp(&b.1.name)));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Lowest Attendance");
    for (value, summary) in lowest.iter().take(5) {
        let _ = writeln!(
            output,
            "- {} ({}-{}): {}% across {} days",
            summary.name, summary.class_id, summary.section, value, summary.unique_date_count
        );
    }

    output
}

pub fn build_fee_report(
    scope: &Scope,
    criteria: &[FilterCriteria],
    view: &FeeView,
    ledger: &[FeeLedgerEntry],
) -> String {
    let mut output = String::new();
    let totals = &view.totals;

    let _ = writeln!(output, "# Fee Collection Report");
    let _ = writeln!(
        output,
        "Generated for {} ({})",
        scope,
        criteria_label(criteria)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Totals");
    let _ = writeln!(output, "- Cash: {}", totals.cash_total);
    let _ = writeln!(output, "- Online (UPI + Card): {}", totals.online_total);
    let _ = writeln!(output, "- Cheque: {}", totals.cheque_total);
    let _ = writeln!(
        output,
        "- Grand total: {} across {} payments",
        totals.grand_total, totals.payment_count
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Payments");
    if view.payments.is_empty() {
        let _ = writeln!(output, "No payments recorded for this selection.");
    } else {
        for payment in &view.payments {
            let _ = writeln!(
                output,
                "- {} {} ({}-{}): {} by {}",
                payment.payment_date,
                payment.student_name,
                payment.class_id,
                payment.section,
                payment.amount,
                payment.payment_mode
            );
        }
    }

    if !ledger.is_empty() {
        let collected = collected_by_student(&view.payments);
        let _ = writeln!(output);
        let _ = writeln!(output, "## Outstanding Fees");
        let mut pending: Vec<_> = ledger
            .iter()
            .filter(|entry| entry.outstanding() > Decimal::ZERO)
            .collect();
        pending.sort_by(|a, b| b.outstanding().cmp(&a.outstanding()));
        if pending.is_empty() {
            let _ = writeln!(output, "All fees collected.");
        }
        for entry in pending {
            let _ = writeln!(
                output,
                "- {} ({}-{}): {} outstanding, {} collected in this selection",
                entry.student_name,
                entry.class_id,
                entry.section,
                entry.outstanding(),
                collected
                    .get(&entry.student_id)
                    .copied()
                    .unwrap_or(Decimal::ZERO)
            );
        }
    }

    output
}
