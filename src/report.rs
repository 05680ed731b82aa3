use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::AttendanceError;
use crate::session::{roll_sort_key, AttendanceStatus, RosterEntry};
use crate::store::RecordStore;

/// Per-student summary over a queried range. Derived on every request, never
/// cached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub student_id: String,
    pub student_name: String,
    pub roll_number: String,
    pub present_count: u32,
    pub absent_count: u32,
    pub late_count: u32,
    pub total_days: u32,
    pub present_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    present: u32,
    absent: u32,
    late: u32,
}

/// Summarise committed records for one class over [start, end], inclusive on
/// both ends. Every enrolled student gets a row, zeros included; days with no
/// record for a student are excluded from total_days, not counted as absent.
/// Rows follow roster order.
pub fn aggregate<S: RecordStore>(
    store: &S,
    class_id: &str,
    roster: &[RosterEntry],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<ReportRow>, AttendanceError> {
    if start > end {
        return Err(AttendanceError::InvalidRange { start, end });
    }

    let records = store.query_range(class_id, start, end)?;
    let mut tallies: HashMap<&str, Tally> = HashMap::with_capacity(roster.len());
    for record in &records {
        let tally = tallies.entry(record.student_id.as_str()).or_default();
        match record.status {
            AttendanceStatus::Present => tally.present += 1,
            AttendanceStatus::Absent => tally.absent += 1,
            AttendanceStatus::Late => tally.late += 1,
            AttendanceStatus::NotMarked => {}
        }
    }

    Ok(roster
        .iter()
        .map(|student| {
            let tally = tallies
                .get(student.id.as_str())
                .copied()
                .unwrap_or_default();
            let total_days = tally.present + tally.absent + tally.late;
            let present_ratio = if total_days > 0 {
                f64::from(tally.present) / f64::from(total_days)
            } else {
                0.0
            };
            ReportRow {
                student_id: student.id.clone(),
                student_name: student.name.clone(),
                roll_number: student.roll_number.clone(),
                present_count: tally.present,
                absent_count: tally.absent,
                late_count: tally.late,
                total_days,
                present_ratio,
            }
        })
        .collect())
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Deterministic CSV encoding: fixed column order, header always emitted, rows
/// ordered by roll number ascending (numeric-aware), ties by student id. The
/// ratio is rendered with two decimals and can never be NaN or Infinity.
pub fn to_csv(rows: &[ReportRow]) -> String {
    let mut ordered: Vec<&ReportRow> = rows.iter().collect();
    ordered.sort_by(|a, b| {
        roll_sort_key(&a.roll_number)
            .cmp(&roll_sort_key(&b.roll_number))
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    let mut csv = String::from(
        "student_name,roll_number,present_count,absent_count,late_count,total_days,present_ratio\n",
    );
    for row in ordered {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{:.2}\n",
            csv_quote(&row.student_name),
            csv_quote(&row.roll_number),
            row.present_count,
            row.absent_count,
            row.late_count,
            row.total_days,
            row.present_ratio
        ));
    }
    csv
}

/// Suggested filename for the export sink. The class name is reduced to
/// filesystem-safe characters.
pub fn report_filename(class_name: &str, start: NaiveDate, end: NaiveDate) -> String {
    let safe: String = class_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attendance_report_{}_{}_{}.csv",
        safe,
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}
