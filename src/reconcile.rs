use chrono::NaiveDate;

use crate::error::AttendanceError;
use crate::session::{AttendanceRecord, AttendanceStatus};
use crate::store::RecordStore;

/// Translate a session snapshot into the statuses that will be persisted.
///
/// Policy: unmarked students are recorded absent. Every entry in the snapshot
/// survives translation; nothing is dropped silently. An empty snapshot means
/// the enrolled set was empty at load time and is reported as `EmptySession`
/// so the caller can tell "nothing to record" apart from a failed translation.
pub fn reconcile(
    snapshot: &[(String, AttendanceStatus)],
) -> Result<Vec<(String, AttendanceStatus)>, AttendanceError> {
    if snapshot.is_empty() {
        return Err(AttendanceError::EmptySession);
    }
    Ok(snapshot
        .iter()
        .map(|(student_id, status)| {
            let translated = match status {
                AttendanceStatus::NotMarked => AttendanceStatus::Absent,
                other => *other,
            };
            (student_id.clone(), translated)
        })
        .collect())
}

/// Upsert the translated set for (class_id, date) as one all-or-nothing write.
///
/// Repeating an identical commit leaves the store in the same state: the
/// (student, class, date) key is replaced, never duplicated. Returns the
/// number of records written.
pub fn commit<S: RecordStore>(
    store: &S,
    class_id: &str,
    date: NaiveDate,
    translated: &[(String, AttendanceStatus)],
) -> Result<usize, AttendanceError> {
    let mut records = Vec::with_capacity(translated.len());
    for (student_id, status) in translated {
        if !status.is_persistable() {
            return Err(AttendanceError::Validation {
                message: format!(
                    "status '{}' for student {} cannot be persisted",
                    status.as_str(),
                    student_id
                ),
            });
        }
        records.push(AttendanceRecord {
            student_id: student_id.clone(),
            class_id: class_id.to_string(),
            date,
            status: *status,
        });
    }
    store.upsert_all(class_id, date, &records)?;
    Ok(records.len())
}
