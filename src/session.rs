use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::AttendanceError;

/// Per-day attendance state for one student. `NotMarked` exists only inside a
/// session; persisted records carry Present/Absent/Late.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    NotMarked,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::NotMarked => "not_marked",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AttendanceError> {
        match value {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "not_marked" => Ok(AttendanceStatus::NotMarked),
            other => Err(AttendanceError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }

    pub fn is_persistable(self) -> bool {
        self != AttendanceStatus::NotMarked
    }
}

/// One durable attendance fact. At most one record exists per
/// (student_id, class_id, date); the triple is the natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

/// Roster entry as the enrollment query reports it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
    pub roll_number: String,
}

/// Sort key for roll numbers: numeric rolls order numerically, everything else
/// falls back to the raw string, ties resolved by the caller.
pub fn roll_sort_key(roll_number: &str) -> (u8, u64, String) {
    match roll_number.trim().parse::<u64>() {
        Ok(n) => (0, n, roll_number.to_string()),
        Err(_) => (1, 0, roll_number.to_string()),
    }
}

/// Editable working set for exactly one (class, date) pair. Every enrolled
/// student always has a status entry. Never persisted; owned by whoever
/// created it and discarded on commit or navigation away.
#[derive(Debug, Clone)]
pub struct AttendanceSession {
    class_id: String,
    date: NaiveDate,
    order: Vec<String>,
    statuses: HashMap<String, AttendanceStatus>,
}

impl AttendanceSession {
    /// Seed a fresh session: existing records overlay `NotMarked` defaults.
    /// Students with no existing record are not errors. Records for students
    /// no longer on the roster are ignored.
    pub fn load(
        class_id: &str,
        date: NaiveDate,
        enrolled_students: &[RosterEntry],
        existing_records: &[AttendanceRecord],
    ) -> Self {
        let mut statuses = HashMap::with_capacity(enrolled_students.len());
        let mut order = Vec::with_capacity(enrolled_students.len());
        for student in enrolled_students {
            order.push(student.id.clone());
            statuses.insert(student.id.clone(), AttendanceStatus::NotMarked);
        }
        for record in existing_records {
            if let Some(slot) = statuses.get_mut(&record.student_id) {
                *slot = record.status;
            }
        }
        AttendanceSession {
            class_id: class_id.to_string(),
            date,
            order,
            statuses,
        }
    }

    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Pure local mutation; no I/O. The student must be on the session roster.
    pub fn set_status(
        &mut self,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Result<(), AttendanceError> {
        match self.statuses.get_mut(student_id) {
            Some(slot) => {
                *slot = status;
                Ok(())
            }
            None => Err(AttendanceError::InvalidStudent {
                student_id: student_id.to_string(),
            }),
        }
    }

    pub fn status_of(&self, student_id: &str) -> Option<AttendanceStatus> {
        self.statuses.get(student_id).copied()
    }

    /// Current edits as an ordered (student_id, status) sequence in roster
    /// order. This is the reconciliation input.
    pub fn snapshot(&self) -> Vec<(String, AttendanceStatus)> {
        self.order
            .iter()
            .map(|id| (id.clone(), self.statuses[id]))
            .collect()
    }
}
