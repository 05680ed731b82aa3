use chrono::NaiveDate;

/// Failures surfaced by the attendance core. All are local and synchronous;
/// nothing here is retried internally.
#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceError {
    /// Student is not a member of the session's enrolled set.
    InvalidStudent { student_id: String },
    /// Status string is outside the known enum.
    InvalidStatus { value: String },
    /// The enrolled set was empty at load time; there is nothing to record.
    EmptySession,
    /// A translated record failed validation before the store was touched.
    Validation { message: String },
    /// The durable layer could not be reached or rejected the write.
    StoreUnavailable { message: String },
    /// Report range with start_date after end_date.
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::InvalidStudent { .. } => "invalid_student",
            AttendanceError::InvalidStatus { .. } => "invalid_status",
            AttendanceError::EmptySession => "empty_session",
            AttendanceError::Validation { .. } => "validation_failed",
            AttendanceError::StoreUnavailable { .. } => "store_unavailable",
            AttendanceError::InvalidRange { .. } => "invalid_range",
        }
    }

    pub fn message(&self) -> String {
        match self {
            AttendanceError::InvalidStudent { student_id } => {
                format!("student {} is not enrolled in this session", student_id)
            }
            AttendanceError::InvalidStatus { value } => {
                format!(
                    "status must be one of: present, absent, late, not_marked (got '{}')",
                    value
                )
            }
            AttendanceError::EmptySession => "session has no enrolled students".to_string(),
            AttendanceError::Validation { message } => message.clone(),
            AttendanceError::StoreUnavailable { message } => message.clone(),
            AttendanceError::InvalidRange { start, end } => {
                format!(
                    "start date {} is after end date {}",
                    start.format("%Y-%m-%d"),
                    end.format("%Y-%m-%d")
                )
            }
        }
    }
}
