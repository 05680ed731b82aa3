use chrono::NaiveDate;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::error::AttendanceError;
use crate::session::{roll_sort_key, AttendanceRecord, AttendanceStatus, RosterEntry};

/// Durable home for attendance records. The store is the sole arbiter of
/// conflicting writes: last committed record wins per (student, class, date).
pub trait RecordStore {
    fn get(&self, class_id: &str, date: NaiveDate) -> Result<Vec<AttendanceRecord>, AttendanceError>;

    /// Insert or replace every record for (class_id, date) in one transaction.
    /// Either all records land or none do.
    fn upsert_all(
        &self,
        class_id: &str,
        date: NaiveDate,
        records: &[AttendanceRecord],
    ) -> Result<(), AttendanceError>;

    /// All records for the class with date in [start, end], inclusive on both
    /// ends.
    fn query_range(
        &self,
        class_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError>;
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn store_err(e: rusqlite::Error) -> AttendanceError {
    AttendanceError::StoreUnavailable {
        message: e.to_string(),
    }
}

fn record_from_row(
    student_id: String,
    class_id: String,
    date_raw: String,
    status_raw: String,
) -> Result<AttendanceRecord, AttendanceError> {
    let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d").map_err(|_| {
        AttendanceError::Validation {
            message: format!("stored date '{}' is not YYYY-MM-DD", date_raw),
        }
    })?;
    let status = AttendanceStatus::parse(&status_raw).map_err(|_| AttendanceError::Validation {
        message: format!("stored status '{}' is not a known status", status_raw),
    })?;
    Ok(AttendanceRecord {
        student_id,
        class_id,
        date,
        status,
    })
}

pub struct SqliteRecordStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecordStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SqliteRecordStore { conn }
    }

    fn select(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let mut stmt = self.conn.prepare(sql).map_err(store_err)?;
        let raw = stmt
            .query_map(params, |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(store_err)?;
        raw.into_iter()
            .map(|(student_id, class_id, date_raw, status_raw)| {
                record_from_row(student_id, class_id, date_raw, status_raw)
            })
            .collect()
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn get(&self, class_id: &str, date: NaiveDate) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        self.select(
            "SELECT student_id, class_id, date, status
             FROM attendance_records
             WHERE class_id = ? AND date = ?",
            &[&class_id, &iso(date)],
        )
    }

    fn upsert_all(
        &self,
        class_id: &str,
        date: NaiveDate,
        records: &[AttendanceRecord],
    ) -> Result<(), AttendanceError> {
        let tx = self.conn.unchecked_transaction().map_err(store_err)?;
        let date_text = iso(date);
        for record in records {
            // One commit is one (class, date) unit of work; records outside it
            // must not ride along.
            if record.class_id != class_id || record.date != date {
                return Err(AttendanceError::Validation {
                    message: format!(
                        "record for student {} targets {}/{}, not the committed {}/{}",
                        record.student_id,
                        record.class_id,
                        iso(record.date),
                        class_id,
                        date_text
                    ),
                });
            }
            tx.execute(
                "INSERT INTO attendance_records(class_id, student_id, date, status)
                 VALUES(?, ?, ?, ?)
                 ON CONFLICT(class_id, student_id, date) DO UPDATE SET
                   status = excluded.status",
                (&class_id, &record.student_id, &date_text, record.status.as_str()),
            )
            .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)
    }

    fn query_range(
        &self,
        class_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        // ISO dates compare correctly as text, so BETWEEN keeps both ends
        // inclusive.
        self.select(
            "SELECT student_id, class_id, date, status
             FROM attendance_records
             WHERE class_id = ? AND date BETWEEN ? AND ?
             ORDER BY date, student_id",
            &[&class_id, &iso(start), &iso(end)],
        )
    }
}

/// Ordered roster for a class: numeric roll numbers first in numeric order,
/// the rest lexicographic, ties by student id.
pub fn list_class_students(
    conn: &Connection,
    class_id: &str,
) -> Result<Vec<RosterEntry>, AttendanceError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, roll_number
             FROM students
             WHERE class_id = ?",
        )
        .map_err(store_err)?;
    let mut roster = stmt
        .query_map([class_id], |r| {
            Ok(RosterEntry {
                id: r.get(0)?,
                name: r.get(1)?,
                roll_number: r.get(2)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(store_err)?;
    roster.sort_by(|a, b| {
        roll_sort_key(&a.roll_number)
            .cmp(&roll_sort_key(&b.roll_number))
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(roster)
}

/// Delivery boundary for generated exports. The core only produces bytes and a
/// suggested filename; the sink owns getting them to the user.
pub trait ExportSink {
    /// Returns the location the export landed at, as a display string.
    fn deliver(&self, filename: &str, bytes: &[u8]) -> Result<String, AttendanceError>;
}

pub struct FileExportSink {
    dir: PathBuf,
}

impl FileExportSink {
    pub fn new(dir: &Path) -> Self {
        FileExportSink {
            dir: dir.to_path_buf(),
        }
    }
}

impl ExportSink for FileExportSink {
    fn deliver(&self, filename: &str, bytes: &[u8]) -> Result<String, AttendanceError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| AttendanceError::StoreUnavailable {
            message: format!("create export dir: {}", e),
        })?;
        let path = self.dir.join(filename);
        std::fs::write(&path, bytes).map_err(|e| AttendanceError::StoreUnavailable {
            message: format!("write export: {}", e),
        })?;
        Ok(path.to_string_lossy().to_string())
    }
}
