use crate::error::AttendanceError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::reconcile;
use crate::session::{AttendanceSession, AttendanceStatus, RosterEntry};
use crate::store::{self, RecordStore, SqliteRecordStore};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn core(e: AttendanceError) -> Self {
        HandlerErr {
            code: e.code(),
            message: e.message(),
            details: None,
        }
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn get_required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| HandlerErr {
        code: "bad_params",
        message: format!("{} must be YYYY-MM-DD", key),
        details: Some(json!({ key: raw })),
    })
}

fn class_exists(conn: &Connection, class_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })
}

/// Seed a session for (class, date) from the roster and any committed records.
fn load_day(
    conn: &Connection,
    class_id: &str,
    date: NaiveDate,
) -> Result<(Vec<RosterEntry>, AttendanceSession), HandlerErr> {
    if !class_exists(conn, class_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "class not found".to_string(),
            details: None,
        });
    }
    let roster = store::list_class_students(conn, class_id).map_err(HandlerErr::core)?;
    let existing = SqliteRecordStore::new(conn)
        .get(class_id, date)
        .map_err(HandlerErr::core)?;
    let session = AttendanceSession::load(class_id, date, &roster, &existing);
    Ok((roster, session))
}

fn day_rows(roster: &[RosterEntry], session: &AttendanceSession) -> Vec<serde_json::Value> {
    roster
        .iter()
        .map(|student| {
            let status = session
                .status_of(&student.id)
                .unwrap_or(AttendanceStatus::NotMarked);
            json!({
                "studentId": student.id,
                "name": student.name,
                "rollNumber": student.roll_number,
                "status": status.as_str()
            })
        })
        .collect()
}

fn attendance_day_get(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = get_required_date(params, "date")?;
    let (roster, session) = load_day(conn, &class_id, date)?;
    Ok(json!({
        "classId": class_id,
        "date": date.format("%Y-%m-%d").to_string(),
        "rows": day_rows(&roster, &session)
    }))
}

fn handle_day_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_day_get(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let opened = {
        let Some(conn) = state.db.as_ref() else {
            return err(&req.id, "no_workspace", "select a workspace first", None);
        };
        let class_id = match get_required_str(&req.params, "classId") {
            Ok(v) => v,
            Err(e) => return e.response(&req.id),
        };
        let date = match get_required_date(&req.params, "date") {
            Ok(v) => v,
            Err(e) => return e.response(&req.id),
        };
        match load_day(conn, &class_id, date) {
            Ok(v) => v,
            Err(e) => return e.response(&req.id),
        }
    };
    let (roster, session) = opened;

    let session_id = Uuid::new_v4().to_string();
    let resp = ok(
        &req.id,
        json!({
            "sessionId": session_id,
            "classId": session.class_id(),
            "date": session.date().format("%Y-%m-%d").to_string(),
            "rows": day_rows(&roster, &session)
        }),
    );
    state.sessions.insert(session_id, session);
    resp
}

fn handle_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session_id = match get_required_str(&req.params, "sessionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match get_required_str(&req.params, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let status_raw = match get_required_str(&req.params, "status") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let status = match AttendanceStatus::parse(&status_raw) {
        Ok(v) => v,
        Err(e) => return HandlerErr::core(e).response(&req.id),
    };

    let Some(session) = state.sessions.get_mut(&session_id) else {
        return err(&req.id, "not_found", "session not found", None);
    };
    match session.set_status(&student_id, status) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => HandlerErr::core(e).response(&req.id),
    }
}

fn handle_session_commit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session_id = match get_required_str(&req.params, "sessionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    // The session is spent once commit is attempted; a failed commit needs a
    // fresh sessionOpen.
    let Some(session) = state.sessions.remove(&session_id) else {
        return err(&req.id, "not_found", "session not found", None);
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let date_text = session.date().format("%Y-%m-%d").to_string();
    let snapshot = session.snapshot();
    let translated = match reconcile::reconcile(&snapshot) {
        Ok(v) => v,
        // Empty roster at load time: valid session, nothing to record.
        Err(AttendanceError::EmptySession) => {
            return ok(
                &req.id,
                json!({
                    "classId": session.class_id(),
                    "date": date_text,
                    "recordsWritten": 0
                }),
            )
        }
        Err(e) => return HandlerErr::core(e).response(&req.id),
    };

    let store = SqliteRecordStore::new(conn);
    match reconcile::commit(&store, session.class_id(), session.date(), &translated) {
        Ok(written) => ok(
            &req.id,
            json!({
                "classId": session.class_id(),
                "date": date_text,
                "recordsWritten": written
            }),
        ),
        Err(e) => HandlerErr::core(e).response(&req.id),
    }
}

fn handle_session_discard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session_id = match get_required_str(&req.params, "sessionId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match state.sessions.remove(&session_id) {
        Some(_) => ok(&req.id, json!({ "ok": true })),
        None => err(&req.id, "not_found", "session not found", None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.dayGet" => Some(handle_day_get(state, req)),
        "attendance.sessionOpen" => Some(handle_session_open(state, req)),
        "attendance.setStatus" => Some(handle_set_status(state, req)),
        "attendance.sessionCommit" => Some(handle_session_commit(state, req)),
        "attendance.sessionDiscard" => Some(handle_session_discard(state, req)),
        _ => None,
    }
}
