use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::report;
use crate::store::{self, ExportSink, FileExportSink, SqliteRecordStore};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::PathBuf;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn required_date(req: &Request, key: &str) -> Result<NaiveDate, serde_json::Value> {
    let raw = required_str(req, key)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be YYYY-MM-DD", key),
            Some(json!({ key: raw })),
        )
    })
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn class_name(conn: &Connection, req: &Request, class_id: &str) -> Result<String, serde_json::Value> {
    conn.query_row(
        "SELECT name FROM classes WHERE id = ?",
        [class_id],
        |r| r.get::<_, String>(0),
    )
    .optional()
    .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?
    .ok_or_else(|| err(&req.id, "not_found", "class not found", None))
}

fn aggregate_rows(
    conn: &Connection,
    req: &Request,
    class_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<report::ReportRow>, serde_json::Value> {
    let roster = store::list_class_students(conn, class_id)
        .map_err(|e| err(&req.id, e.code(), e.message(), None))?;
    report::aggregate(&SqliteRecordStore::new(conn), class_id, &roster, start, end)
        .map_err(|e| err(&req.id, e.code(), e.message(), None))
}

fn handle_report_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let start = match required_date(req, "startDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let end = match required_date(req, "endDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match class_name(conn, req, &class_id) {
        Ok(v) => v,
        Err(e) => return e,
    };

    match aggregate_rows(conn, req, &class_id, start, end) {
        Ok(rows) => ok(
            &req.id,
            json!({
                "classId": class_id,
                "className": name,
                "startDate": start.format("%Y-%m-%d").to_string(),
                "endDate": end.format("%Y-%m-%d").to_string(),
                "rows": rows
            }),
        ),
        Err(e) => e,
    }
}

fn handle_report_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let start = match required_date(req, "startDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let end = match required_date(req, "endDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_dir = match required_str(req, "outDir") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let name = match class_name(conn, req, &class_id) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let rows = match aggregate_rows(conn, req, &class_id, start, end) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let csv = report::to_csv(&rows);
    let filename = report::report_filename(&name, start, end);
    let sink = FileExportSink::new(&out_dir);
    match sink.deliver(&filename, csv.as_bytes()) {
        Ok(path) => ok(
            &req.id,
            json!({
                "filename": filename,
                "path": path,
                "rowsExported": rows.len()
            }),
        ),
        Err(e) => err(&req.id, e.code(), e.message(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.reportModel" => Some(handle_report_model(state, req)),
        "attendance.reportCsv" => Some(handle_report_csv(state, req)),
        _ => None,
    }
}
