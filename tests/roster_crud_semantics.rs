use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn result(v: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(
        v.get("ok").and_then(|b| b.as_bool()),
        Some(true),
        "expected ok response, got {}",
        v
    );
    v.get("result").expect("result")
}

fn error_code(v: &serde_json::Value) -> &str {
    assert_eq!(v.get("ok").and_then(|b| b.as_bool()), Some(false));
    v.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .expect("error code")
}

#[test]
fn students_list_orders_numeric_rolls_numerically() {
    let workspace = temp_dir("attendanced-roster-order");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    result(&request(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    ));
    let created = request(
        &mut stdin,
        &mut reader,
        "class",
        "classes.create",
        json!({ "name": "Order Class", "subject": "Math" }),
    );
    let class_id = result(&created)
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();

    for (name, roll) in [("Ten", "10"), ("Two", "2"), ("One", "1")] {
        result(&request(
            &mut stdin,
            &mut reader,
            "student",
            "students.create",
            json!({ "classId": class_id, "name": name, "rollNumber": roll }),
        ));
    }

    let listed = request(
        &mut stdin,
        &mut reader,
        "list",
        "students.list",
        json!({ "classId": class_id }),
    );
    let rolls: Vec<String> = result(&listed)
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students")
        .iter()
        .map(|s| {
            s.get("rollNumber")
                .and_then(|v| v.as_str())
                .expect("rollNumber")
                .to_string()
        })
        .collect();
    assert_eq!(rolls, vec!["1", "2", "10"]);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn deleting_a_student_removes_their_attendance_rows() {
    let workspace = temp_dir("attendanced-student-delete");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    result(&request(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    ));
    let created = request(
        &mut stdin,
        &mut reader,
        "class",
        "classes.create",
        json!({ "name": "Delete Class", "subject": "Math" }),
    );
    let class_id = result(&created)
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    let created = request(
        &mut stdin,
        &mut reader,
        "student",
        "students.create",
        json!({ "classId": class_id, "name": "Eve", "rollNumber": "1" }),
    );
    let eve = result(&created)
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    let opened = request(
        &mut stdin,
        &mut reader,
        "open",
        "attendance.sessionOpen",
        json!({ "classId": class_id, "date": "2024-01-10" }),
    );
    let session_id = result(&opened)
        .get("sessionId")
        .and_then(|v| v.as_str())
        .expect("sessionId")
        .to_string();
    result(&request(
        &mut stdin,
        &mut reader,
        "commit",
        "attendance.sessionCommit",
        json!({ "sessionId": session_id }),
    ));

    result(&request(
        &mut stdin,
        &mut reader,
        "delete",
        "students.delete",
        json!({ "classId": class_id, "studentId": eve }),
    ));

    let day = request(
        &mut stdin,
        &mut reader,
        "day",
        "attendance.dayGet",
        json!({ "classId": class_id, "date": "2024-01-10" }),
    );
    assert!(result(&day)
        .get("rows")
        .and_then(|v| v.as_array())
        .expect("rows")
        .is_empty());

    drop(stdin);
    let _ = child.wait();

    let conn = rusqlite::Connection::open(workspace.join("attendance.sqlite3"))
        .expect("open workspace db");
    let orphaned: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM attendance_records WHERE student_id = ?",
            [&eve],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(orphaned, 0);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn deleting_a_class_cascades_and_unknown_ids_report_not_found() {
    let workspace = temp_dir("attendanced-class-delete");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    result(&request(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    ));
    let created = request(
        &mut stdin,
        &mut reader,
        "class",
        "classes.create",
        json!({ "name": "Cascade Class", "subject": "Math" }),
    );
    let class_id = result(&created)
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    result(&request(
        &mut stdin,
        &mut reader,
        "student",
        "students.create",
        json!({ "classId": class_id, "name": "Finn", "rollNumber": "1" }),
    ));

    result(&request(
        &mut stdin,
        &mut reader,
        "delete",
        "classes.delete",
        json!({ "classId": class_id }),
    ));

    let listed = request(&mut stdin, &mut reader, "list", "classes.list", json!({}));
    assert!(result(&listed)
        .get("classes")
        .and_then(|v| v.as_array())
        .expect("classes")
        .is_empty());

    let missing_day = request(
        &mut stdin,
        &mut reader,
        "day",
        "attendance.dayGet",
        json!({ "classId": class_id, "date": "2024-01-10" }),
    );
    assert_eq!(error_code(&missing_day), "not_found");

    let missing_student = request(
        &mut stdin,
        &mut reader,
        "update",
        "students.update",
        json!({ "classId": class_id, "studentId": "nope", "patch": { "name": "X" } }),
    );
    assert_eq!(error_code(&missing_student), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
