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

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
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
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false));
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    for (id, method) in [
        ("1", "sections.list"),
        ("2", "attendance.record"),
        ("3", "reports.sf2Model"),
        ("4", "exports.sf2Xlsx"),
        ("5", "risk.sectionAssessment"),
    ] {
        let resp = request(&mut stdin, &mut reader, id, method, json!({}));
        assert_eq!(error_code(&resp), "no_workspace", "{}", method);
    }
    let _ = child.kill();
}

#[test]
fn unknown_methods_are_reported() {
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    let resp = request(&mut stdin, &mut reader, "1", "attendance.unknown", json!({}));
    assert_eq!(error_code(&resp), "not_implemented");
    let _ = child.kill();
}

#[test]
fn validation_rejects_bad_input_before_aggregation() {
    let workspace = temp_dir("attendanced-validation");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let section = request_ok(
        &mut stdin,
        &mut reader,
        "sec",
        "sections.create",
        json!({ "name": "Adelfa", "gradeLevel": "Grade 5", "schoolYear": "2023-2024" }),
    );
    let section_id = section
        .get("sectionId")
        .and_then(|v| v.as_str())
        .expect("sectionId")
        .to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "st",
        "students.enroll",
        json!({
            "sectionId": section_id,
            "lastName": "Reyes",
            "firstName": "Ana",
            "gender": "female"
        }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    // Month out of range.
    let resp = request(
        &mut stdin,
        &mut reader,
        "m13",
        "reports.sf2Model",
        json!({ "sectionId": section_id, "year": 2024, "month": 13 }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    // Year out of range.
    let resp = request(
        &mut stdin,
        &mut reader,
        "y1980",
        "reports.sf2Model",
        json!({ "sectionId": section_id, "year": 1980, "month": 3 }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    // Missing section reference fails the whole report.
    let resp = request(
        &mut stdin,
        &mut reader,
        "nosec",
        "reports.sf2Model",
        json!({ "sectionId": "missing", "year": 2024, "month": 3 }),
    );
    assert_eq!(error_code(&resp), "not_found");

    // Bad status string is rejected by the closed status set.
    let resp = request(
        &mut stdin,
        &mut reader,
        "badstatus",
        "attendance.record",
        json!({
            "sectionId": section_id,
            "studentId": student_id,
            "date": "2024-03-04",
            "status": "excused"
        }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    // Bad date format.
    let resp = request(
        &mut stdin,
        &mut reader,
        "baddate",
        "attendance.record",
        json!({
            "sectionId": section_id,
            "studentId": student_id,
            "date": "03/04/2024",
            "status": "absent"
        }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    // Unknown gender at enrollment.
    let resp = request(
        &mut stdin,
        &mut reader,
        "badgender",
        "students.enroll",
        json!({
            "sectionId": section_id,
            "lastName": "Tan",
            "firstName": "Jo",
            "gender": "other"
        }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    let _ = child.kill();
}

#[test]
fn record_upserts_latest_status_for_a_day() {
    let workspace = temp_dir("attendanced-upsert");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let section_id = request_ok(
        &mut stdin,
        &mut reader,
        "sec",
        "sections.create",
        json!({ "name": "Adelfa", "gradeLevel": "Grade 5", "schoolYear": "2023-2024" }),
    )
    .get("sectionId")
    .and_then(|v| v.as_str())
    .expect("sectionId")
    .to_string();
    let student_id = request_ok(
        &mut stdin,
        &mut reader,
        "st",
        "students.enroll",
        json!({
            "sectionId": section_id,
            "lastName": "Reyes",
            "firstName": "Ana",
            "gender": "female"
        }),
    )
    .get("studentId")
    .and_then(|v| v.as_str())
    .expect("studentId")
    .to_string();

    // First the scanner marks her late, then the teacher corrects to absent.
    for (i, status) in ["late", "absent"].iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("mark{}", i),
            "attendance.record",
            json!({
                "sectionId": section_id,
                "studentId": student_id,
                "date": "2024-03-05",
                "status": status
            }),
        );
    }

    let month = request_ok(
        &mut stdin,
        &mut reader,
        "month",
        "attendance.monthOpen",
        json!({ "sectionId": section_id, "year": 2024, "month": 3 }),
    );
    let row = month
        .pointer("/female/rows/0")
        .expect("female row");
    assert_eq!(row.get("absentCount").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(row.get("tardyCount").and_then(|v| v.as_u64()), Some(0));

    let _ = child.kill();
}

#[test]
fn bulk_record_skips_students_outside_the_section() {
    let workspace = temp_dir("attendanced-bulk");
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let section_id = request_ok(
        &mut stdin,
        &mut reader,
        "sec",
        "sections.create",
        json!({ "name": "Adelfa", "gradeLevel": "Grade 5", "schoolYear": "2023-2024" }),
    )
    .get("sectionId")
    .and_then(|v| v.as_str())
    .expect("sectionId")
    .to_string();
    let student_id = request_ok(
        &mut stdin,
        &mut reader,
        "st",
        "students.enroll",
        json!({
            "sectionId": section_id,
            "lastName": "Reyes",
            "firstName": "Ana",
            "gender": "female"
        }),
    )
    .get("studentId")
    .and_then(|v| v.as_str())
    .expect("studentId")
    .to_string();

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "bulk",
        "attendance.bulkRecord",
        json!({
            "sectionId": section_id,
            "date": "2024-03-05",
            "entries": [
                { "studentId": student_id, "status": "present" },
                { "studentId": "not-enrolled", "status": "absent" }
            ]
        }),
    );
    assert_eq!(result.get("applied").and_then(|v| v.as_u64()), Some(1));

    let _ = child.kill();
}
