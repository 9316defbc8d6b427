use chrono::{Datelike, Duration, NaiveDate, Weekday};
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

fn request_ok(
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn school_days_between(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut cursor = from;
    while cursor <= to {
        if !matches!(cursor.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(cursor);
        }
        cursor += Duration::days(1);
    }
    days
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("parse date")
}

#[test]
fn section_assessment_tiers_and_ordering() {
    let workspace = temp_dir("attendanced-risk");
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

    let mut enroll = |id: &str, last: &str, first: &str| -> String {
        request_ok(
            &mut stdin,
            &mut reader,
            id,
            "students.enroll",
            json!({
                "sectionId": section_id,
                "lastName": last,
                "firstName": first,
                "gender": "male"
            }),
        )
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string()
    };
    let santos = enroll("st-a", "Santos", "Rico");
    let lim = enroll("st-b", "Lim", "Ben");
    let garcia = enroll("st-c", "Garcia", "Tina");
    let uy = enroll("st-d", "Uy", "Pablo");

    // The 30 trailing school days ending Friday 2024-03-22 start on
    // Monday 2024-02-12.
    let as_of = d("2024-03-22");
    let window = school_days_between(d("2024-02-12"), as_of);
    assert_eq!(window.len(), 30);

    // Santos: a full week absent right before as-of, present otherwise.
    let santos_absent: Vec<NaiveDate> =
        school_days_between(d("2024-03-18"), d("2024-03-22"));
    // Garcia: six scattered absences, never consecutive, present on as-of.
    let garcia_absent: Vec<NaiveDate> = [
        "2024-02-13",
        "2024-02-20",
        "2024-02-27",
        "2024-03-05",
        "2024-03-12",
        "2024-03-19",
    ]
    .iter()
    .map(|s| d(s))
    .collect();

    for (i, day) in window.iter().enumerate() {
        let date = day.format("%Y-%m-%d").to_string();
        let santos_status = if santos_absent.contains(day) {
            "absent"
        } else {
            "present"
        };
        let garcia_status = if garcia_absent.contains(day) {
            "absent"
        } else {
            "present"
        };
        // Uy gets no records at all.
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("day{}", i),
            "attendance.bulkRecord",
            json!({
                "sectionId": section_id,
                "date": date,
                "entries": [
                    { "studentId": santos, "status": santos_status },
                    { "studentId": lim, "status": "present" },
                    { "studentId": garcia, "status": garcia_status }
                ]
            }),
        );
    }

    let assessment = request_ok(
        &mut stdin,
        &mut reader,
        "risk",
        "risk.sectionAssessment",
        json!({ "sectionId": section_id, "asOf": "2024-03-22" }),
    );
    assert_eq!(
        assessment.get("windowSchoolDays").and_then(|v| v.as_u64()),
        Some(30)
    );
    let students = assessment
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students");
    assert_eq!(students.len(), 4);

    let tier_of = |idx: usize| -> (&str, &str) {
        (
            students[idx]
                .get("displayName")
                .and_then(|v| v.as_str())
                .unwrap_or(""),
            students[idx].get("tier").and_then(|v| v.as_str()).unwrap_or(""),
        )
    };

    // High tiers first, worst attendance first within the tier.
    assert_eq!(tier_of(0), ("Uy, Pablo", "high"));
    assert_eq!(tier_of(1), ("Santos, Rico", "high"));
    assert_eq!(tier_of(2), ("Garcia, Tina", "medium"));
    assert_eq!(tier_of(3), ("Lim, Ben", "low"));

    // Santos is in the 70..=85 rate band; the 5-day streak escalates him.
    let santos_row = &students[1];
    assert_eq!(
        santos_row
            .pointer("/window/consecutiveAbsences")
            .and_then(|v| v.as_u64()),
        Some(5)
    );
    let santos_rate = santos_row
        .pointer("/window/attendanceRate")
        .and_then(|v| v.as_f64())
        .expect("attendanceRate");
    assert!((santos_rate - 100.0 * 25.0 / 30.0).abs() < 1e-6);

    // Uy never attended: the whole window is one long streak.
    assert_eq!(
        students[0]
            .pointer("/window/consecutiveAbsences")
            .and_then(|v| v.as_u64()),
        Some(30)
    );

    let _ = child.kill();
}
