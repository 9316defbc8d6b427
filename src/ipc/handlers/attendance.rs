use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::sf2::{self, DayStatus};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
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

fn parse_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| HandlerErr {
        code: "bad_params",
        message: format!("{} must be a YYYY-MM-DD date", key),
        details: Some(json!({ key: raw })),
    })
}

fn parse_status(raw: &str) -> Result<DayStatus, HandlerErr> {
    DayStatus::from_db_str(raw.trim().to_ascii_lowercase().as_str()).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: "status must be one of: present, absent, late".to_string(),
        details: Some(json!({ "status": raw })),
    })
}

fn student_in_section(
    conn: &Connection,
    section_id: &str,
    student_id: &str,
) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM students WHERE section_id = ? AND id = ?",
        (section_id, student_id),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })
}

fn upsert_record(
    conn: &Connection,
    section_id: &str,
    student_id: &str,
    date: NaiveDate,
    status: DayStatus,
    remarks: Option<&str>,
) -> Result<(), HandlerErr> {
    conn.execute(
        "INSERT INTO attendance_records(section_id, student_id, date, status, remarks)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id, date) DO UPDATE SET
           section_id = excluded.section_id,
           status = excluded.status,
           remarks = excluded.remarks",
        (
            section_id,
            student_id,
            date.format("%Y-%m-%d").to_string(),
            status.as_db_str(),
            remarks,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance_records" })),
    })?;
    Ok(())
}

/// One scan or manual entry: one record per student per date, latest wins.
fn attendance_record(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_str(params, "sectionId")?;
    let student_id = get_required_str(params, "studentId")?;
    let date = parse_date(params, "date")?;
    let status = parse_status(&get_required_str(params, "status")?)?;
    let remarks = params
        .get("remarks")
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());

    if !student_in_section(conn, &section_id, &student_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found in section".to_string(),
            details: None,
        });
    }
    upsert_record(conn, &section_id, &student_id, date, status, remarks)?;
    Ok(json!({ "ok": true }))
}

fn attendance_bulk_record(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_str(params, "sectionId")?;
    let date = parse_date(params, "date")?;
    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing entries".to_string(),
            details: None,
        });
    };

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    let mut applied = 0_usize;
    for entry in entries {
        let Some(student_id) = entry.get("studentId").and_then(|v| v.as_str()) else {
            continue;
        };
        let status = parse_status(entry.get("status").and_then(|v| v.as_str()).unwrap_or(""))?;
        let remarks = entry
            .get("remarks")
            .and_then(|v| v.as_str())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty());
        if !student_in_section(&tx, &section_id, student_id)? {
            continue;
        }
        upsert_record(&tx, &section_id, student_id, date, status, remarks)?;
        applied += 1;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({ "applied": applied }))
}

/// Month model for the attendance grid UI: the same aggregation the SF2
/// report uses, served as JSON.
fn attendance_month_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, sf2::Sf2Error> {
    let section_id = params
        .get("sectionId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| sf2::Sf2Error::new("bad_params", "missing sectionId"))?;
    let year = params
        .get("year")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| sf2::Sf2Error::new("bad_params", "missing year"))? as i32;
    let month = params
        .get("month")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| sf2::Sf2Error::new("bad_params", "missing month"))? as u32;

    let ctx = sf2::Sf2Context { conn, section_id };
    let model = sf2::build_sf2_model(&ctx, year, month)?;

    Ok(json!({
        "section": model.section,
        "year": model.year,
        "month": model.month,
        "schoolDays": model.school_days,
        "male": model.male,
        "female": model.female,
    }))
}

fn handle_attendance_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_record(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_bulk_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_bulk_record(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_month_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_month_open(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => err(&req.id, &e.code, e.message, e.details),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.record" => Some(handle_attendance_record(state, req)),
        "attendance.bulkRecord" => Some(handle_attendance_bulk_record(state, req)),
        "attendance.monthOpen" => Some(handle_attendance_month_open(state, req)),
        _ => None,
    }
}
