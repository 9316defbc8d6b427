use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::risk;
use crate::sf2::DayStatus;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

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

fn parse_as_of(params: &serde_json::Value) -> Result<NaiveDate, HandlerErr> {
    match params.get("asOf").and_then(|v| v.as_str()) {
        None => Ok(chrono::Local::now().date_naive()),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| HandlerErr {
            code: "bad_params",
            message: "asOf must be a YYYY-MM-DD date".to_string(),
            details: Some(json!({ "asOf": raw })),
        }),
    }
}

#[derive(Debug, Clone)]
struct RosterEntry {
    id: String,
    display_name: String,
    gender: String,
}

fn load_roster(conn: &Connection, section_id: &str) -> Result<Vec<RosterEntry>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, last_name, first_name, gender
             FROM students
             WHERE section_id = ? AND active = 1
             ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    stmt.query_map([section_id], |r| {
        let last: String = r.get(1)?;
        let first: String = r.get(2)?;
        Ok(RosterEntry {
            id: r.get(0)?,
            display_name: format!("{}, {}", last, first),
            gender: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })
}

fn load_window_statuses(
    conn: &Connection,
    section_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<HashMap<String, HashMap<NaiveDate, DayStatus>>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT student_id, date, status
             FROM attendance_records
             WHERE section_id = ? AND date >= ? AND date <= ?",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let rows = stmt
        .query_map(
            (
                section_id,
                from.format("%Y-%m-%d").to_string(),
                to.format("%Y-%m-%d").to_string(),
            ),
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    let mut by_student: HashMap<String, HashMap<NaiveDate, DayStatus>> = HashMap::new();
    for (student_id, date, status) in rows {
        let Ok(date) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else {
            continue;
        };
        let Some(status) = DayStatus::from_db_str(&status) else {
            return Err(HandlerErr {
                code: "bad_status",
                message: "attendance record has an unknown status".to_string(),
                details: Some(json!({ "studentId": student_id, "date": date.to_string() })),
            });
        };
        by_student.entry(student_id).or_default().insert(date, status);
    }
    Ok(by_student)
}

fn section_assessment(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_str(params, "sectionId")?;
    let as_of = parse_as_of(params)?;

    let exists = conn
        .query_row("SELECT 1 FROM sections WHERE id = ?", [&section_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?
        .is_some();
    if !exists {
        return Err(HandlerErr {
            code: "not_found",
            message: "section not found".to_string(),
            details: None,
        });
    }

    let roster = load_roster(conn, &section_id)?;
    let window = risk::trailing_school_days(as_of, risk::WINDOW_SCHOOL_DAYS);
    let empty = HashMap::new();
    let statuses = match window.first() {
        Some(first) => load_window_statuses(conn, &section_id, *first, as_of)?,
        None => HashMap::new(),
    };

    let mut rows: Vec<(risk::RiskTier, risk::WindowStats, RosterEntry)> = roster
        .into_iter()
        .map(|student| {
            let per_day = statuses.get(&student.id).unwrap_or(&empty);
            let stats = risk::window_stats(&window, per_day);
            let tier = risk::risk_tier(&stats);
            (tier, stats, student)
        })
        .collect();
    // Highest risk first; ties broken by worse attendance, then name.
    rows.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(
                a.1.attendance_rate
                    .partial_cmp(&b.1.attendance_rate)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then_with(|| a.2.display_name.cmp(&b.2.display_name))
    });

    let students: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(tier, stats, student)| {
            json!({
                "studentId": student.id,
                "displayName": student.display_name,
                "gender": student.gender,
                "tier": tier,
                "window": stats,
            })
        })
        .collect();

    Ok(json!({
        "sectionId": section_id,
        "asOf": as_of.format("%Y-%m-%d").to_string(),
        "windowSchoolDays": window.len(),
        "students": students,
    }))
}

fn handle_section_assessment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match section_assessment(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "risk.sectionAssessment" => Some(handle_section_assessment(state, req)),
        _ => None,
    }
}
