use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
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

fn section_exists(conn: &Connection, section_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM sections WHERE id = ?", [section_id], |r| {
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

fn parse_gender(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let gender = get_required_str(params, "gender")?.to_ascii_lowercase();
    if gender != "male" && gender != "female" {
        return Err(HandlerErr {
            code: "bad_params",
            message: "gender must be male or female".to_string(),
            details: Some(json!({ "gender": gender })),
        });
    }
    Ok(gender)
}

fn students_enroll(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_str(params, "sectionId")?;
    let last_name = get_required_str(params, "lastName")?;
    let first_name = get_required_str(params, "firstName")?;
    let gender = parse_gender(params)?;
    let lrn = params
        .get("lrn")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let active = params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    if !section_exists(conn, &section_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "section not found".to_string(),
            details: None,
        });
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, section_id, last_name, first_name, lrn, gender, active)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &section_id,
            last_name.trim(),
            first_name.trim(),
            &lrn,
            &gender,
            active as i64,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;
    Ok(json!({ "studentId": id }))
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_str(params, "sectionId")?;
    if !section_exists(conn, &section_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "section not found".to_string(),
            details: None,
        });
    }

    let mut stmt = conn
        .prepare(
            "SELECT id, last_name, first_name, lrn, gender, active
             FROM students
             WHERE section_id = ?
             ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let students: Vec<serde_json::Value> = stmt
        .query_map([&section_id], |r| {
            let id: String = r.get(0)?;
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            let lrn: Option<String> = r.get(3)?;
            let gender: String = r.get(4)?;
            let active: i64 = r.get(5)?;
            Ok(json!({
                "id": id,
                "displayName": format!("{}, {}", last, first),
                "lrn": lrn,
                "gender": gender,
                "active": active != 0
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    Ok(json!({ "students": students }))
}

fn handle_students_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_enroll(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.enroll" => Some(handle_students_enroll(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
