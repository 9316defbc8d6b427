use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::render;
use crate::sf2;
use rusqlite::Connection;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn required_year_month(req: &Request) -> Result<(i32, u32), serde_json::Value> {
    let year = req
        .params
        .get("year")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", "missing year", None))? as i32;
    let month = req
        .params
        .get("month")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| err(&req.id, "bad_params", "missing month", None))? as u32;
    Ok((year, month))
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn workspace_dir(state: &AppState, req: &Request) -> Result<PathBuf, serde_json::Value> {
    state
        .workspace
        .clone()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn build_model(
    conn: &Connection,
    req: &Request,
) -> Result<sf2::Sf2Model, serde_json::Value> {
    let section_id = required_str(req, "sectionId")?;
    let (year, month) = required_year_month(req)?;
    let ctx = sf2::Sf2Context {
        conn,
        section_id: &section_id,
    };
    sf2::build_sf2_model(&ctx, year, month)
        .map_err(|e| err(&req.id, &e.code, e.message, e.details))
}

fn handle_reports_sf2_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match build_model(conn, req) {
        Ok(model) => ok(&req.id, json!(model)),
        Err(e) => e,
    }
}

fn write_artifact(
    workspace: &Path,
    file_name: &str,
    bytes: &[u8],
) -> anyhow::Result<PathBuf> {
    let dir = workspace.join("exports");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(file_name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn handle_export(
    state: &mut AppState,
    req: &Request,
    ext: &str,
    render_fn: fn(&sf2::Sf2Model) -> Result<Vec<u8>, render::RenderError>,
) -> serde_json::Value {
    let workspace = match workspace_dir(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let model = match build_model(conn, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let bytes = match render_fn(&model) {
        Ok(v) => v,
        Err(e) => {
            let details = e.details();
            return err(&req.id, "render_failed", e.message, Some(details));
        }
    };

    let file_name = render::artifact_file_name(&model, ext);
    let path = match write_artifact(&workspace, &file_name, &bytes) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "io_failed", e.to_string(), None),
    };
    log::info!(
        "exported {} ({} bytes) for section {}",
        path.to_string_lossy(),
        bytes.len(),
        model.section.id
    );

    ok(
        &req.id,
        json!({
            "fileName": file_name,
            "path": path.to_string_lossy(),
            "byteLength": bytes.len(),
            "sha256": sha256_hex(&bytes),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.sf2Model" => Some(handle_reports_sf2_model(state, req)),
        "exports.sf2Xlsx" => Some(handle_export(
            state,
            req,
            "xlsx",
            render::xlsx::render_sf2_xlsx,
        )),
        "exports.sf2Pdf" => Some(handle_export(state, req, "pdf", render::pdf::render_sf2_pdf)),
        _ => None,
    }
}
