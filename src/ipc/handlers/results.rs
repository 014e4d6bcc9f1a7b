use crate::auth;
use crate::calc::SubjectMark;
use crate::db;
use crate::error::AppError;
use crate::ipc::error::respond;
use crate::ipc::handlers::students::load_student;
use crate::ipc::helpers::{
    bytes_response, content_type_for, db_conn, parse_params, rendered_response, valid_semester,
    workspace_path, OutputParams,
};
use crate::ipc::types::{AppState, Request};
use crate::models::ResultBody;
use crate::render::{self, Format};
use crate::reports;
use crate::results;
use crate::uploads::{self, FileIntake, UploadKind};
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AddParams {
    student_id: String,
    semester: i64,
    subjects: Vec<SubjectMark>,
}

fn handle_add(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: AddParams = parse_params(req)?;
    let semester = valid_semester(p.semester)?;
    load_student(conn, &p.student_id)?;
    let result = results::add_graded(conn, &p.student_id, semester, &p.subjects)?;
    info!(result_id = %result.id, student_id = %p.student_id, admin_id = %admin.id, "result added");
    Ok(json!({ "message": "Result added successfully", "result": result }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateParams {
    result_id: String,
    #[serde(default)]
    semester: Option<i64>,
    #[serde(default)]
    subjects: Option<Vec<SubjectMark>>,
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: UpdateParams = parse_params(req)?;
    if p.semester.is_none() && p.subjects.is_none() {
        return Err(AppError::invalid("nothing to update"));
    }
    let semester = p.semester.map(valid_semester).transpose()?;
    let result = results::update_graded(conn, &p.result_id, semester, p.subjects.as_deref())?;
    info!(result_id = %result.id, admin_id = %admin.id, "result updated");
    Ok(json!({ "message": "Result updated successfully", "result": result }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UploadParams {
    student_id: String,
    semester: i64,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    content_base64: Option<String>,
    #[serde(default)]
    source_path: Option<String>,
}

fn handle_upload(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let workspace = workspace_path(state)?.to_path_buf();
    let conn = db_conn(state)?;
    let p: UploadParams = parse_params(req)?;
    let semester = valid_semester(p.semester)?;
    load_student(conn, &p.student_id)?;

    let intake = FileIntake {
        file_name: p.file_name,
        content_base64: p.content_base64,
        source_path: p.source_path,
    };
    let stored = uploads::store(&workspace, UploadKind::Results, &intake)?;
    let result = match results::add_file(conn, &p.student_id, semester, &stored) {
        Ok(r) => r,
        Err(e) => {
            if let Err(cleanup) = uploads::remove_stored(&workspace, &stored.rel_path) {
                warn!(file = %stored.rel_path, error = %cleanup, "could not remove orphaned upload");
            }
            return Err(e);
        }
    };
    info!(
        result_id = %result.id,
        student_id = %p.student_id,
        admin_id = %admin.id,
        file = %stored.rel_path,
        "result file uploaded"
    );
    Ok(json!({ "message": "Result uploaded successfully", "result": result }))
}

fn handle_my(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_student(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    Ok(json!({ "results": results::list(conn, Some(caller.id.as_str()))? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AllParams {
    #[serde(default)]
    student_id: Option<String>,
}

fn handle_all(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: AllParams = parse_params(req)?;
    let mut stmt = conn.prepare("SELECT name, email, student_code FROM students WHERE id = ?")?;
    let mut rows = Vec::new();
    for r in results::list(conn, p.student_id.as_deref())? {
        let student = stmt
            .query_row([&r.student_id], |row| {
                Ok(json!({
                    "name": row.get::<_, String>(0)?,
                    "email": row.get::<_, String>(1)?,
                    "studentId": row.get::<_, Option<String>>(2)?,
                }))
            })
            .optional()?;
        let mut v = json!(r);
        v["student"] = student.unwrap_or(serde_json::Value::Null);
        rows.push(v);
    }
    Ok(json!({ "results": rows }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ResultRef {
    result_id: String,
    #[serde(default)]
    out_path: Option<String>,
}

impl ResultRef {
    fn output(&self) -> OutputParams {
        OutputParams {
            out_path: self.out_path.clone(),
        }
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let workspace = workspace_path(state)?.to_path_buf();
    let conn = db_conn(state)?;
    let p: ResultRef = parse_params(req)?;
    let removed = results::delete(conn, &p.result_id)?;
    if let ResultBody::File { file_path, .. } = &removed.body {
        if let Err(e) = uploads::remove_stored(&workspace, file_path) {
            warn!(file = %file_path, error = %e, "could not remove stored result file");
        }
    }
    info!(result_id = %p.result_id, admin_id = %admin.id, "result deleted");
    Ok(json!({ "message": "Result deleted successfully" }))
}

fn handle_download(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_caller(req.caller.as_ref())?;
    let workspace = workspace_path(state)?.to_path_buf();
    let conn = db_conn(state)?;
    let p: ResultRef = parse_params(req)?;
    let result = if caller.is_admin() {
        results::get(conn, &p.result_id)?.ok_or_else(|| AppError::not_found("result"))?
    } else {
        results::get_owned(conn, &p.result_id, &caller.id)?
    };
    let ResultBody::File {
        file_path,
        file_name,
        ..
    } = &result.body
    else {
        return Err(AppError::not_found("result file"));
    };
    let bytes = uploads::read_stored(&workspace, file_path)?;
    bytes_response(&bytes, file_name, content_type_for(file_name), &p.output())
}

fn handle_pdf(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_student(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: ResultRef = parse_params(req)?;
    let result = results::get_owned(conn, &p.result_id, &caller.id)?;
    let student = load_student(conn, &caller.id)?;

    let doc = reports::result_sheet(&student, &result, &db::now_ts());
    let base = format!(
        "result_{}_sem{}",
        reports::file_stem(&student.name),
        result.semester
    );
    let rendered = render::render(&doc, Format::Pdf, &base)?;
    rendered_response(&rendered, &p.output())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "results.add" => handle_add(state, req),
        "results.update" => handle_update(state, req),
        "results.upload" => handle_upload(state, req),
        "results.my" => handle_my(state, req),
        "results.all" => handle_all(state, req),
        "results.delete" => handle_delete(state, req),
        "results.download" => handle_download(state, req),
        "results.pdf" => handle_pdf(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
