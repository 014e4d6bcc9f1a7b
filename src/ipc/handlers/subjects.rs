use crate::auth;
use crate::db;
use crate::error::AppError;
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_conn, parse_params, required_text, valid_semester};
use crate::ipc::types::{AppState, Request};
use crate::models::{Subject, Syllabus};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const SUBJECT_COLUMNS: &str =
    "id, name, code, course, semester, topics_json, description, credits, created_at";

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<Subject> {
    let topics_json: String = r.get(5)?;
    let topics: Vec<String> = serde_json::from_str(&topics_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Subject {
        id: r.get(0)?,
        name: r.get(1)?,
        code: r.get(2)?,
        course: r.get(3)?,
        semester: r.get(4)?,
        syllabus: Syllabus {
            topics,
            description: r.get(6)?,
            credits: r.get(7)?,
        },
        created_at: r.get(8)?,
    })
}

fn load_subject(conn: &Connection, id: &str) -> Result<Subject, AppError> {
    conn.query_row(
        &format!("SELECT {} FROM subjects WHERE id = ?", SUBJECT_COLUMNS),
        [id],
        subject_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("subject"))
}

fn valid_syllabus(mut s: Syllabus) -> Result<Syllabus, AppError> {
    if let Some(c) = s.credits {
        if c < 0 {
            return Err(AppError::invalid("credits must not be negative"));
        }
    }
    s.topics = s
        .topics
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    Ok(s)
}

fn topics_json(s: &Syllabus) -> Result<String, AppError> {
    serde_json::to_string(&s.topics).map_err(|e| AppError::invalid(e.to_string()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListParams {
    #[serde(default)]
    course: Option<String>,
    #[serde(default)]
    semester: Option<i64>,
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    auth::require_caller(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: ListParams = parse_params(req)?;
    let course = p.course.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM subjects
         WHERE (?1 IS NULL OR course = ?1) AND (?2 IS NULL OR semester = ?2)
         ORDER BY semester, name",
        SUBJECT_COLUMNS
    ))?;
    let subjects = stmt
        .query_map((course, p.semester), subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "subjects": subjects }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateParams {
    name: String,
    #[serde(default)]
    code: Option<String>,
    course: String,
    semester: i64,
    #[serde(default)]
    syllabus: Syllabus,
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: CreateParams = parse_params(req)?;
    let name = required_text(&p.name, "name")?;
    let course = required_text(&p.course, "course")?;
    let semester = valid_semester(p.semester)?;
    let syllabus = valid_syllabus(p.syllabus)?;
    let code = p.code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, name, code, course, semester, topics_json, description, credits, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &name,
            &code,
            &course,
            semester,
            topics_json(&syllabus)?,
            &syllabus.description,
            syllabus.credits,
            db::now_ts(),
        ),
    )?;
    info!(subject_id = %id, admin_id = %admin.id, "subject created");
    Ok(json!({ "message": "Subject created successfully", "subject": load_subject(conn, &id)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateParams {
    subject_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    course: Option<String>,
    #[serde(default)]
    semester: Option<i64>,
    #[serde(default)]
    syllabus: Option<Syllabus>,
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: UpdateParams = parse_params(req)?;
    let current = load_subject(conn, &p.subject_id)?;

    let name = match p.name {
        Some(n) => required_text(&n, "name")?,
        None => current.name,
    };
    let course = match p.course {
        Some(c) => required_text(&c, "course")?,
        None => current.course,
    };
    let semester = match p.semester {
        Some(s) => valid_semester(s)?,
        None => current.semester,
    };
    let code = match p.code {
        Some(c) => Some(c.trim().to_string()).filter(|c| !c.is_empty()),
        None => current.code,
    };
    let syllabus = match p.syllabus {
        Some(s) => valid_syllabus(s)?,
        None => current.syllabus,
    };
    conn.execute(
        "UPDATE subjects SET name = ?, code = ?, course = ?, semester = ?, topics_json = ?,
                             description = ?, credits = ?
         WHERE id = ?",
        (
            &name,
            &code,
            &course,
            semester,
            topics_json(&syllabus)?,
            &syllabus.description,
            syllabus.credits,
            &p.subject_id,
        ),
    )?;
    info!(subject_id = %p.subject_id, admin_id = %admin.id, "subject updated");
    Ok(json!({ "message": "Subject updated successfully", "subject": load_subject(conn, &p.subject_id)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SubjectRef {
    subject_id: String,
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: SubjectRef = parse_params(req)?;
    if conn.execute("DELETE FROM subjects WHERE id = ?", [&p.subject_id])? == 0 {
        return Err(AppError::not_found("subject"));
    }
    info!(subject_id = %p.subject_id, admin_id = %admin.id, "subject deleted");
    Ok(json!({ "message": "Subject deleted successfully" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "subjects.list" => handle_list(state, req),
        "subjects.create" => handle_create(state, req),
        "subjects.update" => handle_update(state, req),
        "subjects.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
