use crate::auth;
use crate::db;
use crate::error::AppError;
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_conn, parse_params, required_text};
use crate::ipc::types::{AppState, Request};
use crate::models::{Notice, NoticeCategory, NoticePriority};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const NOTICE_SELECT: &str = "SELECT n.id, n.title, n.content, n.category, n.priority, n.created_by,
            s.name, n.created_at, n.expires_at
     FROM notices n LEFT JOIN students s ON s.id = n.created_by";

fn notice_from_row(r: &Row<'_>) -> rusqlite::Result<Notice> {
    Ok(Notice {
        id: r.get(0)?,
        title: r.get(1)?,
        content: r.get(2)?,
        category: r.get(3)?,
        priority: r.get(4)?,
        created_by: r.get(5)?,
        created_by_name: r.get(6)?,
        created_at: r.get(7)?,
        expires_at: r.get(8)?,
    })
}

fn load_notice(conn: &Connection, id: &str) -> Result<Notice, AppError> {
    conn.query_row(
        &format!("{} WHERE n.id = ?", NOTICE_SELECT),
        [id],
        notice_from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("notice"))
}

fn parse_expiry(raw: &str) -> Result<String, AppError> {
    db::normalize_ts(raw).ok_or_else(|| {
        AppError::invalid("expiresAt must be an RFC 3339 timestamp or YYYY-MM-DD date")
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListParams {
    #[serde(default)]
    include_expired: bool,
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_caller(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: ListParams = parse_params(req)?;
    if p.include_expired && !caller.is_admin() {
        return Err(AppError::unauthorized("admin access required"));
    }

    // No expiry means the notice stays up until deleted.
    let mut stmt = conn.prepare(&format!(
        "{} WHERE ?1 OR n.expires_at IS NULL OR n.expires_at > ?2
         ORDER BY n.created_at DESC, n.rowid DESC",
        NOTICE_SELECT
    ))?;
    let notices = stmt
        .query_map((p.include_expired, db::now_ts()), notice_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "notices": notices }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateParams {
    title: String,
    content: String,
    #[serde(default)]
    category: Option<NoticeCategory>,
    #[serde(default)]
    priority: Option<NoticePriority>,
    #[serde(default)]
    expires_at: Option<String>,
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: CreateParams = parse_params(req)?;
    let title = required_text(&p.title, "title")?;
    let content = required_text(&p.content, "content")?;
    let expires_at = p.expires_at.as_deref().map(parse_expiry).transpose()?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO notices(id, title, content, category, priority, created_by, created_at, expires_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &title,
            &content,
            p.category.unwrap_or(NoticeCategory::General),
            p.priority.unwrap_or(NoticePriority::Medium),
            &admin.id,
            db::now_ts(),
            &expires_at,
        ),
    )?;
    info!(notice_id = %id, admin_id = %admin.id, "notice created");
    Ok(json!({ "message": "Notice created successfully", "notice": load_notice(conn, &id)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateParams {
    notice_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    category: Option<NoticeCategory>,
    #[serde(default)]
    priority: Option<NoticePriority>,
    #[serde(default)]
    expires_at: Option<String>,
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: UpdateParams = parse_params(req)?;
    let current = load_notice(conn, &p.notice_id)?;

    let title = match p.title {
        Some(t) => required_text(&t, "title")?,
        None => current.title,
    };
    let content = match p.content {
        Some(c) => required_text(&c, "content")?,
        None => current.content,
    };
    let expires_at = match p.expires_at {
        Some(raw) => Some(parse_expiry(&raw)?),
        None => current.expires_at,
    };
    conn.execute(
        "UPDATE notices SET title = ?, content = ?, category = ?, priority = ?, expires_at = ?
         WHERE id = ?",
        (
            &title,
            &content,
            p.category.unwrap_or(current.category),
            p.priority.unwrap_or(current.priority),
            &expires_at,
            &p.notice_id,
        ),
    )?;
    info!(notice_id = %p.notice_id, admin_id = %admin.id, "notice updated");
    Ok(json!({ "message": "Notice updated successfully", "notice": load_notice(conn, &p.notice_id)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct NoticeRef {
    notice_id: String,
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: NoticeRef = parse_params(req)?;
    if conn.execute("DELETE FROM notices WHERE id = ?", [&p.notice_id])? == 0 {
        return Err(AppError::not_found("notice"));
    }
    info!(notice_id = %p.notice_id, admin_id = %admin.id, "notice deleted");
    Ok(json!({ "message": "Notice deleted successfully" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "notices.list" => handle_list(state, req),
        "notices.create" => handle_create(state, req),
        "notices.update" => handle_update(state, req),
        "notices.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
