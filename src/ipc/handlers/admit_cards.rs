use crate::auth;
use crate::db;
use crate::error::AppError;
use crate::ipc::error::respond;
use crate::ipc::handlers::students::load_student;
use crate::ipc::helpers::{
    bytes_response, content_type_for, db_conn, parse_params, rendered_response, workspace_path,
    OutputParams,
};
use crate::ipc::types::{AppState, Request};
use crate::models::AdmitCard;
use crate::render::{self, Format};
use crate::reports;
use crate::uploads::{self, FileIntake, UploadKind};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

/// Most recent upload for the student; older uploads are kept but superseded.
fn latest_card(conn: &Connection, student_id: &str) -> Result<Option<AdmitCard>, AppError> {
    Ok(conn
        .query_row(
            "SELECT id, student_id, file_path, file_name, checksum, uploaded_at
             FROM admit_cards WHERE student_id = ?
             ORDER BY uploaded_at DESC, rowid DESC LIMIT 1",
            [student_id],
            |r| {
                Ok(AdmitCard {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    file_path: r.get(2)?,
                    file_name: r.get(3)?,
                    checksum: r.get(4)?,
                    uploaded_at: r.get(5)?,
                })
            },
        )
        .optional()?)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UploadParams {
    student_id: String,
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
    load_student(conn, &p.student_id)?;

    let intake = FileIntake {
        file_name: p.file_name,
        content_base64: p.content_base64,
        source_path: p.source_path,
    };
    let stored = uploads::store(&workspace, UploadKind::AdmitCards, &intake)?;
    let card = AdmitCard {
        id: Uuid::new_v4().to_string(),
        student_id: p.student_id.clone(),
        file_path: stored.rel_path.clone(),
        file_name: stored.file_name.clone(),
        checksum: stored.checksum.clone(),
        uploaded_at: db::now_ts(),
    };
    let inserted = conn.execute(
        "INSERT INTO admit_cards(id, student_id, file_path, file_name, checksum, uploaded_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &card.id,
            &card.student_id,
            &card.file_path,
            &card.file_name,
            &card.checksum,
            &card.uploaded_at,
        ),
    );
    if let Err(e) = inserted {
        if let Err(cleanup) = uploads::remove_stored(&workspace, &stored.rel_path) {
            warn!(file = %stored.rel_path, error = %cleanup, "could not remove orphaned upload");
        }
        return Err(e.into());
    }
    info!(
        card_id = %card.id,
        student_id = %card.student_id,
        admin_id = %admin.id,
        file = %card.file_path,
        "admit card uploaded"
    );
    Ok(json!({ "message": "Admit card uploaded successfully", "admitCard": card }))
}

fn handle_my(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_student(req.caller.as_ref())?;
    let workspace = workspace_path(state)?.to_path_buf();
    let conn = db_conn(state)?;
    let out: OutputParams = parse_params(req)?;
    let card = latest_card(conn, &caller.id)?.ok_or_else(|| AppError::not_found("admit card"))?;
    let bytes = uploads::read_stored(&workspace, &card.file_path)?;
    let mut body = bytes_response(&bytes, &card.file_name, content_type_for(&card.file_name), &out)?;
    body["admitCard"] = json!(card);
    Ok(body)
}

fn handle_generate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_student(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let out: OutputParams = parse_params(req)?;
    let student = load_student(conn, &caller.id)?;
    let issued_on = chrono::Local::now().format("%Y-%m-%d").to_string();
    let doc = reports::admit_card(&student, &issued_on);
    let base = format!("admit_card_{}", reports::file_stem(&student.name));
    let rendered = render::render(&doc, Format::Pdf, &base)?;
    rendered_response(&rendered, &out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "admitCards.upload" => handle_upload(state, req),
        "admitCards.my" => handle_my(state, req),
        "admitCards.generate" => handle_generate(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
