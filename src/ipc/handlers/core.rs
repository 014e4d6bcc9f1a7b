use crate::auth;
use crate::config::APP_VERSION;
use crate::db;
use crate::error::AppError;
use crate::ipc::error::respond;
use crate::ipc::helpers::parse_params;
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

fn handle_health(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, AppError> {
    Ok(json!({
        "version": APP_VERSION,
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

#[derive(Deserialize)]
struct SelectParams {
    path: String,
}

/// Opens (creating if needed) the workspace database and seeds the default admin.
pub fn open_workspace(state: &mut AppState, path: &Path) -> Result<(), AppError> {
    let conn = db::open_db(path).map_err(|e| match e.downcast::<rusqlite::Error>() {
        Ok(db_err) => AppError::Db(db_err),
        Err(other) => AppError::Io(std::io::Error::other(format!("{:#}", other))),
    })?;
    auth::ensure_default_admin(&conn, &state.config)?;
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    info!(workspace = %path.display(), "workspace opened");
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let p: SelectParams = parse_params(req)?;
    if p.path.trim().is_empty() {
        return Err(AppError::invalid("missing params.path"));
    }
    let path = PathBuf::from(p.path);
    open_workspace(state, &path)?;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
