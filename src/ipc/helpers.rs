use crate::error::AppError;
use crate::ipc::types::{AppState, Request};
use crate::render::Rendered;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};

pub fn db_conn(state: &AppState) -> Result<&Connection, AppError> {
    state.db.as_ref().ok_or(AppError::NoWorkspace)
}

pub fn workspace_path(state: &AppState) -> Result<&Path, AppError> {
    state.workspace.as_deref().ok_or(AppError::NoWorkspace)
}

/// Deserializes `req.params` into a typed payload; missing params count as `{}`.
pub fn parse_params<T: DeserializeOwned>(req: &Request) -> Result<T, AppError> {
    let raw = if req.params.is_null() {
        json!({})
    } else {
        req.params.clone()
    };
    serde_json::from_value(raw).map_err(|e| AppError::invalid(format!("bad params: {}", e)))
}

pub fn required_text(value: &str, field: &str) -> Result<String, AppError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::invalid(format!("{} must not be empty", field)));
    }
    Ok(v.to_string())
}

pub fn valid_semester(semester: i64) -> Result<i64, AppError> {
    if semester < 1 {
        return Err(AppError::invalid("semester must be at least 1"));
    }
    Ok(semester)
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

pub const DEFAULT_PAGE_LIMIT: i64 = 10;

impl Page {
    pub fn from_params(p: PageParams, max_limit: i64) -> Result<Page, AppError> {
        let page = p.page.unwrap_or(1);
        let limit = p.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page < 1 {
            return Err(AppError::invalid("page must be at least 1"));
        }
        if limit < 1 {
            return Err(AppError::invalid("limit must be at least 1"));
        }
        let limit = limit.min(max_limit);
        if (page - 1).checked_mul(limit).is_none() {
            return Err(AppError::invalid("page is out of range"));
        }
        Ok(Page { page, limit })
    }

    /// `from_params` guarantees this does not overflow.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputParams {
    #[serde(default)]
    pub out_path: Option<String>,
}

/// Hands bytes back to the caller: written to `outPath` when given, inline
/// as base64 otherwise.
pub fn bytes_response(
    bytes: &[u8],
    filename: &str,
    content_type: &str,
    out: &OutputParams,
) -> Result<serde_json::Value, AppError> {
    let mut body = json!({
        "contentType": content_type,
        "filename": filename,
        "byteLength": bytes.len(),
    });
    match &out.out_path {
        Some(p) => {
            let path = PathBuf::from(p);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(&path, bytes)?;
            body["path"] = json!(path.to_string_lossy());
        }
        None => {
            body["contentBase64"] = json!(B64.encode(bytes));
        }
    }
    Ok(body)
}

pub fn rendered_response(r: &Rendered, out: &OutputParams) -> Result<serde_json::Value, AppError> {
    bytes_response(&r.bytes, &r.filename, r.content_type, out)
}

/// Best-effort content type from a stored file's extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("xlsx") => crate::render::XLSX_CONTENT_TYPE,
        Some("csv") => "text/csv",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
