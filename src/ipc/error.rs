use crate::error::AppError;
use serde_json::json;
use tracing::{debug, warn};

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Converts a handler outcome into the response envelope.
pub fn respond(id: &str, method: &str, outcome: Result<serde_json::Value, AppError>) -> serde_json::Value {
    match outcome {
        Ok(result) => ok(id, result),
        Err(e) => {
            match &e {
                AppError::Db(_) | AppError::Io(_) | AppError::Render(_) => {
                    warn!(method, code = e.code(), error = %e, "request failed")
                }
                _ => debug!(method, code = e.code(), error = %e, "request rejected"),
            }
            err(id, e.code(), e.to_string(), None)
        }
    }
}
