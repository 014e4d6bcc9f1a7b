use crate::auth::{self, Caller};
use crate::db;
use crate::error::{is_unique_violation, AppError};
use crate::ids;
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_conn, parse_params, required_text};
use crate::ipc::types::{AppState, Request};
use crate::models::Role;
use chrono::Datelike;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

/// Identifier collisions tolerated before registration gives up.
const MAX_ID_ATTEMPTS: usize = 5;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RegisterParams {
    name: String,
    email: String,
    password: String,
    #[serde(default)]
    course: Option<String>,
}

fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid {
        return Err(AppError::invalid("email is not valid"));
    }
    Ok(email)
}

fn email_taken(conn: &Connection, email: &str) -> Result<bool, AppError> {
    Ok(conn
        .query_row("SELECT 1 FROM students WHERE email = ?", [email], |r| r.get::<_, i64>(0))
        .optional()?
        .is_some())
}

fn handle_register(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let conn = db_conn(state)?;
    let p: RegisterParams = parse_params(req)?;
    let name = required_text(&p.name, "name")?;
    let email = normalize_email(&p.email)?;
    auth::validate_password(&p.password)?;
    let course = p
        .course
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    if email_taken(conn, &email)? {
        return Err(AppError::invalid("student already exists"));
    }

    let id = Uuid::new_v4().to_string();
    let password_hash = auth::hash_password(&p.password);
    let year = chrono::Local::now().year();

    for attempt in 1..=MAX_ID_ATTEMPTS {
        // Allocation commits on its own: a collision burns the number and the
        // next attempt moves past it.
        let code = ids::allocate_student_code(conn, &state.config.id_prefix, year)?;
        let inserted = conn.execute(
            "INSERT INTO students(id, student_code, name, email, password_hash, role, course,
                                  admission_status, fee_paid, created_at)
             VALUES(?, ?, ?, ?, ?, 'student', ?, 'Approved', 0, ?)",
            (&id, &code, &name, &email, &password_hash, &course, db::now_ts()),
        );
        match inserted {
            Ok(_) => {
                info!(student_id = %id, student_code = %code, "student registered");
                return Ok(json!({
                    "id": id,
                    "studentId": code,
                    "message": "Student registered successfully"
                }));
            }
            Err(e) if is_unique_violation(&e, "students", "student_code") => {
                warn!(student_code = %code, attempt, "student identifier collision; retrying");
            }
            Err(e) if is_unique_violation(&e, "students", "email") => {
                return Err(AppError::invalid("student already exists"));
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::Conflict(
        "could not allocate a unique student identifier".to_string(),
    ))
}

fn handle_register_admin(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: RegisterParams = parse_params(req)?;
    let name = required_text(&p.name, "name")?;
    let email = normalize_email(&p.email)?;
    auth::validate_password(&p.password)?;
    if email_taken(conn, &email)? {
        return Err(AppError::invalid("user already exists"));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, name, email, password_hash, role, created_at)
         VALUES(?, ?, ?, ?, 'admin', ?)",
        (&id, &name, &email, auth::hash_password(&p.password), db::now_ts()),
    )
    .map_err(|e| {
        if is_unique_violation(&e, "students", "email") {
            AppError::invalid("user already exists")
        } else {
            e.into()
        }
    })?;
    info!(admin_id = %id, "admin registered");
    Ok(json!({ "id": id, "message": "Admin registered successfully" }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LoginParams {
    email: String,
    password: String,
}

fn handle_login(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let conn = db_conn(state)?;
    let p: LoginParams = parse_params(req)?;
    let email = p.email.trim().to_ascii_lowercase();

    let row: Option<(String, String, Role, String, Option<String>)> = conn
        .query_row(
            "SELECT id, password_hash, role, name, student_code FROM students WHERE email = ?",
            [&email],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?;

    let Some((id, hash, role, name, code)) = row else {
        return Err(AppError::unauthorized("invalid credentials"));
    };
    if !auth::verify_password(&p.password, &hash) {
        return Err(AppError::unauthorized("invalid credentials"));
    }
    info!(user_id = %id, role = role.as_str(), "login");
    Ok(json!({
        "caller": Caller { id, role },
        "name": name,
        "studentId": code,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ChangePasswordParams {
    current_password: String,
    new_password: String,
}

fn handle_change_password(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_caller(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: ChangePasswordParams = parse_params(req)?;

    let hash: String = conn
        .query_row(
            "SELECT password_hash FROM students WHERE id = ?",
            [&caller.id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| AppError::not_found("account"))?;
    if !auth::verify_password(&p.current_password, &hash) {
        return Err(AppError::invalid("current password is incorrect"));
    }
    auth::validate_password(&p.new_password)?;
    conn.execute(
        "UPDATE students SET password_hash = ?, updated_at = ? WHERE id = ?",
        (auth::hash_password(&p.new_password), db::now_ts(), &caller.id),
    )?;
    info!(user_id = %caller.id, "password changed");
    Ok(json!({ "message": "Password changed successfully" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "auth.register" => handle_register(state, req),
        "auth.registerAdmin" => handle_register_admin(state, req),
        "auth.login" => handle_login(state, req),
        "auth.changePassword" => handle_change_password(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email(" Asha@Example.COM ").expect("ok"), "asha@example.com");
        assert!(normalize_email("nope").is_err());
        assert!(normalize_email("@x.com").is_err());
        assert!(normalize_email("a@localhost").is_err());
    }
}
