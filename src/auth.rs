use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::models::Role;
use base64::engine::general_purpose::STANDARD_NO_PAD as B64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::info;
use uuid::Uuid;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Identity supplied by the session layer with every request. Trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn require_caller(caller: Option<&Caller>) -> Result<&Caller, AppError> {
    caller.ok_or_else(|| AppError::unauthorized("authentication required"))
}

pub fn require_admin(caller: Option<&Caller>) -> Result<&Caller, AppError> {
    let c = require_caller(caller)?;
    if !c.is_admin() {
        return Err(AppError::unauthorized("admin access required"));
    }
    Ok(c)
}

pub fn require_student(caller: Option<&Caller>) -> Result<&Caller, AppError> {
    let c = require_caller(caller)?;
    if c.role != Role::Student {
        return Err(AppError::unauthorized("student access required"));
    }
    Ok(c)
}

/// Encodes as `pbkdf2-sha256$<iterations>$<salt>$<hash>`.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_with(password, &salt, PBKDF2_ITERATIONS)
}

fn hash_with(password: &str, salt: &[u8], iterations: u32) -> String {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    format!(
        "{}${}${}${}",
        HASH_SCHEME,
        iterations,
        B64.encode(salt),
        B64.encode(key)
    )
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, iterations, salt, _] = parts.as_slice() else {
        return false;
    };
    if *scheme != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let Ok(salt) = B64.decode(salt) else {
        return false;
    };
    let recomputed = hash_with(password, &salt, iterations);
    constant_time_eq(recomputed.as_bytes(), stored.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Creates the configured admin account when the workspace has no admin yet.
/// Returns true when an account was created.
pub fn ensure_default_admin(conn: &Connection, cfg: &Config) -> Result<bool, AppError> {
    let existing: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE role = 'admin' LIMIT 1", [], |r| r.get(0))
        .optional()?;
    if existing.is_some() {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO students(id, name, email, password_hash, role, created_at)
         VALUES(?, 'Default Admin', ?, ?, 'admin', ?)",
        (
            Uuid::new_v4().to_string(),
            &cfg.admin_email,
            hash_password(&cfg.admin_password),
            db::now_ts(),
        ),
    )?;
    info!(email = %cfg.admin_email, "default admin created");
    Ok(true)
}
