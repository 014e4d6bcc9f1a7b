use crate::auth;
use crate::db;
use crate::error::AppError;
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_conn, parse_params, required_text, workspace_path, Page, PageParams};
use crate::ipc::types::{AppState, Request};
use crate::models::{AdmissionStatus, Role, Student, STUDENT_COLUMNS};
use crate::uploads;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

pub fn load_student(conn: &Connection, id: &str) -> Result<Student, AppError> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
        [id],
        Student::from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("student"))
}

fn optional_text(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn handle_profile_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_caller(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let student = load_student(conn, &caller.id)?;
    Ok(json!({ "student": student }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ProfileUpdate {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    dob: Option<String>,
}

fn handle_profile_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_caller(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: ProfileUpdate = parse_params(req)?;
    let current = load_student(conn, &caller.id)?;

    let name = match p.name {
        Some(n) => required_text(&n, "name")?,
        None => current.name,
    };
    let dob = match optional_text(p.dob) {
        Some(d) => Some(valid_dob(&d)?),
        None => current.dob,
    };
    conn.execute(
        "UPDATE students SET name = ?, address = ?, phone = ?, dob = ?, updated_at = ? WHERE id = ?",
        (
            &name,
            optional_text(p.address).or(current.address),
            optional_text(p.phone).or(current.phone),
            &dob,
            db::now_ts(),
            &caller.id,
        ),
    )?;
    Ok(json!({ "student": load_student(conn, &caller.id)? }))
}

fn valid_dob(raw: &str) -> Result<String, AppError> {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| AppError::invalid("dob must be a YYYY-MM-DD date"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AdmissionForm {
    address: String,
    phone: String,
    dob: String,
    #[serde(default)]
    course: Option<String>,
}

fn handle_admission_submit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_student(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: AdmissionForm = parse_params(req)?;
    let address = required_text(&p.address, "address")?;
    let phone = required_text(&p.phone, "phone")?;
    let dob = valid_dob(p.dob.trim())?;
    let current = load_student(conn, &caller.id)?;

    conn.execute(
        "UPDATE students
         SET address = ?, phone = ?, dob = ?, course = ?, admission_status = ?, updated_at = ?
         WHERE id = ?",
        (
            &address,
            &phone,
            &dob,
            optional_text(p.course).or(current.course),
            AdmissionStatus::Submitted,
            db::now_ts(),
            &caller.id,
        ),
    )?;
    info!(
        student_id = %caller.id,
        from = current.admission_status.as_str(),
        to = AdmissionStatus::Submitted.as_str(),
        "admission status changed"
    );
    Ok(json!({
        "message": "Admission form submitted successfully",
        "student": load_student(conn, &caller.id)?
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListParams {
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    course: Option<String>,
    #[serde(default)]
    admission_status: Option<AdmissionStatus>,
    #[serde(default)]
    fee_paid: Option<bool>,
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: ListParams = parse_params(req)?;
    let page = Page::from_params(
        PageParams {
            page: p.page,
            limit: p.limit,
        },
        state.config.page_limit_max,
    )?;

    let mut filters = vec!["role = 'student'".to_string()];
    let mut args: Vec<Value> = Vec::new();
    if let Some(q) = optional_text(p.search) {
        filters.push("(instr(fold(name), ?) > 0 OR instr(fold(email), ?) > 0)".into());
        let q = q.to_lowercase();
        args.push(Value::Text(q.clone()));
        args.push(Value::Text(q));
    }
    if let Some(course) = optional_text(p.course) {
        filters.push("course = ?".into());
        args.push(Value::Text(course));
    }
    if let Some(status) = p.admission_status {
        filters.push("admission_status = ?".into());
        args.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(fee_paid) = p.fee_paid {
        filters.push("fee_paid = ?".into());
        args.push(Value::Integer(fee_paid as i64));
    }
    let where_sql = filters.join(" AND ");

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM students WHERE {}", where_sql),
        params_from_iter(args.iter()),
        |r| r.get(0),
    )?;

    let mut page_args = args.clone();
    page_args.push(Value::Integer(page.limit));
    page_args.push(Value::Integer(page.offset()));
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        STUDENT_COLUMNS, where_sql
    ))?;
    let students = stmt
        .query_map(params_from_iter(page_args.iter()), Student::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "students": students,
        "total": total,
        "totalPages": page.total_pages(total),
        "currentPage": page.page,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StatusUpdate {
    student_id: String,
    #[serde(default)]
    admission_status: Option<AdmissionStatus>,
    #[serde(default)]
    fee_paid: Option<bool>,
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: StatusUpdate = parse_params(req)?;
    if p.admission_status.is_none() && p.fee_paid.is_none() {
        return Err(AppError::invalid("nothing to update"));
    }
    let current = load_student(conn, &p.student_id)?;

    let status = p.admission_status.unwrap_or(current.admission_status);
    let fee_paid = p.fee_paid.unwrap_or(current.fee_paid);
    conn.execute(
        "UPDATE students SET admission_status = ?, fee_paid = ?, updated_at = ? WHERE id = ?",
        (status, fee_paid as i64, db::now_ts(), &p.student_id),
    )?;
    if status != current.admission_status {
        info!(
            student_id = %p.student_id,
            admin_id = %admin.id,
            from = current.admission_status.as_str(),
            to = status.as_str(),
            "admission status changed"
        );
    }
    if fee_paid != current.fee_paid {
        info!(student_id = %p.student_id, admin_id = %admin.id, fee_paid, "fee flag set");
    }
    Ok(json!({ "student": load_student(conn, &p.student_id)? }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StudentRef {
    student_id: String,
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let workspace = workspace_path(state)?.to_path_buf();
    let conn = db_conn(state)?;
    let p: StudentRef = parse_params(req)?;
    let student = load_student(conn, &p.student_id)?;
    if student.role == Role::Admin {
        return Err(AppError::invalid("admin accounts cannot be deleted here"));
    }

    let mut stored_files: Vec<String> = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT file_path FROM results WHERE student_id = ?1 AND file_path IS NOT NULL
             UNION ALL
             SELECT file_path FROM admit_cards WHERE student_id = ?1",
        )?;
        let paths = stmt
            .query_map([&p.student_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        stored_files.extend(paths);
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM result_subjects WHERE result_id IN (SELECT id FROM results WHERE student_id = ?)",
        [&p.student_id],
    )?;
    let results = tx.execute("DELETE FROM results WHERE student_id = ?", [&p.student_id])?;
    let cards = tx.execute("DELETE FROM admit_cards WHERE student_id = ?", [&p.student_id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [&p.student_id])?;
    tx.commit()?;

    for rel in &stored_files {
        if let Err(e) = uploads::remove_stored(&workspace, rel) {
            warn!(file = %rel, error = %e, "could not remove stored file");
        }
    }
    info!(
        student_id = %p.student_id,
        admin_id = %admin.id,
        results,
        admit_cards = cards,
        "student deleted"
    );
    Ok(json!({ "message": "Student deleted successfully" }))
}

fn count(conn: &Connection, sql: &str) -> Result<i64, AppError> {
    Ok(conn.query_row(sql, [], |r| r.get(0))?)
}

fn handle_dashboard_stats(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let (total, approved, pending, rejected, fee_paid, fee_pending): (i64, i64, i64, i64, i64, i64) =
        conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(admission_status = 'Approved'), 0),
                    COALESCE(SUM(admission_status = 'Submitted'), 0),
                    COALESCE(SUM(admission_status = 'Rejected'), 0),
                    COALESCE(SUM(fee_paid = 1), 0),
                    COALESCE(SUM(fee_paid = 0), 0)
             FROM students WHERE role = 'student'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
        )?;
    let (fees_total, fees_paid): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(paid = 1), 0) FROM fees",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    Ok(json!({
        "students": {
            "total": total,
            "approved": approved,
            "pending": pending,
            "rejected": rejected,
        },
        "fees": {
            "total": fees_total,
            "paid": fees_paid,
            "pending": fees_total - fees_paid,
            "paidStudents": fee_paid,
            "pendingStudents": fee_pending,
        },
        "results": count(conn, "SELECT COUNT(*) FROM results")?,
        "notices": count(conn, "SELECT COUNT(*) FROM notices")?,
        "examSchedules": count(conn, "SELECT COUNT(*) FROM exam_schedules")?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "profile.get" => handle_profile_get(state, req),
        "profile.update" => handle_profile_update(state, req),
        "admission.submit" => handle_admission_submit(state, req),
        "students.list" => handle_students_list(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        "dashboard.stats" => handle_dashboard_stats(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dob_must_be_a_calendar_date() {
        assert_eq!(valid_dob("2004-02-29").expect("leap day"), "2004-02-29");
        assert!(valid_dob("2003-02-29").is_err());
        assert!(valid_dob("29/02/2004").is_err());
    }

    #[test]
    fn blank_optional_text_is_dropped() {
        assert_eq!(optional_text(Some("  ".into())), None);
        assert_eq!(optional_text(Some(" x ".into())), Some("x".into()));
    }
}
