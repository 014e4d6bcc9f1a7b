use crate::auth;
use crate::error::AppError;
use crate::ipc::error::respond;
use crate::ipc::handlers::students::load_student;
use crate::ipc::helpers::{db_conn, parse_params, rendered_response, OutputParams};
use crate::ipc::types::{AppState, Request};
use crate::models::{FeeRecord, Student, FEE_COLUMNS, STUDENT_COLUMNS};
use crate::render::{self, Format};
use crate::reports::{self, FeeLine};
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ReportParams {
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    out_path: Option<String>,
}

impl ReportParams {
    fn split(self) -> Result<(Format, OutputParams), AppError> {
        let format = match self.format.as_deref() {
            Some(f) => f.parse()?,
            None => Format::default(),
        };
        Ok((format, OutputParams { out_path: self.out_path }))
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn all_students(conn: &Connection) -> Result<Vec<Student>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students WHERE role = 'student' ORDER BY created_at DESC, rowid DESC",
        STUDENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map([], Student::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn all_fee_lines(conn: &Connection) -> Result<Vec<FeeLine>, AppError> {
    let columns = FEE_COLUMNS
        .split(", ")
        .map(|c| format!("f.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {}, s.name, s.email
         FROM fees f LEFT JOIN students s ON s.id = f.student_id
         ORDER BY f.created_at DESC, f.rowid DESC",
        columns
    ))?;
    let rows = stmt
        .query_map([], |r| {
            Ok(FeeLine {
                fee: FeeRecord::from_row(r)?,
                student_name: r.get(6)?,
                student_email: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn handle_students_report(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let (format, out) = parse_params::<ReportParams>(req)?.split()?;
    let students = all_students(conn)?;
    let doc = reports::students_report(&students, &today());
    let rendered = render::render(&doc, format, "students_report")?;
    info!(admin_id = %admin.id, rows = students.len(), format = format.extension(), "students report generated");
    rendered_response(&rendered, &out)
}

fn handle_fees_report(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let (format, out) = parse_params::<ReportParams>(req)?.split()?;
    let lines = all_fee_lines(conn)?;
    let orphaned = lines.iter().filter(|l| l.student_name.is_none()).count();
    if orphaned > 0 {
        warn!(orphaned, "fee records without a student; using placeholders");
    }
    let doc = reports::fees_report(&lines, &today());
    let rendered = render::render(&doc, format, "fees_report")?;
    info!(admin_id = %admin.id, rows = lines.len(), format = format.extension(), "fees report generated");
    rendered_response(&rendered, &out)
}

fn handle_enrollment_certificate(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, AppError> {
    let caller = auth::require_student(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let out: OutputParams = parse_params(req)?;
    let student = load_student(conn, &caller.id)?;
    let doc = reports::enrollment_certificate(&student, &today());
    let base = format!("certificate_{}", reports::file_stem(&student.name));
    let rendered = render::render(&doc, Format::Pdf, &base)?;
    rendered_response(&rendered, &out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "reports.students" => handle_students_report(state, req),
        "reports.fees" => handle_fees_report(state, req),
        "certificates.enrollment" => handle_enrollment_certificate(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}
