use crate::auth;
use crate::db;
use crate::error::AppError;
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_conn, parse_params, required_text, valid_semester};
use crate::ipc::types::{AppState, Request};
use crate::models::{ExamEntry, ExamSchedule};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn entries_of(conn: &Connection, schedule_id: &str) -> Result<Vec<ExamEntry>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT subject, exam_date, exam_time, venue FROM exam_entries
         WHERE schedule_id = ? ORDER BY idx",
    )?;
    let rows = stmt
        .query_map([schedule_id], |r| {
            Ok(ExamEntry {
                subject: r.get(0)?,
                date: r.get(1)?,
                time: r.get(2)?,
                venue: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_schedule(conn: &Connection, id: &str) -> Result<ExamSchedule, AppError> {
    let head: Option<(String, String, i64, String)> = conn
        .query_row(
            "SELECT id, course, semester, created_at FROM exam_schedules WHERE id = ?",
            [id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let (id, course, semester, created_at) =
        head.ok_or_else(|| AppError::not_found("exam schedule"))?;
    let exams = entries_of(conn, &id)?;
    Ok(ExamSchedule {
        id,
        course,
        semester,
        exams,
        created_at,
    })
}

fn valid_entries(entries: Vec<ExamEntry>) -> Result<Vec<ExamEntry>, AppError> {
    entries
        .into_iter()
        .enumerate()
        .map(|(i, e)| {
            let subject = required_text(&e.subject, &format!("exams[{}].subject", i))?;
            let date = chrono::NaiveDate::parse_from_str(e.date.trim(), "%Y-%m-%d")
                .map_err(|_| {
                    AppError::invalid(format!("exams[{}].date must be a YYYY-MM-DD date", i))
                })?
                .format("%Y-%m-%d")
                .to_string();
            let tidy = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
            Ok(ExamEntry {
                subject,
                date,
                time: tidy(e.time),
                venue: tidy(e.venue),
            })
        })
        .collect()
}

fn write_entries(conn: &Connection, schedule_id: &str, entries: &[ExamEntry]) -> Result<(), AppError> {
    conn.execute("DELETE FROM exam_entries WHERE schedule_id = ?", [schedule_id])?;
    let mut stmt = conn.prepare(
        "INSERT INTO exam_entries(schedule_id, idx, subject, exam_date, exam_time, venue)
         VALUES(?, ?, ?, ?, ?, ?)",
    )?;
    for (idx, e) in entries.iter().enumerate() {
        stmt.execute((schedule_id, idx as i64, &e.subject, &e.date, &e.time, &e.venue))?;
    }
    Ok(())
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
    let mut stmt = conn.prepare(
        "SELECT id FROM exam_schedules
         WHERE (?1 IS NULL OR course = ?1) AND (?2 IS NULL OR semester = ?2)
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let ids = stmt
        .query_map((course, p.semester), |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let schedules = ids
        .iter()
        .map(|id| load_schedule(conn, id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "schedules": schedules }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateParams {
    course: String,
    semester: i64,
    #[serde(default)]
    exams: Vec<ExamEntry>,
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: CreateParams = parse_params(req)?;
    let course = required_text(&p.course, "course")?;
    let semester = valid_semester(p.semester)?;
    let exams = valid_entries(p.exams)?;

    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO exam_schedules(id, course, semester, created_at) VALUES(?, ?, ?, ?)",
        (&id, &course, semester, db::now_ts()),
    )?;
    write_entries(&tx, &id, &exams)?;
    tx.commit()?;
    info!(schedule_id = %id, admin_id = %admin.id, exams = exams.len(), "exam schedule created");
    Ok(json!({
        "message": "Exam time table created successfully",
        "schedule": load_schedule(conn, &id)?
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct UpdateParams {
    schedule_id: String,
    #[serde(default)]
    course: Option<String>,
    #[serde(default)]
    semester: Option<i64>,
    #[serde(default)]
    exams: Option<Vec<ExamEntry>>,
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: UpdateParams = parse_params(req)?;
    let current = load_schedule(conn, &p.schedule_id)?;

    let course = match p.course {
        Some(c) => required_text(&c, "course")?,
        None => current.course,
    };
    let semester = match p.semester {
        Some(s) => valid_semester(s)?,
        None => current.semester,
    };
    let exams = p.exams.map(valid_entries).transpose()?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE exam_schedules SET course = ?, semester = ? WHERE id = ?",
        (&course, semester, &p.schedule_id),
    )?;
    if let Some(exams) = &exams {
        write_entries(&tx, &p.schedule_id, exams)?;
    }
    tx.commit()?;
    info!(schedule_id = %p.schedule_id, admin_id = %admin.id, "exam schedule updated");
    Ok(json!({
        "message": "Exam time table updated successfully",
        "schedule": load_schedule(conn, &p.schedule_id)?
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScheduleRef {
    schedule_id: String,
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, AppError> {
    let admin = auth::require_admin(req.caller.as_ref())?;
    let conn = db_conn(state)?;
    let p: ScheduleRef = parse_params(req)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM exam_entries WHERE schedule_id = ?", [&p.schedule_id])?;
    let removed = tx.execute("DELETE FROM exam_schedules WHERE id = ?", [&p.schedule_id])?;
    if removed == 0 {
        return Err(AppError::not_found("exam schedule"));
    }
    tx.commit()?;
    info!(schedule_id = %p.schedule_id, admin_id = %admin.id, "exam schedule deleted");
    Ok(json!({ "message": "Exam time table deleted successfully" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "exams.list" => handle_list(state, req),
        "exams.create" => handle_create(state, req),
        "exams.update" => handle_update(state, req),
        "exams.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(subject: &str, date: &str) -> ExamEntry {
        ExamEntry {
            subject: subject.into(),
            date: date.into(),
            time: Some(" 10:00 ".into()),
            venue: Some("".into()),
        }
    }

    #[test]
    fn entries_are_trimmed_and_dates_checked() {
        let out = valid_entries(vec![entry(" Physics ", "2026-11-02")]).expect("valid");
        assert_eq!(out[0].subject, "Physics");
        assert_eq!(out[0].time.as_deref(), Some("10:00"));
        assert_eq!(out[0].venue, None);

        let err = valid_entries(vec![entry("Math", "02/11/2026")]).expect_err("bad date");
        assert!(err.to_string().contains("exams[0].date"));
    }
}
