use crate::calc::{self, SubjectMark};
use crate::db;
use crate::error::AppError;
use crate::models::{ResultBody, ResultRecord};
use crate::uploads::StoredFile;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

const RESULT_COLUMNS: &str =
    "id, student_id, semester, total, grade, file_path, file_name, checksum, created_at";

struct ResultRow {
    id: String,
    student_id: String,
    semester: i64,
    total: Option<f64>,
    grade: Option<String>,
    file_path: Option<String>,
    file_name: Option<String>,
    checksum: Option<String>,
    created_at: String,
}

impl ResultRow {
    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ResultRow {
            id: r.get(0)?,
            student_id: r.get(1)?,
            semester: r.get(2)?,
            total: r.get(3)?,
            grade: r.get(4)?,
            file_path: r.get(5)?,
            file_name: r.get(6)?,
            checksum: r.get(7)?,
            created_at: r.get(8)?,
        })
    }
}

fn subjects_of(conn: &Connection, result_id: &str) -> Result<Vec<SubjectMark>, AppError> {
    let mut stmt =
        conn.prepare("SELECT name, marks FROM result_subjects WHERE result_id = ? ORDER BY idx")?;
    let rows = stmt
        .query_map([result_id], |r| {
            Ok(SubjectMark {
                name: r.get(0)?,
                marks: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn hydrate(conn: &Connection, row: ResultRow) -> Result<ResultRecord, AppError> {
    let body = match (row.file_path, row.grade) {
        (Some(file_path), _) => ResultBody::File {
            file_path,
            file_name: row.file_name.unwrap_or_default(),
            checksum: row.checksum.unwrap_or_default(),
        },
        (None, Some(grade)) => ResultBody::Subjects {
            subjects: subjects_of(conn, &row.id)?,
            total: row.total.unwrap_or(0.0),
            grade,
        },
        (None, None) => {
            return Err(AppError::invalid(format!(
                "result {} has neither subjects nor a file",
                row.id
            )))
        }
    };
    Ok(ResultRecord {
        id: row.id,
        student_id: row.student_id,
        semester: row.semester,
        body,
        created_at: row.created_at,
    })
}

pub fn get(conn: &Connection, result_id: &str) -> Result<Option<ResultRecord>, AppError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM results WHERE id = ?", RESULT_COLUMNS),
            [result_id],
            ResultRow::from_row,
        )
        .optional()?;
    row.map(|r| hydrate(conn, r)).transpose()
}

/// Fetches a result only if it belongs to `student_id`. A foreign result is
/// reported exactly like a missing one.
pub fn get_owned(conn: &Connection, result_id: &str, student_id: &str) -> Result<ResultRecord, AppError> {
    match get(conn, result_id)? {
        Some(r) if r.student_id == student_id => Ok(r),
        _ => Err(AppError::not_found("result")),
    }
}

/// Results newest first, optionally narrowed to one student.
pub fn list(conn: &Connection, student_id: Option<&str>) -> Result<Vec<ResultRecord>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM results WHERE ?1 IS NULL OR student_id = ?1
         ORDER BY created_at DESC, rowid DESC",
        RESULT_COLUMNS
    ))?;
    let rows = stmt
        .query_map([student_id], ResultRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|r| hydrate(conn, r)).collect()
}

fn write_subjects(conn: &Connection, result_id: &str, subjects: &[SubjectMark]) -> Result<(), AppError> {
    conn.execute("DELETE FROM result_subjects WHERE result_id = ?", [result_id])?;
    let mut stmt = conn
        .prepare("INSERT INTO result_subjects(result_id, idx, name, marks) VALUES(?, ?, ?, ?)")?;
    for (idx, s) in subjects.iter().enumerate() {
        stmt.execute((result_id, idx as i64, s.name.trim(), s.marks))?;
    }
    Ok(())
}

/// Records a graded result; total and grade come from `calc::summarize`.
pub fn add_graded(
    conn: &Connection,
    student_id: &str,
    semester: i64,
    subjects: &[SubjectMark],
) -> Result<ResultRecord, AppError> {
    let summary = calc::summarize(subjects)?;
    debug!(total = summary.total, average = summary.average, grade = summary.grade.as_str(), "graded");
    let id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO results(id, student_id, semester, total, grade, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            student_id,
            semester,
            summary.total,
            summary.grade.as_str(),
            db::now_ts(),
        ),
    )?;
    write_subjects(&tx, &id, subjects)?;
    tx.commit()?;
    get(conn, &id)?.ok_or_else(|| AppError::not_found("result"))
}

/// Replaces subjects and/or semester of a graded result. Total and grade are
/// recomputed together whenever subjects change.
pub fn update_graded(
    conn: &Connection,
    result_id: &str,
    semester: Option<i64>,
    subjects: Option<&[SubjectMark]>,
) -> Result<ResultRecord, AppError> {
    let current = get(conn, result_id)?.ok_or_else(|| AppError::not_found("result"))?;
    if matches!(current.body, ResultBody::File { .. }) && subjects.is_some() {
        return Err(AppError::invalid(
            "result was uploaded as a file; subjects cannot be edited",
        ));
    }
    let tx = conn.unchecked_transaction()?;
    if let Some(subjects) = subjects {
        let summary = calc::summarize(subjects)?;
        debug!(total = summary.total, average = summary.average, grade = summary.grade.as_str(), "regraded");
        tx.execute(
            "UPDATE results SET total = ?, grade = ? WHERE id = ?",
            (summary.total, summary.grade.as_str(), result_id),
        )?;
        write_subjects(&tx, result_id, subjects)?;
    }
    if let Some(semester) = semester {
        tx.execute(
            "UPDATE results SET semester = ? WHERE id = ?",
            (semester, result_id),
        )?;
    }
    tx.commit()?;
    get(conn, result_id)?.ok_or_else(|| AppError::not_found("result"))
}

pub fn add_file(
    conn: &Connection,
    student_id: &str,
    semester: i64,
    file: &StoredFile,
) -> Result<ResultRecord, AppError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO results(id, student_id, semester, file_path, file_name, checksum, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            student_id,
            semester,
            &file.rel_path,
            &file.file_name,
            &file.checksum,
            db::now_ts(),
        ),
    )?;
    get(conn, &id)?.ok_or_else(|| AppError::not_found("result"))
}

/// Deletes a result and returns it so the caller can drop any stored file.
pub fn delete(conn: &Connection, result_id: &str) -> Result<ResultRecord, AppError> {
    let current = get(conn, result_id)?.ok_or_else(|| AppError::not_found("result"))?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM result_subjects WHERE result_id = ?", [result_id])?;
    tx.execute("DELETE FROM results WHERE id = ?", [result_id])?;
    tx.commit()?;
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_db;

    fn marks(list: &[(&str, f64)]) -> Vec<SubjectMark> {
        list.iter()
            .map(|(n, m)| SubjectMark {
                name: n.to_string(),
                marks: *m,
            })
            .collect()
    }

    fn seed(conn: &Connection) {
        for id in ["s1", "s2"] {
            conn.execute(
                "INSERT INTO students(id, name, email, password_hash, created_at)
                 VALUES(?, 'S', ?, 'h', '2026-01-01T00:00:00.000Z')",
                (id, format!("{}@x.com", id)),
            )
            .expect("seed");
        }
    }

    #[test]
    fn graded_result_keeps_subject_order_and_grade() {
        let conn = open_memory_db().expect("db");
        seed(&conn);
        let r = add_graded(
            &conn,
            "s1",
            1,
            &marks(&[("math", 90.0), ("physics", 80.0), ("chemistry", 70.0)]),
        )
        .expect("add");
        match &r.body {
            ResultBody::Subjects {
                subjects,
                total,
                grade,
            } => {
                assert_eq!(*total, 240.0);
                assert_eq!(grade, "A");
                let names: Vec<_> = subjects.iter().map(|s| s.name.as_str()).collect();
                assert_eq!(names, vec!["math", "physics", "chemistry"]);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn update_recomputes_total_and_grade_together() {
        let conn = open_memory_db().expect("db");
        seed(&conn);
        let r = add_graded(&conn, "s1", 1, &marks(&[("math", 95.0)])).expect("add");
        let u = update_graded(&conn, &r.id, None, Some(marks(&[("math", 40.0), ("art", 60.0)]).as_slice()))
            .expect("update");
        match u.body {
            ResultBody::Subjects { total, grade, .. } => {
                assert_eq!(total, 100.0);
                assert_eq!(grade, "C");
            }
            other => panic!("unexpected body: {:?}", other),
        }
        assert!(update_graded(&conn, &r.id, None, Some(&[][..])).is_err());
    }

    #[test]
    fn foreign_result_looks_missing() {
        let conn = open_memory_db().expect("db");
        seed(&conn);
        let r = add_graded(&conn, "s1", 2, &marks(&[("math", 50.0)])).expect("add");
        assert!(get_owned(&conn, &r.id, "s1").is_ok());
        assert_eq!(get_owned(&conn, &r.id, "s2").expect_err("foreign").code(), "not_found");
        assert_eq!(get_owned(&conn, "nope", "s1").expect_err("missing").code(), "not_found");
    }

    #[test]
    fn delete_removes_subjects() {
        let conn = open_memory_db().expect("db");
        seed(&conn);
        let r = add_graded(&conn, "s1", 1, &marks(&[("math", 50.0)])).expect("add");
        delete(&conn, &r.id).expect("delete");
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM result_subjects", [], |r| r.get(0))
            .expect("count");
        assert_eq!(left, 0);
        assert!(list(&conn, Some("s1")).expect("list").is_empty());
    }
}
