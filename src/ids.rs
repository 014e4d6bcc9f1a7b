use crate::error::AppError;
use rusqlite::Connection;

/// Width of the zero-padded sequence part of a student identifier.
const SEQUENCE_WIDTH: usize = 4;

/// Allocates the next student identifier for `prefix` + `year`, e.g. `STU20260007`.
///
/// The counter row is bumped and read back in one statement, so two
/// connections can never observe the same value. When the scope has no
/// counter yet it starts after the highest identifier already stored.
pub fn allocate_student_code(conn: &Connection, prefix: &str, year: i32) -> Result<String, AppError> {
    let scope = format!("{}{}", prefix, year);
    let pattern = format!("{}%", scope);
    let code_len = (scope.len() + SEQUENCE_WIDTH) as i64;

    let next: i64 = conn.query_row(
        "INSERT INTO id_sequences(scope, last_value)
         VALUES(
           ?1,
           COALESCE((
             SELECT MAX(CAST(substr(student_code, ?3) AS INTEGER))
             FROM students
             WHERE student_code LIKE ?2 AND length(student_code) = ?4
           ), 0) + 1
         )
         ON CONFLICT(scope) DO UPDATE SET last_value = last_value + 1
         RETURNING last_value",
        (&scope, &pattern, scope.len() as i64 + 1, code_len),
        |r| r.get(0),
    )?;

    if next >= 10_i64.pow(SEQUENCE_WIDTH as u32) {
        return Err(AppError::Conflict(format!(
            "identifier sequence for {} is exhausted",
            scope
        )));
    }
    Ok(format_code(&scope, next))
}

fn format_code(scope: &str, seq: i64) -> String {
    format!("{}{:0width$}", scope, seq, width = SEQUENCE_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn sequences_are_per_year_and_padded() {
        let conn = db::open_memory_db().expect("db");
        assert_eq!(allocate_student_code(&conn, "STU", 2026).expect("id"), "STU20260001");
        assert_eq!(allocate_student_code(&conn, "STU", 2026).expect("id"), "STU20260002");
        assert_eq!(allocate_student_code(&conn, "STU", 2027).expect("id"), "STU20270001");
        assert_eq!(allocate_student_code(&conn, "STU", 2026).expect("id"), "STU20260003");
    }

    #[test]
    fn new_scope_continues_after_existing_codes() {
        let conn = db::open_memory_db().expect("db");
        conn.execute(
            "INSERT INTO students(id, student_code, name, email, password_hash, created_at)
             VALUES('s1', 'STU20260041', 'A', 'a@x.com', 'h', '2026-01-01T00:00:00.000Z')",
            [],
        )
        .expect("seed");
        assert_eq!(allocate_student_code(&conn, "STU", 2026).expect("id"), "STU20260042");
    }

    #[test]
    fn concurrent_connections_never_share_a_value() {
        let dir = std::env::temp_dir().join(format!("colleged-ids-{}", uuid::Uuid::new_v4()));
        db::open_db(&dir).expect("init db");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dir = dir.clone();
                std::thread::spawn(move || {
                    let conn = db::open_db(&dir).expect("open db");
                    (0..25)
                        .map(|_| allocate_student_code(&conn, "STU", 2026).expect("id"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread"))
            .collect();
        let n = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), n);
        assert_eq!(all.last().map(String::as_str), Some("STU20260100"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
