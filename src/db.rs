use chrono::{SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE: &str = "college.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    // Several sidecars may share one workspace; writers wait instead of failing.
    conn.busy_timeout(Duration::from_secs(10))?;
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |r| r.get(0))?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_memory_db() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

/// `fold(x)`: Unicode lowercase for search. SQLite's own `lower()` folds ASCII only.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    register_functions(conn)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_code TEXT UNIQUE,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'student',
            course TEXT,
            admission_status TEXT NOT NULL DEFAULT 'Approved',
            fee_paid INTEGER NOT NULL DEFAULT 0,
            address TEXT,
            phone TEXT,
            dob TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_created ON students(created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_role ON students(role)",
        [],
    )?;

    // One row per identifier scope (prefix + year); bumped atomically on allocation.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS id_sequences(
            scope TEXT PRIMARY KEY,
            last_value INTEGER NOT NULL
        )",
        [],
    )?;

    // Fees keep their student_id after the student is deleted, so no foreign key here.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS fees(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            amount REAL NOT NULL,
            paid INTEGER NOT NULL DEFAULT 0,
            payment_date TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fees_student ON fees(student_id, paid, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            semester INTEGER NOT NULL,
            total REAL,
            grade TEXT,
            file_path TEXT,
            file_name TEXT,
            checksum TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            CHECK ((file_path IS NULL) <> (grade IS NULL))
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_student ON results(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_subjects(
            result_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            name TEXT NOT NULL,
            marks REAL NOT NULL,
            PRIMARY KEY(result_id, idx),
            FOREIGN KEY(result_id) REFERENCES results(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notices(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'general',
            priority TEXT NOT NULL DEFAULT 'medium',
            created_by TEXT,
            created_at TEXT NOT NULL,
            expires_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notices_expires ON notices(expires_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_schedules(
            id TEXT PRIMARY KEY,
            course TEXT NOT NULL,
            semester INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_entries(
            schedule_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            subject TEXT NOT NULL,
            exam_date TEXT NOT NULL,
            exam_time TEXT,
            venue TEXT,
            PRIMARY KEY(schedule_id, idx),
            FOREIGN KEY(schedule_id) REFERENCES exam_schedules(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_schedules_course ON exam_schedules(course, semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT,
            course TEXT NOT NULL,
            semester INTEGER NOT NULL,
            topics_json TEXT NOT NULL DEFAULT '[]',
            description TEXT,
            credits INTEGER,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_course ON subjects(course, semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admit_cards(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_name TEXT NOT NULL,
            checksum TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_admit_cards_student ON admit_cards(student_id)",
        [],
    )?;

    Ok(())
}

/// Current UTC time in the fixed-width RFC 3339 form stored in every timestamp
/// column. Equal widths keep string comparison in SQL chronological.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalizes a caller-supplied timestamp (RFC 3339 or `YYYY-MM-DD`) to the
/// stored form. A bare date means midnight UTC.
pub fn normalize_ts(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(
            dt.with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| {
            dt.and_utc()
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        })
}
