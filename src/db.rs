use crate::rows::{AttendanceRecord, ScoreDetail, StudentBasic};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "catechd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            academic_year TEXT,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            saint_name TEXT,
            first_name TEXT,
            last_name TEXT,
            full_name TEXT,
            phone TEXT,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    // Attendance rows are stored as entered; the normalizer reads the
    // free-text weekday/status on every report.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            event_date TEXT NOT NULL,
            weekday TEXT,
            status TEXT,
            created_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class ON attendance_records(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance_records(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS score_details(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            half1 REAL,
            exam1 REAL,
            half2 REAL,
            exam2 REAL,
            updated_at TEXT,
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS terms(
            id TEXT PRIMARY KEY,
            academic_year TEXT NOT NULL,
            term_no INTEGER NOT NULL,
            total_weeks INTEGER NOT NULL,
            start_date TEXT,
            end_date TEXT,
            active INTEGER NOT NULL DEFAULT 0,
            UNIQUE(academic_year, term_no)
        )",
        [],
    )?;

    Ok(conn)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermRow {
    pub id: String,
    pub academic_year: String,
    pub term_no: i64,
    pub total_weeks: i64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub active: bool,
}

impl TermRow {
    pub fn window(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let parse = |s: &Option<String>| {
            s.as_deref()
                .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
        };
        (parse(&self.start_date), parse(&self.end_date))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "academicYear": self.academic_year,
            "termNo": self.term_no,
            "totalWeeks": self.total_weeks,
            "startDate": self.start_date,
            "endDate": self.end_date,
            "active": self.active,
        })
    }
}

fn term_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<TermRow> {
    Ok(TermRow {
        id: r.get(0)?,
        academic_year: r.get(1)?,
        term_no: r.get(2)?,
        total_weeks: r.get(3)?,
        start_date: r.get(4)?,
        end_date: r.get(5)?,
        active: r.get::<_, i64>(6)? != 0,
    })
}

const TERM_COLUMNS: &str = "id, academic_year, term_no, total_weeks, start_date, end_date, active";

pub fn list_terms(conn: &Connection) -> rusqlite::Result<Vec<TermRow>> {
    let sql = format!(
        "SELECT {} FROM terms ORDER BY academic_year, term_no",
        TERM_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], term_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn active_term(conn: &Connection) -> rusqlite::Result<Option<TermRow>> {
    let sql = format!("SELECT {} FROM terms WHERE active = 1 LIMIT 1", TERM_COLUMNS);
    conn.query_row(&sql, [], term_from_row).optional()
}

pub fn class_exists(conn: &Connection, class_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

pub fn student_in_class(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM students WHERE class_id = ? AND id = ?",
        (class_id, student_id),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentRow {
    pub basic: StudentBasic,
    pub phone: Option<String>,
    pub sort_order: i64,
}

pub fn list_students(conn: &Connection, class_id: &str) -> rusqlite::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, saint_name, first_name, last_name, full_name, phone, sort_order
         FROM students
         WHERE class_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(StudentRow {
                basic: StudentBasic {
                    id: r.get(0)?,
                    saint_name: r.get(1)?,
                    first_name: r.get(2)?,
                    last_name: r.get(3)?,
                    full_name: r.get(4)?,
                },
                phone: r.get(5)?,
                sort_order: r.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_attendance(
    conn: &Connection,
    class_id: &str,
    student_id: Option<&str>,
) -> rusqlite::Result<Vec<AttendanceRecord>> {
    // rowid keeps entry order, which the normalizer's first-seen rule relies on.
    match student_id {
        Some(sid) => {
            let mut stmt = conn.prepare(
                "SELECT student_id, event_date, weekday, status
                 FROM attendance_records
                 WHERE class_id = ? AND student_id = ?
                 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map((class_id, sid), attendance_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT student_id, event_date, weekday, status
                 FROM attendance_records
                 WHERE class_id = ?
                 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([class_id], attendance_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }
    }
}

pub fn score_detail(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> rusqlite::Result<Option<ScoreDetail>> {
    conn.query_row(
        "SELECT student_id, half1, exam1, half2, exam2
         FROM score_details
         WHERE class_id = ? AND student_id = ?",
        (class_id, student_id),
        score_from_row,
    )
    .optional()
}

pub fn list_score_details(conn: &Connection, class_id: &str) -> rusqlite::Result<Vec<ScoreDetail>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, half1, exam1, half2, exam2
         FROM score_details
         WHERE class_id = ?",
    )?;
    let rows = stmt
        .query_map([class_id], score_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn attendance_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    Ok(AttendanceRecord {
        student_id: r.get(0)?,
        event_date: r.get(1)?,
        weekday: r.get(2)?,
        status: r.get(3)?,
    })
}

fn score_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ScoreDetail> {
    Ok(ScoreDetail {
        id: r.get(0)?,
        half1: r.get(1)?,
        exam1: r.get(2)?,
        half2: r.get(3)?,
        exam2: r.get(4)?,
    })
}
