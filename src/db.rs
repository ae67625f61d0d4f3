use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::model::{AssignmentRecord, CourseRecord, User};

pub const DB_FILE_NAME: &str = "coursetrack.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            date_created TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        [],
    )?;

    // Required columns stay nullable so rows written by older builds or restored
    // from bundles can be loaded and reported instead of failing the whole query.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT,
            date_created TEXT,
            manual_grade INTEGER NOT NULL DEFAULT 0,
            grade REAL
        )",
        [],
    )?;
    ensure_courses_manual_grade(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            name TEXT,
            due_date TEXT,
            date_created TEXT,
            is_completed INTEGER,
            weight REAL,
            grade REAL
        )",
        [],
    )?;

    // Back-references: User.courses and Course.assignments, ordered by position.
    // The UNIQUE child column is what makes ownership single-valued.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_courses(
            user_id TEXT NOT NULL,
            course_id TEXT NOT NULL UNIQUE,
            position INTEGER NOT NULL,
            PRIMARY KEY(user_id, course_id),
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_user_courses_user ON user_courses(user_id, position)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_assignments(
            course_id TEXT NOT NULL,
            assignment_id TEXT NOT NULL UNIQUE,
            position INTEGER NOT NULL,
            PRIMARY KEY(course_id, assignment_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(assignment_id) REFERENCES assignments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_assignments_course ON course_assignments(course_id, position)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_courses_manual_grade(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "courses", "manual_grade")? {
        conn.execute(
            "ALTER TABLE courses ADD COLUMN manual_grade INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "courses", "grade")? {
        conn.execute("ALTER TABLE courses ADD COLUMN grade REAL", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(
            serde_json::from_str(&s).with_context(|| format!("setting {} is not JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn find_user_by_name(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, username, password_hash FROM users WHERE username = ?",
            [username],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((id, username, password_hash)) = row else {
        return Ok(None);
    };
    let courses = user_course_ids(conn, &id)?;
    Ok(Some(User {
        id,
        username,
        password_hash,
        courses,
    }))
}

pub fn username_for(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT username FROM users WHERE id = ?", [user_id], |r| {
        r.get(0)
    })
    .optional()
}

pub fn user_course_ids(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT course_id FROM user_courses WHERE user_id = ? ORDER BY position",
    )?;
    let ids = stmt
        .query_map([user_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Whether `course_id` is in `user_id`'s course list.
pub fn user_owns_course(conn: &Connection, user_id: &str, course_id: &str) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM user_courses WHERE user_id = ? AND course_id = ?",
            (user_id, course_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn course_has_assignment(
    conn: &Connection,
    course_id: &str,
    assignment_id: &str,
) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM course_assignments WHERE course_id = ? AND assignment_id = ?",
            (course_id, assignment_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn course_exists(conn: &Connection, course_id: &str) -> rusqlite::Result<bool> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| r.get(0))
        .optional()?;
    Ok(hit.is_some())
}

fn course_assignment_ids(conn: &Connection, course_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT assignment_id FROM course_assignments WHERE course_id = ? ORDER BY position",
    )?;
    let ids = stmt
        .query_map([course_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub fn fetch_course(conn: &Connection, course_id: &str) -> rusqlite::Result<Option<CourseRecord>> {
    let row = conn
        .query_row(
            "SELECT id, name, date_created, manual_grade, grade FROM courses WHERE id = ?",
            [course_id],
            |r| {
                Ok(CourseRecord {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    date_created: r.get(2)?,
                    assignments: Vec::new(),
                    manual_grade: r.get::<_, i64>(3)? != 0,
                    grade: r.get(4)?,
                })
            },
        )
        .optional()?;
    let Some(mut course) = row else {
        return Ok(None);
    };
    course.assignments = course_assignment_ids(conn, course_id)?;
    Ok(Some(course))
}

/// Courses owned by `user_id`, in the user's course order.
pub fn fetch_user_courses(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<CourseRecord>> {
    let mut out = Vec::new();
    for id in user_course_ids(conn, user_id)? {
        // A dangling back-reference has no record to report; skip it.
        if let Some(course) = fetch_course(conn, &id)? {
            out.push(course);
        }
    }
    Ok(out)
}

/// Assignments of `course_id`, in the course's assignment order.
pub fn fetch_course_assignments(
    conn: &Connection,
    course_id: &str,
) -> rusqlite::Result<Vec<AssignmentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, ca.course_id, a.name, a.due_date, a.date_created, a.is_completed, a.weight, a.grade
         FROM course_assignments ca
         JOIN assignments a ON a.id = ca.assignment_id
         WHERE ca.course_id = ?
         ORDER BY ca.position",
    )?;
    let rows = stmt
        .query_map([course_id], |r| {
            Ok(AssignmentRecord {
                id: r.get(0)?,
                course_id: r.get(1)?,
                name: r.get(2)?,
                due_date: r.get(3)?,
                date_created: r.get(4)?,
                is_completed: r.get::<_, Option<i64>>(5)?.map(|v| v != 0),
                weight: r.get(6)?,
                grade: r.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn next_position(conn: &Connection, table: &str, owner_col: &str, owner: &str) -> rusqlite::Result<i64> {
    let sql = format!(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM {} WHERE {} = ?",
        table, owner_col
    );
    conn.query_row(&sql, [owner], |r| r.get(0))
}
