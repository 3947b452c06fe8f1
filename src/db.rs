use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::roster::StudentRecord;

/// Store failures the handlers need to tell apart. A unique-constraint hit
/// on the business student_id surfaces as DuplicateKey so callers can say
/// "this ID already exists" instead of a generic database error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("student_id already exists")]
    DuplicateKey,
    #[error("{0}")]
    Db(rusqlite::Error),
}

impl StoreError {
    fn from_sqlite(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(f, _) = &e {
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return StoreError::DuplicateKey;
            }
        }
        StoreError::Db(e)
    }
}

fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Opens (creating if needed) the roster database inside the given workspace
/// directory. The directory and database file name are injected by the
/// caller; nothing about the store location is hardcoded.
pub fn open_db(workspace: &Path, database_name: &str) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(database_name);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            student_name TEXT NOT NULL,
            grade_name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            phone TEXT NOT NULL,
            email TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    Ok(conn)
}

/// Inserts a batch of validated records inside one transaction. Any failure
/// (including a duplicate student_id against stored rows or between two rows
/// of the batch) rolls the whole batch back; zero rows land.
pub fn insert_many(conn: &Connection, records: &[StudentRecord]) -> Result<(), StoreError> {
    let tx = conn.unchecked_transaction().map_err(StoreError::from_sqlite)?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO students(
                   id, student_id, student_name, grade_name, class_name, phone, email, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .map_err(StoreError::from_sqlite)?;
        let now = now_stamp();
        for r in records {
            stmt.execute((
                Uuid::new_v4().to_string(),
                &r.student_id,
                &r.student_name,
                &r.grade_name,
                &r.class_name,
                &r.phone,
                &r.email,
                &now,
            ))
            .map_err(StoreError::from_sqlite)?;
        }
    }
    tx.commit().map_err(StoreError::from_sqlite)
}

/// Full-row update keyed by the internal id. Returns the affected-row count;
/// zero means the id does not exist.
pub fn update_student(
    conn: &Connection,
    id: &str,
    r: &StudentRecord,
) -> Result<usize, StoreError> {
    conn.execute(
        "UPDATE students SET
           student_id = ?,
           student_name = ?,
           grade_name = ?,
           class_name = ?,
           phone = ?,
           email = ?,
           updated_at = ?
         WHERE id = ?",
        (
            &r.student_id,
            &r.student_name,
            &r.grade_name,
            &r.class_name,
            &r.phone,
            &r.email,
            now_stamp(),
            id,
        ),
    )
    .map_err(StoreError::from_sqlite)
}

pub fn delete_student(conn: &Connection, id: &str) -> Result<usize, StoreError> {
    conn.execute("DELETE FROM students WHERE id = ?", [id])
        .map_err(StoreError::from_sqlite)
}

pub fn select_all(conn: &Connection) -> Result<Vec<(String, StudentRecord)>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, student_id, student_name, grade_name, class_name, phone, email
             FROM students
             ORDER BY grade_name, class_name, student_id",
        )
        .map_err(StoreError::from_sqlite)?;

    stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            StudentRecord {
                student_id: row.get(1)?,
                student_name: row.get(2)?,
                grade_name: row.get(3)?,
                class_name: row.get(4)?,
                phone: row.get(5)?,
                email: row.get(6)?,
            },
        ))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(StoreError::from_sqlite)
}
