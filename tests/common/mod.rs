#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tempfile::{tempdir, TempDir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents).expect("write temp file contents");
        path
    }

    /// Creates a SQLite database under the workspace, seeds it with `ddl`,
    /// and returns its path.
    pub fn database(&self, name: &str, ddl: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let conn = Connection::open(&path).expect("create fixture db");
        conn.execute_batch(ddl).expect("seed fixture db");
        path
    }
}

/// Reopens a database produced by the binary under test.
pub fn open_db(path: &Path) -> Connection {
    Connection::open(path).expect("open generated db")
}

/// All rows of `table` as stringified cells, ordered by the engine.
pub fn read_rows(conn: &Connection, sql: &str) -> Vec<Vec<String>> {
    let mut stmt = conn.prepare(sql).expect("prepare query");
    let column_count = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            let mut cells = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value: rusqlite::types::Value = row.get(idx)?;
                cells.push(match value {
                    rusqlite::types::Value::Null => "NULL".to_string(),
                    rusqlite::types::Value::Integer(i) => i.to_string(),
                    rusqlite::types::Value::Real(f) => f.to_string(),
                    rusqlite::types::Value::Text(s) => s,
                    rusqlite::types::Value::Blob(b) => format!("{b:?}"),
                });
            }
            Ok(cells)
        })
        .expect("query rows");
    rows.collect::<Result<Vec<_>, _>>().expect("collect rows")
}

/// The stored `CREATE TABLE` text for `table`, if the table exists.
pub fn schema_sql(conn: &Connection, table: &str) -> Option<String> {
    conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )
    .ok()
}

/// Table names present in the database, sorted.
pub fn table_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
        .expect("prepare listing");
    stmt.query_map([], |row| row.get(0))
        .expect("query names")
        .collect::<Result<Vec<_>, _>>()
        .expect("collect names")
}
