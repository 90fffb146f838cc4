//! Catalog loading and row sampling for the input databases.
//!
//! All reads against the reference and target databases flow through this
//! module. It provides:
//!
//! - **Table enumeration**: user tables from `sqlite_master`, with the
//!   engine-statistics table and (on the reference side) legacy `v1_` shadow
//!   tables filtered out.
//! - **Sampling**: the first N rows of a table as stringified cells, the form
//!   every matching heuristic compares.
//! - **Identifier quoting**: square brackets, so hashed names containing
//!   arbitrary characters survive interpolation into SQL text.

use anyhow::{Context, Result};
use rusqlite::{types::ValueRef, Connection};

/// Rows held per table in the catalog. Deeper windows are fetched on demand
/// by the matching and column-alignment code.
pub const CATALOG_SAMPLE_ROWS: usize = 10;

const STAT_TABLE: &str = "sqlite_stat1";
const LEGACY_PREFIX: &str = "v1_";

/// Snapshot of one user table: identity, shape, and a small row sample.
/// Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub column_count: usize,
    pub row_count: u64,
    pub first_rows: Vec<Vec<String>>,
}

/// Loads the catalog of user tables in `sqlite_master` order.
///
/// `sqlite_stat1` is always skipped; its row data is hashed alongside the
/// schema and would derail content matching. `v1_`-prefixed tables are
/// deprecated shadows that exist only in the reference database, so they are
/// skipped when `exclude_legacy` is set and retained otherwise.
pub fn load(conn: &Connection, exclude_legacy: bool) -> Result<Vec<TableInfo>> {
    let mut tables = Vec::new();
    for name in table_names(conn, exclude_legacy)? {
        let column_count = column_names(conn, &name)?.len();
        let row_count = row_count(conn, &name)?;
        let first_rows = sample_rows(conn, &name, CATALOG_SAMPLE_ROWS)?;
        tables.push(TableInfo {
            name,
            column_count,
            row_count,
            first_rows,
        });
    }
    Ok(tables)
}

fn table_names(conn: &Connection, exclude_legacy: bool) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table'")
        .context("Listing tables")?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut tables = Vec::new();
    for name in names {
        let name = name.context("Reading table name")?;
        if name == STAT_TABLE {
            continue;
        }
        if exclude_legacy && name.starts_with(LEGACY_PREFIX) {
            continue;
        }
        tables.push(name);
    }
    Ok(tables)
}

/// Column names of `table` in declaration order, via `PRAGMA table_info`.
pub fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Reading column metadata for '{table}'"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Reading column metadata for '{table}'"))?;
    Ok(names)
}

pub fn row_count(conn: &Connection, table: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    conn.query_row(&sql, [], |row| row.get(0))
        .with_context(|| format!("Counting rows in '{table}'"))
}

/// Fetches up to `limit` rows of `table` in the engine's natural order, each
/// cell coerced to its matching string form. No `ORDER BY` is applied; the
/// heuristics downstream tolerate order drift between the two databases.
pub fn sample_rows(conn: &Connection, table: &str, limit: usize) -> Result<Vec<Vec<String>>> {
    let sql = format!("SELECT * FROM {} LIMIT {limit}", quote_ident(table));
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Sampling rows from '{table}'"))?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query([])?;
    let mut sampled = Vec::new();
    while let Some(row) = rows
        .next()
        .with_context(|| format!("Sampling rows from '{table}'"))?
    {
        let mut cells = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            cells.push(cell_to_string(row.get_ref(idx)?));
        }
        sampled.push(cells);
    }
    Ok(sampled)
}

/// Bracket-quotes an identifier so hashed names round-trip through SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("[{name}]")
}

// The exact tokens matter: both databases are stringified through this one
// function, and every strategy score compares the results verbatim.
fn cell_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::from("<nil>"),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("{bytes:?}"),
    }
}
