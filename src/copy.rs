//! Schema creation and row copying into the output database.
//!
//! The output table always carries the reference's `CREATE TABLE` text
//! verbatim; row data streams from the target with its columns permuted by
//! the inferred mapping. Values travel as native SQLite values through
//! prepared statements, never as re-formatted strings.

use anyhow::{anyhow, Context, Result};
use log::debug;
use rusqlite::{params_from_iter, types::Value, Connection};

use crate::catalog::{self, quote_ident};

/// Replays the reference's `CREATE TABLE` statement into the output
/// database, byte-for-byte.
pub fn create_table(reference: &Connection, output: &Connection, table: &str) -> Result<()> {
    let create_sql: String = reference
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type='table' AND name=?1",
            [table],
            |row| row.get(0),
        )
        .with_context(|| format!("Reading CREATE TABLE statement for '{table}'"))?;
    debug!("{create_sql}");
    output
        .execute(&create_sql, [])
        .with_context(|| format!("Creating table '{table}' in the output database"))?;
    Ok(())
}

/// Creates `ref_table` in the output and streams every row of
/// `target_table` through `mapping` into it, one transaction per table.
///
/// The select list names the target's columns in mapping order, so position
/// `i` of each fetched row is already the value for reference column `i`.
pub fn copy_table(
    reference: &Connection,
    target: &Connection,
    output: &mut Connection,
    ref_table: &str,
    target_table: &str,
    mapping: &[usize],
) -> Result<()> {
    create_table(reference, output, ref_table)?;

    let target_columns = catalog::column_names(target, target_table)?;
    let select_list = mapping
        .iter()
        .map(|&j| {
            target_columns
                .get(j)
                .map(|name| quote_ident(name))
                .ok_or_else(|| anyhow!("Column index {j} out of range for '{target_table}'"))
        })
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let select_sql = format!(
        "SELECT {select_list} FROM {}",
        quote_ident(target_table)
    );
    let placeholders = vec!["?"; mapping.len()].join(", ");
    let insert_sql = format!(
        "INSERT INTO {} VALUES ({placeholders})",
        quote_ident(ref_table)
    );

    let tx = output
        .transaction()
        .with_context(|| format!("Starting copy transaction for '{ref_table}'"))?;
    {
        let mut select = target
            .prepare(&select_sql)
            .with_context(|| format!("Selecting rows from '{target_table}'"))?;
        let mut insert = tx
            .prepare(&insert_sql)
            .with_context(|| format!("Preparing insert into '{ref_table}'"))?;
        let mut rows = select.query([])?;
        let mut copied = 0u64;
        while let Some(row) = rows
            .next()
            .with_context(|| format!("Reading rows from '{target_table}'"))?
        {
            let values: Vec<Value> = (0..mapping.len())
                .map(|idx| row.get(idx))
                .collect::<Result<_, _>>()?;
            insert
                .execute(params_from_iter(values))
                .with_context(|| format!("Inserting into '{ref_table}'"))?;
            copied += 1;
        }
        debug!("copied {copied} row(s) into '{ref_table}'");
    }
    tx.commit()
        .with_context(|| format!("Committing copy into '{ref_table}'"))?;
    Ok(())
}
