//! Column alignment between a matched pair of tables.
//!
//! Columns in the target database are reordered as well as renamed, so after
//! a table-level match the engine still has to work out which target column
//! feeds which reference column. Evidence comes from per-column value
//! vectors sampled from both sides; four passes of decreasing strength
//! resolve the permutation.

use anyhow::Result;
use log::debug;
use rusqlite::Connection;

use crate::{catalog, matching};

/// Rows sampled per side when aligning columns. Deep enough that drifting
/// row order still leaves per-column frequency signatures comparable.
const MAPPING_SAMPLE_ROWS: usize = 200;
/// Minimum frequency-Jaccard score the distribution pass accepts. Low enough
/// to catch columns whose distribution matches while exact values drift,
/// high enough to suppress accidental alignment on short common values.
const FREQUENCY_THRESHOLD: f64 = 0.3;

/// Infers `mapping` with `mapping[i] = j` meaning reference column `i` is
/// fed by target column `j`. The result is a permutation except where no
/// evidence accrued; such columns fall back to their own index, which the
/// row copier accepts.
pub fn infer_mapping(
    ref_conn: &Connection,
    target_conn: &Connection,
    ref_table: &str,
    target_table: &str,
    column_count: usize,
) -> Result<Vec<usize>> {
    let ref_cols = transpose(
        &catalog::sample_rows(ref_conn, ref_table, MAPPING_SAMPLE_ROWS)?,
        column_count,
    );
    let target_cols = transpose(
        &catalog::sample_rows(target_conn, target_table, MAPPING_SAMPLE_ROWS)?,
        column_count,
    );
    let mapping = align_columns(&ref_cols, &target_cols);
    debug!("column mapping '{ref_table}' -> '{target_table}': {mapping:?}");
    Ok(mapping)
}

fn transpose(rows: &[Vec<String>], column_count: usize) -> Vec<Vec<String>> {
    let mut columns = vec![Vec::with_capacity(rows.len()); column_count];
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            columns[idx].push(cell.clone());
        }
    }
    columns
}

/// Aligns reference columns to target columns given per-column value vectors.
///
/// Pass order: exact vector equality, then frequency-map similarity, then
/// positional pairing of the leftovers when their counts agree, and finally
/// an identity fill for anything still unresolved.
pub fn align_columns(ref_cols: &[Vec<String>], target_cols: &[Vec<String>]) -> Vec<usize> {
    let column_count = ref_cols.len();
    let mut mapping: Vec<Option<usize>> = vec![None; column_count];
    let mut used = vec![false; column_count];

    // Exact equality, first match wins.
    for (i, ref_col) in ref_cols.iter().enumerate() {
        for (j, target_col) in target_cols.iter().enumerate() {
            if !used[j] && ref_col == target_col {
                mapping[i] = Some(j);
                used[j] = true;
                break;
            }
        }
    }

    // Frequency similarity for columns whose exact values drifted, such as
    // autoincrement-like counters regenerated between builds.
    for (i, ref_col) in ref_cols.iter().enumerate() {
        if mapping[i].is_some() {
            continue;
        }
        let ref_counts = column_counts(ref_col);
        let mut best: Option<(usize, f64)> = None;
        for (j, target_col) in target_cols.iter().enumerate() {
            if used[j] {
                continue;
            }
            let score = matching::multiset_jaccard(&ref_counts, &column_counts(target_col));
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((j, score));
            }
        }
        if let Some((j, score)) = best {
            if score > FREQUENCY_THRESHOLD {
                mapping[i] = Some(j);
                used[j] = true;
            }
        }
    }

    // When the leftovers pair off one-to-one, take them positionally.
    let unmapped: Vec<usize> = (0..column_count).filter(|&i| mapping[i].is_none()).collect();
    let unused: Vec<usize> = (0..column_count).filter(|&j| !used[j]).collect();
    if !unmapped.is_empty() && unmapped.len() == unused.len() {
        for (&i, &j) in unmapped.iter().zip(&unused) {
            mapping[i] = Some(j);
        }
    }

    mapping
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.unwrap_or(i))
        .collect()
}

fn column_counts(column: &[String]) -> std::collections::HashMap<String, usize> {
    let mut counts = std::collections::HashMap::new();
    for value in column {
        *counts.entry(value.clone()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::*;

    fn cols(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|col| col.iter().map(|v| v.to_string()).collect())
            .collect()
    }

    #[test]
    fn exact_equality_resolves_a_swap() {
        let reference = cols(&[&["1", "2"], &["Alice", "Bob"]]);
        let target = cols(&[&["Alice", "Bob"], &["1", "2"]]);
        assert_eq!(align_columns(&reference, &target), vec![1, 0]);
    }

    #[test]
    fn exact_equality_resolves_a_three_way_rotation() {
        let reference = cols(&[&["1", "2"], &["A-1", "B-2"], &["3", "7"]]);
        let target = cols(&[&["A-1", "B-2"], &["3", "7"], &["1", "2"]]);
        assert_eq!(align_columns(&reference, &target), vec![2, 0, 1]);
    }

    #[test]
    fn frequency_pass_aligns_drifted_counters() {
        // First column: same value distribution, different order, so exact
        // equality fails but the frequency maps coincide.
        let reference = cols(&[&["a", "a", "b", "c"], &["p", "q", "r", "s"]]);
        let target = cols(&[&["p", "q", "r", "s"], &["b", "a", "c", "a"]]);
        assert_eq!(align_columns(&reference, &target), vec![1, 0]);
    }

    #[test]
    fn frequency_pass_prefers_the_lowest_index_on_a_tie() {
        // Both target columns carry identical distributions; neither matches
        // exactly. The first eligible target index wins.
        let reference = cols(&[&["x", "x", "y"], &["x", "x", "y"]]);
        let target = cols(&[&["y", "x", "x"], &["x", "y", "x"]]);
        assert_eq!(align_columns(&reference, &target), vec![0, 1]);
    }

    #[test]
    fn leftover_pair_is_taken_positionally() {
        // Columns 0 map exactly; columns 1 and 2 hold disjoint values with no
        // frequency overlap, leaving one unmapped pair each side.
        let reference = cols(&[&["1", "2"], &["aaa", "bbb"], &["ccc", "ddd"]]);
        let target = cols(&[&["eee", "fff"], &["1", "2"], &["ggg", "hhh"]]);
        let mapping = align_columns(&reference, &target);
        assert_eq!(mapping[0], 1);
        // Remaining reference columns 1, 2 pair with remaining targets 0, 2.
        assert_eq!(mapping[1], 0);
        assert_eq!(mapping[2], 2);
    }

    #[test]
    fn mapping_is_always_a_valid_length() {
        let reference = cols(&[&["1"], &["2"], &["3"]]);
        let target = cols(&[&["9"], &["8"], &["7"]]);
        let mapping = align_columns(&reference, &target);
        assert_eq!(mapping.len(), 3);
        assert!(mapping.iter().all(|&j| j < 3));
    }

    #[test]
    fn infer_mapping_reads_both_databases() {
        let ref_conn = Connection::open_in_memory().expect("ref db");
        let tgt_conn = Connection::open_in_memory().expect("tgt db");
        ref_conn
            .execute_batch(
                "CREATE TABLE users (id INTEGER, name TEXT);
                 INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob');",
            )
            .expect("seed ref");
        tgt_conn
            .execute_batch(
                "CREATE TABLE [h_u] (n TEXT, i INTEGER);
                 INSERT INTO [h_u] VALUES ('Alice', 1), ('Bob', 2);",
            )
            .expect("seed tgt");

        let mapping =
            infer_mapping(&ref_conn, &tgt_conn, "users", "h_u", 2).expect("infer mapping");
        assert_eq!(mapping, vec![1, 0]);
    }
}
