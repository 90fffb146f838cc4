//! The table-matching cascade.
//!
//! For each reference table the engine tries three content heuristics in
//! order of cost and confidence: exact equality of sorted-row fingerprints,
//! a multiset-Jaccard similarity over the catalog sample, and finally a
//! distinctive-value probe against a deeper window of target rows. The first
//! strategy to name a single target table wins.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use log::debug;
use rusqlite::Connection;

use crate::catalog::{self, TableInfo};

/// Rows compared per table by the sorted-fingerprint strategy.
const FINGERPRINT_ROWS: usize = 3;
/// Minimum multiset-Jaccard score the overlap strategy accepts.
const OVERLAP_THRESHOLD: f64 = 0.5;
/// Reference rows scanned for probe values.
const PROBE_REFERENCE_ROWS: usize = 50;
/// Target rows scanned for probe hits. Wider than the reference window: the
/// reference supplies the probes, the target is the haystack they must land in.
const PROBE_TARGET_ROWS: usize = 200;
/// Values this short collide incidentally and are excluded from probing.
const PROBE_MIN_VALUE_LEN: usize = 4;
/// Minimum hit ratio the probe strategy accepts. Empirically tuned.
const PROBE_THRESHOLD: f64 = 0.1;

/// Which heuristic produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    SortedRows,
    ValueOverlap,
    DistinctiveProbe,
}

impl Strategy {
    pub fn number(self) -> u8 {
        match self {
            Strategy::SortedRows => 1,
            Strategy::ValueOverlap => 2,
            Strategy::DistinctiveProbe => 3,
        }
    }
}

/// Target tables grouped by column count, the cascade's only prefilter.
pub struct CandidateIndex {
    by_column_count: HashMap<usize, Vec<usize>>,
}

impl CandidateIndex {
    pub fn build(tables: &[TableInfo]) -> Self {
        let mut by_column_count: HashMap<usize, Vec<usize>> = HashMap::new();
        for (idx, table) in tables.iter().enumerate() {
            by_column_count
                .entry(table.column_count)
                .or_default()
                .push(idx);
        }
        Self { by_column_count }
    }

    /// Candidates with the given column count, minus tables already claimed
    /// by an earlier match.
    pub fn candidates<'t>(
        &self,
        tables: &'t [TableInfo],
        column_count: usize,
        used: &HashSet<String>,
    ) -> Vec<&'t TableInfo> {
        self.by_column_count
            .get(&column_count)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&idx| &tables[idx])
                    .filter(|table| !used.contains(&table.name))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Runs the cascade for one reference table. Returns the matched candidate
/// and the strategy that found it, or `None` when all three strategies pass.
pub fn find_match<'t>(
    reference: &TableInfo,
    candidates: &[&'t TableInfo],
    ref_conn: &Connection,
    target_conn: &Connection,
) -> Result<Option<(&'t TableInfo, Strategy)>> {
    if let Some(found) = match_sorted_rows(reference, candidates) {
        return Ok(Some((found, Strategy::SortedRows)));
    }
    if let Some(found) = match_value_overlap(reference, candidates) {
        return Ok(Some((found, Strategy::ValueOverlap)));
    }
    if let Some(found) = match_distinctive_probe(reference, candidates, ref_conn, target_conn)? {
        return Ok(Some((found, Strategy::DistinctiveProbe)));
    }
    Ok(None)
}

/// Strategy 1: positional equality of sorted-row fingerprints.
///
/// Sorting each row's cells canonicalises the value multiset, which any
/// column permutation preserves. Brittle when the two databases return their
/// first rows in different orders; Strategy 2 absorbs that case.
fn match_sorted_rows<'t>(
    reference: &TableInfo,
    candidates: &[&'t TableInfo],
) -> Option<&'t TableInfo> {
    let want = sorted_fingerprints(&reference.first_rows, FINGERPRINT_ROWS);
    if want.is_empty() {
        return None;
    }
    let mut best: Option<&TableInfo> = None;
    for &candidate in candidates {
        if sorted_fingerprints(&candidate.first_rows, FINGERPRINT_ROWS) != want {
            continue;
        }
        debug!("sorted-row fingerprints match '{}'", candidate.name);
        // Ties go to the candidate with the nearest row count; a deprecated
        // shadow table carries identical leading rows but a truncated count.
        best = match best {
            Some(current)
                if current.row_count.abs_diff(reference.row_count)
                    <= candidate.row_count.abs_diff(reference.row_count) =>
            {
                Some(current)
            }
            _ => Some(candidate),
        };
    }
    best
}

fn sorted_fingerprints(rows: &[Vec<String>], limit: usize) -> Vec<Vec<String>> {
    rows.iter()
        .take(limit)
        .map(|row| {
            let mut cells = row.clone();
            cells.sort_unstable();
            cells
        })
        .collect()
}

/// Strategy 2: multiset Jaccard over all cell values in the catalog sample.
fn match_value_overlap<'t>(
    reference: &TableInfo,
    candidates: &[&'t TableInfo],
) -> Option<&'t TableInfo> {
    let ref_counts = value_counts(&reference.first_rows);
    let mut best: Option<(&TableInfo, f64)> = None;
    for &candidate in candidates {
        let score = multiset_jaccard(&ref_counts, &value_counts(&candidate.first_rows));
        debug!(
            "value overlap '{}' vs '{}': {score:.3}",
            reference.name, candidate.name
        );
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    match best {
        Some((candidate, score)) if score >= OVERLAP_THRESHOLD => Some(candidate),
        _ => None,
    }
}

/// Strategy 3: fingerprint the reference with its distinctive values and
/// measure how many land anywhere in a deep sample of each candidate.
fn match_distinctive_probe<'t>(
    reference: &TableInfo,
    candidates: &[&'t TableInfo],
    ref_conn: &Connection,
    target_conn: &Connection,
) -> Result<Option<&'t TableInfo>> {
    let probes: HashSet<String> =
        catalog::sample_rows(ref_conn, &reference.name, PROBE_REFERENCE_ROWS)?
            .into_iter()
            .flatten()
            .filter(|value| value.len() > PROBE_MIN_VALUE_LEN)
            .collect();
    if probes.is_empty() {
        return Ok(None);
    }

    let mut best: Option<(&TableInfo, f64)> = None;
    for &candidate in candidates {
        let haystack: HashSet<String> =
            catalog::sample_rows(target_conn, &candidate.name, PROBE_TARGET_ROWS)?
                .into_iter()
                .flatten()
                .collect();
        let hits = probes.iter().filter(|probe| haystack.contains(*probe)).count();
        let ratio = hits as f64 / probes.len() as f64;
        debug!(
            "distinctive probe '{}' vs '{}': {hits}/{} ({ratio:.3})",
            reference.name,
            candidate.name,
            probes.len()
        );
        if best.is_none_or(|(_, top)| ratio > top) {
            best = Some((candidate, ratio));
        }
    }
    Ok(match best {
        Some((candidate, ratio)) if ratio > PROBE_THRESHOLD => Some(candidate),
        _ => None,
    })
}

pub(crate) fn value_counts(rows: &[Vec<String>]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for row in rows {
        for cell in row {
            *counts.entry(cell.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// Jaccard similarity on multisets: sum of per-key minimum counts over sum of
/// per-key maximum counts. Two empty multisets score 1, one-sided emptiness
/// scores 0.
pub fn multiset_jaccard(a: &HashMap<String, usize>, b: &HashMap<String, usize>) -> f64 {
    let mut intersection = 0usize;
    let mut union = 0usize;
    for (key, &count_a) in a {
        let count_b = b.get(key).copied().unwrap_or(0);
        intersection += count_a.min(count_b);
        union += count_a.max(count_b);
    }
    for (key, &count_b) in b {
        if !a.contains_key(key) {
            union += count_b;
        }
    }
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}
