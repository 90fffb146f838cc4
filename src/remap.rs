//! The run driver: owns the three database handles, walks the reference
//! catalog through the matching cascade, and keeps the run's bookkeeping in
//! an explicit [`RunState`] rather than process-wide globals.

use std::{
    collections::{BTreeMap, HashSet},
    fs::{self, File},
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};
use log::{info, warn};
use rusqlite::{Connection, OpenFlags};

use crate::{
    catalog::{self, TableInfo},
    cli::Cli,
    columns, copy,
    matching::{self, CandidateIndex, Strategy},
};

const MAPPING_FILE: &str = "table_mapping.json";

/// One accepted pairing and the evidence trail behind it.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub orig_table: String,
    pub hashed_table: String,
    pub column_mapping: Vec<usize>,
    pub strategy: Strategy,
}

/// Mutable state of a single run. The used-set grows monotonically, so
/// earlier reference tables get priority on shared candidates; the overall
/// assignment is greedy and order-dependent by design.
#[derive(Default)]
pub struct RunState {
    filter: Option<HashSet<String>>,
    used: HashSet<String>,
    mapping: BTreeMap<String, String>,
    matches: Vec<MatchResult>,
    unmatched: Vec<String>,
    empty: usize,
    skipped: usize,
}

impl RunState {
    pub fn new(filter: Option<HashSet<String>>) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// True when a filter is active and does not name this table.
    pub fn filtered_out(&self, table: &str) -> bool {
        self.filter
            .as_ref()
            .is_some_and(|names| !names.contains(table))
    }

    pub fn used(&self) -> &HashSet<String> {
        &self.used
    }

    pub fn record_match(
        &mut self,
        reference: &TableInfo,
        target: &TableInfo,
        column_mapping: Vec<usize>,
        strategy: Strategy,
    ) {
        self.used.insert(target.name.clone());
        self.mapping
            .insert(reference.name.clone(), target.name.clone());
        self.matches.push(MatchResult {
            orig_table: reference.name.clone(),
            hashed_table: target.name.clone(),
            column_mapping,
            strategy,
        });
    }

    pub fn record_unmatched(&mut self, table: &str) {
        self.unmatched.push(table.to_string());
    }

    pub fn matches(&self) -> &[MatchResult] {
        &self.matches
    }

    pub fn mapping(&self) -> &BTreeMap<String, String> {
        &self.mapping
    }

    fn write_mapping(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Creating mapping file {path:?}"))?;
        serde_json::to_writer_pretty(file, &self.mapping).context("Writing table mapping JSON")?;
        info!("Wrote {} mapping(s) to {path:?}", self.mapping.len());
        Ok(())
    }

    fn log_summary(&self, total_reference: usize) {
        let mut per_strategy = [0usize; 3];
        for result in &self.matches {
            per_strategy[usize::from(result.strategy.number()) - 1] += 1;
        }
        info!(
            "Matched {} of {} reference table(s) (strategy 1: {}, strategy 2: {}, strategy 3: {})",
            self.matches.len(),
            total_reference,
            per_strategy[0],
            per_strategy[1],
            per_strategy[2]
        );
        if self.empty > 0 {
            info!("{} empty table(s) emitted as schema only", self.empty);
        }
        if self.skipped > 0 {
            info!("{} table(s) skipped by the filter", self.skipped);
        }
        if !self.unmatched.is_empty() {
            warn!(
                "{} unmatched reference table(s): {}",
                self.unmatched.len(),
                self.unmatched.join(", ")
            );
        }
        info!("Done!");
    }
}

pub fn execute(args: &Cli) -> Result<()> {
    let filter = args
        .filter
        .as_deref()
        .map(read_filter_file)
        .transpose()?;

    let reference = open_input(&args.original_db_path)?;
    let target = open_input(&args.hashed_db_path)?;
    let mut output = open_output(&args.generated_db_path)?;

    let ref_catalog = catalog::load(&reference, true)
        .with_context(|| format!("Loading catalog from {:?}", args.original_db_path))?;
    let target_catalog = catalog::load(&target, false)
        .with_context(|| format!("Loading catalog from {:?}", args.hashed_db_path))?;
    info!(
        "Loaded {} reference and {} target table(s)",
        ref_catalog.len(),
        target_catalog.len()
    );

    let index = CandidateIndex::build(&target_catalog);
    let mut state = RunState::new(filter);

    for table in &ref_catalog {
        if state.filtered_out(&table.name) {
            state.skipped += 1;
            continue;
        }
        // An empty table carries no signal; emit its schema and move on
        // without consuming a candidate.
        if table.row_count == 0 {
            info!("'{}' is empty; emitting schema only", table.name);
            copy::create_table(&reference, &output, &table.name)?;
            state.empty += 1;
            continue;
        }
        let candidates = index.candidates(&target_catalog, table.column_count, state.used());
        if candidates.is_empty() {
            warn!("no matching table for '{}'", table.name);
            state.record_unmatched(&table.name);
            continue;
        }
        match matching::find_match(table, &candidates, &reference, &target)? {
            Some((matched, strategy)) => {
                info!(
                    "'{}' -> '{}' (strategy {})",
                    table.name,
                    matched.name,
                    strategy.number()
                );
                let mapping = columns::infer_mapping(
                    &reference,
                    &target,
                    &table.name,
                    &matched.name,
                    table.column_count,
                )?;
                copy::copy_table(
                    &reference,
                    &target,
                    &mut output,
                    &table.name,
                    &matched.name,
                    &mapping,
                )?;
                state.record_match(table, matched, mapping, strategy);
            }
            None => {
                warn!("no matching table for '{}'", table.name);
                state.record_unmatched(&table.name);
            }
        }
    }

    if args.generate_table_mapping {
        state.write_mapping(Path::new(MAPPING_FILE))?;
    }
    state.log_summary(ref_catalog.len());
    Ok(())
}

fn open_input(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Opening database {path:?}"))
}

/// A previous output is discarded wholesale; every run rebuilds from scratch.
fn open_output(path: &Path) -> Result<Connection> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Removing stale output {path:?}"))?;
    }
    let conn =
        Connection::open(path).with_context(|| format!("Creating output database {path:?}"))?;
    // journal_mode returns a result row, so this goes through query_row.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))
        .context("Enabling write-ahead logging")?;
    Ok(conn)
}

fn read_filter_file(path: &Path) -> Result<HashSet<String>> {
    let file = File::open(path).with_context(|| format!("Opening filter file {path:?}"))?;
    let mut tables = HashSet::new();
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("Reading filter file {path:?}"))?;
        let name = line.trim();
        if !name.is_empty() {
            tables.insert(name.to_string());
        }
    }
    Ok(tables)
}
