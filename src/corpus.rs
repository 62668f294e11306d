// 📚 Corpus Assembler
// Combines one normalized release per year into a multi-year corpus:
//   stacked (one row per entity per year) for zip histories
//   joined  (one row per entity, a rent set per year) for metro histories

use crate::deduplication::DeduplicationEngine;
use crate::error::{FmrError, Result};
use crate::parser::{self, anchor_date, NormalizedTable};
use crate::records::{RentField, RentRecord, RentSizes};
use crate::source::SourceTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;
use tracing::{info, warn};

// ============================================================================
// JOIN POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinPolicy {
    /// Keep entities present in every year merged so far
    Inner,
    /// Keep every entity seen in any year
    Outer,
}

impl FromStr for JoinPolicy {
    type Err = FmrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "inner" => Ok(JoinPolicy::Inner),
            "outer" => Ok(JoinPolicy::Outer),
            _ => Err(FmrError::Configuration(format!(
                "Merge method must be either inner or outer, got '{}'",
                s
            ))),
        }
    }
}

// ============================================================================
// JOINED CORPUS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub entity_id: String,
    /// Rents per release year; a year is absent when the entity wasn't published that year
    pub by_year: BTreeMap<i32, RentSizes>,
}

impl JoinedRow {
    pub fn value(&self, year: i32, field: RentField) -> Option<f64> {
        self.by_year.get(&year).and_then(|r| r.get(field))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinedCorpus {
    pub years: Vec<i32>,
    pub rows: Vec<JoinedRow>,
}

impl JoinedCorpus {
    /// Year-namespaced column names, e.g. `2019_0BR`
    pub fn column_names(&self) -> Vec<String> {
        self.years
            .iter()
            .flat_map(|year| {
                RentField::ALL
                    .iter()
                    .map(move |f| format!("{}_{}", year, f.bedroom_code()))
            })
            .collect()
    }

    pub fn get(&self, entity_id: &str) -> Option<&JoinedRow> {
        self.rows.iter().find(|r| r.entity_id == entity_id)
    }

    /// Long format: one record per entity per published year, dated at `anchor_month`
    pub fn to_records(&self, anchor_month: u32) -> Result<Vec<RentRecord>> {
        let mut records = Vec::new();
        for row in &self.rows {
            for (year, rents) in &row.by_year {
                let period = anchor_date(*year, anchor_month)?;
                records.push(RentRecord::new(row.entity_id.clone(), period, *rents));
            }
        }
        records.sort_by(|a, b| (a.period, &a.entity_id).cmp(&(b.period, &b.entity_id)));
        Ok(records)
    }
}

// ============================================================================
// COMBINATION
// ============================================================================

/// Concatenate per-year tables, keep only entities present in every year,
/// and sort by (period, entity).
pub fn stack_tables(tables: &[Vec<RentRecord>]) -> Vec<RentRecord> {
    let mut common: Option<HashSet<&str>> = None;
    for table in tables {
        let ids: HashSet<&str> = table.iter().map(|r| r.entity_id.as_str()).collect();
        common = Some(match common {
            None => ids,
            Some(prev) => prev.intersection(&ids).copied().collect(),
        });
    }
    let common = common.unwrap_or_default();

    let mut stacked: Vec<RentRecord> = tables
        .iter()
        .flatten()
        .filter(|r| common.contains(r.entity_id.as_str()))
        .cloned()
        .collect();
    stacked.sort_by(|a, b| (a.period, &a.entity_id).cmp(&(b.period, &b.entity_id)));
    stacked
}

/// Merge per-year tables on the entity identifier
pub fn join_tables(tables: &[NormalizedTable], policy: JoinPolicy) -> JoinedCorpus {
    let mut merged: BTreeMap<String, BTreeMap<i32, RentSizes>> = BTreeMap::new();
    let mut years = BTreeSet::new();

    for (i, table) in tables.iter().enumerate() {
        if !years.insert(table.year) {
            warn!(year = table.year, file = %table.source_file, "year already merged; later file wins");
        }

        if i > 0 && policy == JoinPolicy::Inner {
            let ids: HashSet<&str> = table.rows.iter().map(|r| r.entity_id.as_str()).collect();
            merged.retain(|id, _| ids.contains(id.as_str()));
        }

        for row in &table.rows {
            if i > 0 && policy == JoinPolicy::Inner && !merged.contains_key(&row.entity_id) {
                continue;
            }
            merged
                .entry(row.entity_id.clone())
                .or_default()
                .insert(table.year, row.rents);
        }
    }

    JoinedCorpus {
        years: years.into_iter().collect(),
        rows: merged
            .into_iter()
            .map(|(entity_id, by_year)| JoinedRow { entity_id, by_year })
            .collect(),
    }
}

/// Keep one table per release year; a later file for a year already seen
/// (a revised release) replaces the earlier one
fn one_per_year(tables: Vec<NormalizedTable>) -> Vec<NormalizedTable> {
    let mut by_year: BTreeMap<i32, NormalizedTable> = BTreeMap::new();
    for table in tables {
        let file = table.source_file.clone();
        if let Some(replaced) = by_year.insert(table.year, table) {
            warn!(
                year = replaced.year,
                dropped = %replaced.source_file,
                kept = %file,
                "year already loaded; later file wins"
            );
        }
    }
    by_year.into_values().collect()
}

// ============================================================================
// CORPUS ASSEMBLER
// ============================================================================

pub struct CorpusAssembler {
    pub dedup: DeduplicationEngine,

    /// Month each release is dated at (October for small-area releases)
    pub anchor_month: u32,
}

impl CorpusAssembler {
    pub fn new(dedup: DeduplicationEngine, anchor_month: u32) -> Self {
        CorpusAssembler {
            dedup,
            anchor_month,
        }
    }

    /// Ceiling dedup, October anchor
    pub fn zip_level() -> Self {
        Self::new(DeduplicationEngine::zip_level(), 10)
    }

    /// Unrounded dedup, October anchor
    pub fn metro_level() -> Self {
        Self::new(DeduplicationEngine::metro_level(), 10)
    }

    /// Normalize and deduplicate every source. Files that don't match their
    /// year's layout are logged and left out; they never abort the load.
    pub fn prepare(&self, sources: &[SourceTable]) -> Vec<NormalizedTable> {
        let mut tables = Vec::with_capacity(sources.len());
        for source in sources {
            match parser::normalize(&source.file_name, &source.table) {
                Ok(table) => tables.push(self.dedup.collapse_table(&table)),
                Err(err) => {
                    warn!(file = %source.file_name, error = %err, "skipping source file");
                }
            }
        }
        tables
    }

    /// Stacked zip-level corpus
    pub fn stack(&self, sources: &[SourceTable]) -> Result<Vec<RentRecord>> {
        let dated = one_per_year(self.prepare(sources))
            .iter()
            .map(|t| t.tag_period(self.anchor_month))
            .collect::<Result<Vec<_>>>()?;
        let stacked = stack_tables(&dated);
        info!(
            files = sources.len(),
            years = dated.len(),
            rows = stacked.len(),
            "assembled stacked corpus"
        );
        Ok(stacked)
    }

    /// Joined metro-level corpus
    pub fn join(&self, sources: &[SourceTable], policy: JoinPolicy) -> JoinedCorpus {
        let mut tables = self.prepare(sources);
        tables.sort_by_key(|t| t.year);
        let joined = join_tables(&tables, policy);
        info!(
            files = sources.len(),
            entities = joined.rows.len(),
            ?policy,
            "assembled joined corpus"
        );
        joined
    }
}

impl Default for CorpusAssembler {
    fn default() -> Self {
        Self::zip_level()
    }
}

// ============================================================================
// TESTS
// ============================================================================
