// 🔍 Deduplication Engine - Collapse entities that span several source rows
// A zip code crossing county lines appears once per county in a release

use crate::parser::{NormalizedRow, NormalizedTable};
use crate::records::{mean_of_present, RentField, RentSizes};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// ROUNDING POLICY
// ============================================================================

/// How the mean of a duplicate group is rounded.
///
/// The zip pipeline rounds up; the metro pipeline keeps the float mean.
/// Both behaviours are historical and kept side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingPolicy {
    /// Round up to the next whole dollar
    Ceiling,
    /// Keep the arithmetic mean as is
    Unrounded,
}

impl RoundingPolicy {
    fn apply(&self, value: f64) -> f64 {
        match self {
            RoundingPolicy::Ceiling => value.ceil(),
            RoundingPolicy::Unrounded => value,
        }
    }
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

pub struct DeduplicationEngine {
    pub rounding: RoundingPolicy,
}

impl DeduplicationEngine {
    pub fn new(rounding: RoundingPolicy) -> Self {
        DeduplicationEngine { rounding }
    }

    /// Zip-level engine (ceiling)
    pub fn zip_level() -> Self {
        Self::new(RoundingPolicy::Ceiling)
    }

    /// Metro-level engine (no rounding)
    pub fn metro_level() -> Self {
        Self::new(RoundingPolicy::Unrounded)
    }

    /// Collapse rows sharing an identifier into one averaged row.
    ///
    /// Non-duplicate rows keep their relative order; one synthesized row per
    /// duplicate group follows, in order of the group's first appearance.
    pub fn collapse(&self, rows: &[NormalizedRow]) -> Vec<NormalizedRow> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for row in rows {
            *counts.entry(row.entity_id.as_str()).or_insert(0) += 1;
        }

        let mut unique = Vec::with_capacity(counts.len());
        let mut groups: Vec<(&str, Vec<&RentSizes>)> = Vec::new();
        let mut group_index: HashMap<&str, usize> = HashMap::new();

        for row in rows {
            let id = row.entity_id.as_str();
            if counts[id] == 1 {
                unique.push(row.clone());
                continue;
            }
            let idx = *group_index.entry(id).or_insert_with(|| {
                groups.push((id, Vec::new()));
                groups.len() - 1
            });
            groups[idx].1.push(&row.rents);
        }

        if !groups.is_empty() {
            debug!(
                duplicates = groups.len(),
                rounding = ?self.rounding,
                "collapsing duplicate entities"
            );
        }

        for (id, members) in groups {
            unique.push(NormalizedRow::new(id, self.merge(&members)));
        }

        unique
    }

    /// Collapse a whole normalized table, keeping its provenance
    pub fn collapse_table(&self, table: &NormalizedTable) -> NormalizedTable {
        NormalizedTable {
            rows: self.collapse(&table.rows),
            ..table.clone()
        }
    }

    /// Field-wise mean of the group's present values, rounded per policy
    fn merge(&self, members: &[&RentSizes]) -> RentSizes {
        let mut merged = RentSizes::default();
        for field in RentField::ALL {
            let values: Vec<Option<f64>> = members.iter().map(|r| r.get(field)).collect();
            let mean = mean_of_present(&values).map(|m| self.rounding.apply(m));
            merged.set(field, mean);
        }
        merged
    }
}

impl Default for DeduplicationEngine {
    fn default() -> Self {
        Self::zip_level()
    }
}

// ============================================================================
// TESTS
// ============================================================================
