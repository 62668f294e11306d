// 🚨 Anomaly Scorer - Which entities keep drifting away from the pack?
//
// Rents are turned into period-over-period growth, every period gets a band of
// Mean_Rent ± k·STD, and each entity is counted for the periods it leaves it.

use crate::error::{FmrError, Result};
use crate::records::{mean_of_present, AnalysisField, RentRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

// ============================================================================
// REPORT TYPES
// ============================================================================

/// One ranked entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRow {
    #[serde(rename = "ZIPCODE")]
    pub entity_id: String,

    #[serde(rename = "Above STD")]
    pub above: usize,

    #[serde(rename = "Below STD")]
    pub below: usize,

    #[serde(rename = "Total")]
    pub total: usize,

    /// Average growth across surviving periods; `None` when no period survives
    #[serde(rename = "Mean_growth_rate")]
    pub mean_growth_rate: Option<f64>,
}

/// The band one period's entities were measured against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBand {
    #[serde(rename = "Date")]
    pub period: NaiveDate,

    /// Growth of the cross-entity mean level
    #[serde(rename = "Mean_Rent")]
    pub mean_rent: f64,

    /// Undefined with fewer than two entities; such a period flags nobody
    #[serde(rename = "STD")]
    pub std: Option<f64>,

    #[serde(rename = "Upper_Limit")]
    pub upper: Option<f64>,

    #[serde(rename = "Lower_Limit")]
    pub lower: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub field: Option<AnalysisField>,
    pub rows: Vec<AnomalyRow>,
    pub bands: Vec<PeriodBand>,
}

impl AnomalyReport {
    pub fn get(&self, entity_id: &str) -> Option<&AnomalyRow> {
        self.rows.iter().find(|r| r.entity_id == entity_id)
    }

    /// Entities flagged at least once, in rank order
    pub fn flagged(&self) -> impl Iterator<Item = &AnomalyRow> {
        self.rows.iter().filter(|r| r.total > 0)
    }
}

// ============================================================================
// ANOMALY SCORER
// ============================================================================

pub struct AnomalyScorer {
    /// Band half-width in standard deviations (k)
    pub std_multiplier: f64,
}

impl AnomalyScorer {
    pub fn new(std_multiplier: f64) -> Self {
        AnomalyScorer { std_multiplier }
    }

    pub fn score(&self, records: &[RentRecord], field: AnalysisField) -> Result<AnomalyReport> {
        let (entities, levels) = pivot(records, field)?;

        let mut changes_by_entity: Vec<Vec<f64>> = vec![Vec::new(); entities.len()];
        let mut above = vec![0usize; entities.len()];
        let mut below = vec![0usize; entities.len()];
        let mut bands = Vec::new();

        let periods: Vec<(&NaiveDate, &Vec<Option<f64>>)> = levels.iter().collect();
        for pair in periods.windows(2) {
            let (_, previous) = pair[0];
            let (&period, current) = pair[1];

            let Some(changes) = period_changes(previous, current) else {
                debug!(%period, "skipping period with undefined growth");
                continue;
            };
            let Some(mean_change) = pct_change(mean_of_present(previous), mean_of_present(current))
            else {
                continue;
            };

            let std = sample_std(&changes);
            let upper = std.map(|s| mean_change + self.std_multiplier * s);
            let lower = std.map(|s| mean_change - self.std_multiplier * s);

            for (i, change) in changes.iter().enumerate() {
                changes_by_entity[i].push(*change);
                if upper.is_some_and(|u| *change > u) {
                    above[i] += 1;
                }
                if lower.is_some_and(|l| *change < l) {
                    below[i] += 1;
                }
            }

            bands.push(PeriodBand {
                period,
                mean_rent: mean_change,
                std,
                upper,
                lower,
            });
        }

        let mut rows: Vec<AnomalyRow> = entities
            .into_iter()
            .enumerate()
            .map(|(i, entity_id)| {
                let growth: Vec<Option<f64>> =
                    changes_by_entity[i].iter().copied().map(Some).collect();
                AnomalyRow {
                    entity_id,
                    above: above[i],
                    below: below[i],
                    total: above[i] + below[i],
                    mean_growth_rate: mean_of_present(&growth),
                }
            })
            .collect();
        rows.sort_by(rank);

        info!(
            field = field.name(),
            entities = rows.len(),
            periods = bands.len(),
            k = self.std_multiplier,
            "scored anomalies"
        );

        Ok(AnomalyReport {
            field: Some(field),
            rows,
            bands,
        })
    }
}

impl Default for AnomalyScorer {
    fn default() -> Self {
        Self::new(1.5)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

type Levels = BTreeMap<NaiveDate, Vec<Option<f64>>>;

/// Wide layout: periods ascending, one slot per entity (entities ascending)
fn pivot(records: &[RentRecord], field: AnalysisField) -> Result<(Vec<String>, Levels)> {
    let entities: Vec<String> = records
        .iter()
        .map(|r| r.entity_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let slot: BTreeMap<&str, usize> = entities
        .iter()
        .enumerate()
        .map(|(i, e)| (e.as_str(), i))
        .collect();

    let mut levels: Levels = BTreeMap::new();
    let mut seen = BTreeSet::new();
    for record in records {
        if !seen.insert((record.entity_id.as_str(), record.period)) {
            return Err(FmrError::InvalidArgument(format!(
                "duplicate observation for {} at {}",
                record.entity_id, record.period
            )));
        }
        let row = levels
            .entry(record.period)
            .or_insert_with(|| vec![None; entities.len()]);
        row[slot[record.entity_id.as_str()]] = record.value(field);
    }

    Ok((entities, levels))
}

/// Growth of every entity, or `None` if any of them is undefined
fn period_changes(previous: &[Option<f64>], current: &[Option<f64>]) -> Option<Vec<f64>> {
    previous
        .iter()
        .zip(current)
        .map(|(p, c)| pct_change(*p, *c))
        .collect()
}

fn pct_change(previous: Option<f64>, current: Option<f64>) -> Option<f64> {
    match (previous, current) {
        (Some(p), Some(c)) if p != 0.0 => Some((c - p) / p),
        _ => None,
    }
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Total, Above, Below descending; entity id ascending on ties
fn rank(a: &AnomalyRow, b: &AnomalyRow) -> Ordering {
    (b.total, b.above, b.below)
        .cmp(&(a.total, a.above, a.below))
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

// ============================================================================
// TESTS
// ============================================================================
