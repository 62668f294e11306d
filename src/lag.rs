// 📈 Lag Correlator
// How many years does rent trail the consumer price index?

use crate::records::AnalysisField;
use crate::temporal::AlignedRow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ============================================================================
// LAG TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagRow {
    pub period: NaiveDate,
    pub value: Option<f64>,
    /// CPI moved `lag` periods later; missing where the shift runs off the series
    pub shifted_cpi: Option<f64>,
    pub cpi: Option<f64>,
}

/// Field against shifted CPI, with the unshifted CPI for reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagTable {
    pub field: AnalysisField,
    pub lag: i32,
    pub rows: Vec<LagRow>,
}

impl LagTable {
    pub fn column_names(&self) -> [String; 3] {
        [
            self.field.name().to_string(),
            format!("CPI (lag {})", self.lag),
            "CPI".to_string(),
        ]
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LagOutcome {
    /// Best lag cleared the significance threshold
    Significant {
        lag: i32,
        /// Rounded to two decimals
        correlation: f64,
        table: LagTable,
    },

    /// No lag reached the threshold; nothing further to show
    NoSignificantRelationship { best_correlation: f64 },
}

impl LagOutcome {
    pub fn is_significant(&self) -> bool {
        matches!(self, LagOutcome::Significant { .. })
    }

    pub fn summary(&self, field: AnalysisField) -> String {
        match self {
            LagOutcome::Significant {
                lag, correlation, ..
            } => format!(
                "The correlation between {} and the consumer price index, after a {} year lag, is {:.2}",
                field, lag, correlation
            ),
            LagOutcome::NoSignificantRelationship { best_correlation } => format!(
                "No significant relationship between {} and the consumer price index (best correlation {:.2})",
                field, best_correlation
            ),
        }
    }
}

// ============================================================================
// LAG CORRELATOR
// ============================================================================

pub struct LagCorrelator {
    /// Year lags tried in search mode (default: 0..=3)
    pub candidate_lags: Vec<i32>,

    /// Minimum correlation worth reporting (default: 0.80)
    pub significance_threshold: f64,
}

impl LagCorrelator {
    pub fn new() -> Self {
        LagCorrelator {
            candidate_lags: vec![0, 1, 2, 3],
            significance_threshold: 0.80,
        }
    }

    /// Estimate mode: shift CPI by a caller-chosen lag
    pub fn estimate(&self, rows: &[AlignedRow], field: AnalysisField, lag: i32) -> LagTable {
        let cpi: Vec<Option<f64>> = rows.iter().map(|r| Some(r.cpi)).collect();
        let shifted = shift(&cpi, lag);

        LagTable {
            field,
            lag,
            rows: rows
                .iter()
                .zip(shifted)
                .map(|(row, shifted_cpi)| LagRow {
                    period: row.period,
                    value: row.value(field),
                    shifted_cpi,
                    cpi: Some(row.cpi),
                })
                .collect(),
        }
    }

    /// Search mode: the candidate lag with the highest correlation.
    /// A lag only wins by beating the best so far, starting from zero.
    pub fn search(&self, rows: &[AlignedRow], field: AnalysisField) -> LagOutcome {
        let values: Vec<Option<f64>> = rows.iter().map(|r| r.value(field)).collect();
        let cpi: Vec<Option<f64>> = rows.iter().map(|r| Some(r.cpi)).collect();

        let mut best_correlation = 0.0;
        let mut best_lag = 0;
        for &lag in &self.candidate_lags {
            let correlation = lag_correlation(&values, &shift(&cpi, lag));
            debug!(lag, ?correlation, field = field.name(), "tested lag");
            if let Some(c) = correlation {
                if c > best_correlation {
                    best_correlation = c;
                    best_lag = lag;
                }
            }
        }

        if best_correlation < self.significance_threshold {
            info!(
                field = field.name(),
                best_correlation, "no significant relationship with CPI"
            );
            return LagOutcome::NoSignificantRelationship { best_correlation };
        }

        info!(field = field.name(), lag = best_lag, best_correlation, "found CPI lag");
        LagOutcome::Significant {
            lag: best_lag,
            correlation: round2(best_correlation),
            table: self.estimate(rows, field, best_lag),
        }
    }
}

impl Default for LagCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SERIES HELPERS
// ============================================================================

/// Move values `lag` positions later (earlier for negative lags), padding with missing
pub fn shift(values: &[Option<f64>], lag: i32) -> Vec<Option<f64>> {
    let n = values.len();
    let offset = lag.unsigned_abs() as usize;
    (0..n)
        .map(|i| {
            if lag >= 0 {
                i.checked_sub(offset).and_then(|j| values[j])
            } else {
                values.get(i + offset).copied().flatten()
            }
        })
        .collect()
}

/// Mean and sample standard deviation; `None` below two values or with no spread
fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std == 0.0 || !std.is_finite() {
        None
    } else {
        Some((mean, std))
    }
}

/// Z-scores (sample standard deviation)
pub fn z_normalize(values: &[f64]) -> Option<Vec<f64>> {
    let (mean, std) = mean_std(values)?;
    Some(values.iter().map(|v| (v - mean) / std).collect())
}

/// Pearson correlation of two series over the rows where both are present,
/// each z-normalized over those rows first
pub fn lag_correlation(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .unzip();

    let zx = z_normalize(&xs)?;
    let zy = z_normalize(&ys)?;
    let n = zx.len() as f64;
    let r = zx.iter().zip(&zy).map(|(a, b)| a * b).sum::<f64>() / (n - 1.0);
    r.is_finite().then_some(r)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{RentField, RentSizes};

    const DIGITS_OF_PI: [f64; 20] = [
        3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0, 5.0, 3.0, 5.0, 8.0, 9.0, 7.0, 9.0, 3.0, 2.0, 3.0,
        8.0, 4.0,
    ];
    const DIGITS_OF_E: [f64; 20] = [
        2.0, 7.0, 1.0, 8.0, 2.0, 8.0, 1.0, 8.0, 2.0, 8.0, 4.0, 5.0, 9.0, 0.0, 4.0, 5.0, 2.0, 3.0,
        5.0, 3.0,
    ];

    /// Aligned rows whose Two-Bedroom column is `field` and CPI column is `cpi`
    fn aligned(field: &[f64], cpi: &[f64]) -> Vec<AlignedRow> {
        field
            .iter()
            .zip(cpi)
            .enumerate()
            .map(|(i, (f, c))| {
                let mut rents = RentSizes::default();
                rents.set(RentField::TwoBedroom, Some(*f));
                AlignedRow {
                    period: NaiveDate::from_ymd_opt(2000 + i as i32, 10, 1).unwrap(),
                    rents,
                    mean_rent: (f + c) / 2.0,
                    cpi: *c,
                }
            })
            .collect()
    }

    const TWO_BEDROOM: AnalysisField = AnalysisField::Size(RentField::TwoBedroom);

    #[test]
    fn test_shift_pads_with_missing() {
        let values = [Some(1.0), Some(2.0), Some(3.0)];
        assert_eq!(shift(&values, 0), values.to_vec());
        assert_eq!(shift(&values, 2), vec![None, None, Some(1.0)]);
        assert_eq!(shift(&values, -1), vec![Some(2.0), Some(3.0), None]);
        assert_eq!(shift(&values, 5), vec![None, None, None]);
    }

    #[test]
    fn test_z_normalize_zero_mean_unit_std() {
        let z = z_normalize(&[2.0, 4.0, 6.0]).unwrap();
        assert_eq!(z, vec![-1.0, 0.0, 1.0]);
        assert!(z_normalize(&[5.0, 5.0]).is_none());
        assert!(z_normalize(&[5.0]).is_none());
    }

    #[test]
    fn test_correlation_of_identical_and_opposite_series() {
        let x = [Some(1.0), Some(3.0), Some(2.0), Some(5.0)];
        let neg: Vec<Option<f64>> = x.iter().map(|v| v.map(|v| -v)).collect();

        assert!((lag_correlation(&x, &x).unwrap() - 1.0).abs() < 1e-12);
        assert!((lag_correlation(&x, &neg).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_search_finds_exact_two_year_lag() {
        let cpi = DIGITS_OF_PI;
        let mut field = [4.0; 20];
        field[2..].copy_from_slice(&cpi[..18]);

        let outcome = LagCorrelator::new().search(&aligned(&field, &cpi), TWO_BEDROOM);

        match outcome {
            LagOutcome::Significant {
                lag,
                correlation,
                table,
            } => {
                assert_eq!(lag, 2);
                assert_eq!(correlation, 1.0);
                assert_eq!(table.lag, 2);
                assert_eq!(table.rows[0].shifted_cpi, None);
                assert_eq!(table.rows[2].shifted_cpi, Some(3.0));
                assert_eq!(table.rows[2].cpi, Some(4.0));
            }
            other => panic!("expected a significant lag, got {:?}", other),
        }
    }

    #[test]
    fn test_search_uncorrelated_series_reports_nothing() {
        let outcome =
            LagCorrelator::new().search(&aligned(&DIGITS_OF_PI, &DIGITS_OF_E), TWO_BEDROOM);

        match outcome {
            LagOutcome::NoSignificantRelationship { best_correlation } => {
                assert!(best_correlation < 0.8);
                assert!(best_correlation > 0.0);
            }
            other => panic!("expected no relationship, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_correlation_never_beats_zero_baseline() {
        let field: Vec<f64> = DIGITS_OF_PI.iter().map(|v| -v).collect();
        let correlator = LagCorrelator {
            candidate_lags: vec![0],
            significance_threshold: 0.8,
        };

        let outcome = correlator.search(&aligned(&field, &DIGITS_OF_PI), TWO_BEDROOM);

        assert_eq!(
            outcome,
            LagOutcome::NoSignificantRelationship {
                best_correlation: 0.0
            }
        );
    }

    #[test]
    fn test_constant_field_has_no_relationship() {
        let outcome = LagCorrelator::new().search(&aligned(&[7.0; 20], &DIGITS_OF_PI), TWO_BEDROOM);

        assert_eq!(
            outcome,
            LagOutcome::NoSignificantRelationship {
                best_correlation: 0.0
            }
        );
    }

    #[test]
    fn test_estimate_table_columns() {
        let rows = aligned(&[1.0, 2.0, 3.0], &[10.0, 20.0, 30.0]);

        let table = LagCorrelator::new().estimate(&rows, TWO_BEDROOM, 1);

        assert_eq!(table.column_names(), ["Two-Bedroom", "CPI (lag 1)", "CPI"]);
        assert_eq!(table.rows[1].value, Some(2.0));
        assert_eq!(table.rows[1].shifted_cpi, Some(10.0));
        assert_eq!(table.rows[1].cpi, Some(20.0));
    }

    #[test]
    fn test_mean_rent_field_reads_aligned_mean() {
        let rows = aligned(&[1.0, 2.0], &[3.0, 4.0]);
        let table = LagCorrelator::new().estimate(&rows, AnalysisField::MeanRent, 0);
        assert_eq!(table.rows[0].value, Some(2.0));
    }
}
