// ⏰ Temporal Aligner
// CPI is published monthly; FMRs take effect once a year at the implementation
// month. Both are brought onto the same annual calendar before they meet.

use crate::error::{FmrError, Result};
use crate::records::{mean_of_present, AnalysisField, RentRecord, RentSizes};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// CPI MATRIX
// ============================================================================

/// CPI as published: one row per year label, one column per two-digit month label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpiMatrix {
    rows: BTreeMap<String, BTreeMap<String, Option<f64>>>,
}

impl CpiMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, year: impl Into<String>, month: impl Into<String>, value: Option<f64>) {
        self.rows
            .entry(year.into())
            .or_default()
            .insert(month.into(), value);
    }

    pub fn get(&self, year: &str, month: &str) -> Option<f64> {
        self.rows.get(year).and_then(|m| m.get(month)).copied().flatten()
    }

    pub fn years(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// CPI SERIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpiObservation {
    #[serde(rename = "Date")]
    pub period: NaiveDate,

    #[serde(rename = "CPI")]
    pub value: f64,
}

/// Single-column CPI series, ascending by period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpiSeries {
    pub observations: Vec<CpiObservation>,
}

impl CpiSeries {
    pub fn new(mut observations: Vec<CpiObservation>) -> Self {
        observations.sort_by_key(|o| o.period);
        CpiSeries { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Flatten the year × month matrix into a monthly series.
///
/// Missing cells are dropped and gaps stay gaps (bi-monthly areas keep
/// only the months they report).
pub fn transform_cpi_data(matrix: &CpiMatrix) -> Result<CpiSeries> {
    let mut observations = Vec::new();
    for (year_label, months) in &matrix.rows {
        let year: i32 = year_label
            .trim()
            .parse()
            .map_err(|_| FmrError::MalformedPeriod(format!("year '{}'", year_label)))?;

        for (month_label, value) in months {
            let period = month_start(year, month_label)?;
            if let Some(value) = value {
                observations.push(CpiObservation {
                    period,
                    value: *value,
                });
            }
        }
    }
    Ok(CpiSeries::new(observations))
}

fn month_start(year: i32, month_label: &str) -> Result<NaiveDate> {
    let label = month_label.trim();
    let month: u32 = label
        .parse()
        .ok()
        .filter(|_| !label.is_empty() && label.len() <= 2)
        .ok_or_else(|| FmrError::MalformedPeriod(format!("month '{}' in {}", month_label, year)))?;
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| FmrError::MalformedPeriod(format!("month '{}' in {}", month_label, year)))
}

// ============================================================================
// ANNUAL RE-BINNING
// ============================================================================

/// Start of the year-long window (anchored at `implementation_month`) containing `date`
pub fn window_start(date: NaiveDate, implementation_month: u32) -> Option<NaiveDate> {
    let year = if date.month() >= implementation_month {
        date.year()
    } else {
        date.year() - 1
    };
    NaiveDate::from_ymd_opt(year, implementation_month, 1)
}

/// Average the monthly series over annual windows starting at `implementation_month`.
/// Windows without observations produce no value.
pub fn rebin_annual(cpi: &CpiSeries, implementation_month: u32) -> Result<Vec<CpiObservation>> {
    FmrError::check_range("implementation_month", implementation_month as i64, 1, 12)?;

    let mut windows: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for obs in &cpi.observations {
        let start = window_start(obs.period, implementation_month)
            .ok_or_else(|| FmrError::MalformedPeriod(obs.period.to_string()))?;
        let slot = windows.entry(start).or_insert((0.0, 0));
        slot.0 += obs.value;
        slot.1 += 1;
    }

    Ok(windows
        .into_iter()
        .map(|(period, (sum, count))| CpiObservation {
            period,
            value: sum / count as f64,
        })
        .collect())
}

// ============================================================================
// ALIGNED SERIES
// ============================================================================

/// One rent period joined with the CPI of the same annual window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedRow {
    #[serde(rename = "Date")]
    pub period: NaiveDate,

    #[serde(flatten)]
    pub rents: RentSizes,

    /// Mean of the five rents and the CPI value
    #[serde(rename = "Mean_Rent")]
    pub mean_rent: f64,

    #[serde(rename = "CPI")]
    pub cpi: f64,
}

impl AlignedRow {
    /// Output column order
    pub const COLUMNS: [&'static str; 7] = [
        "Efficiency",
        "One-Bedroom",
        "Two-Bedroom",
        "Three-Bedroom",
        "Four-Bedroom",
        "Mean_Rent",
        "CPI",
    ];

    /// Values in `COLUMNS` order
    pub fn values(&self) -> [Option<f64>; 7] {
        let [a, b, c, d, e] = self.rents.values();
        [a, b, c, d, e, Some(self.mean_rent), Some(self.cpi)]
    }

    pub fn value(&self, field: AnalysisField) -> Option<f64> {
        match field {
            AnalysisField::Size(f) => self.rents.get(f),
            AnalysisField::MeanRent => Some(self.mean_rent),
        }
    }
}

/// Re-bin CPI at `implementation_month` and inner-join it with rent rows on
/// exact date equality. The month is validated before anything else runs.
///
/// `Mean_Rent` averages the present rent sizes together with the CPI value.
pub fn smooth_and_merge(
    cpi: &CpiSeries,
    rents: &[RentRecord],
    implementation_month: u32,
) -> Result<Vec<AlignedRow>> {
    FmrError::check_range("implementation_month", implementation_month as i64, 1, 12)?;

    let annual: BTreeMap<NaiveDate, f64> = rebin_annual(cpi, implementation_month)?
        .into_iter()
        .map(|o| (o.period, o.value))
        .collect();

    let mut aligned: Vec<AlignedRow> = rents
        .iter()
        .filter_map(|record| {
            let cpi = *annual.get(&record.period)?;
            let mut columns = record.rents.values().to_vec();
            columns.push(Some(cpi));
            Some(AlignedRow {
                period: record.period,
                rents: record.rents,
                mean_rent: mean_of_present(&columns).unwrap_or(cpi),
                cpi,
            })
        })
        .collect();
    aligned.sort_by_key(|r| r.period);

    debug!(
        rent_rows = rents.len(),
        cpi_windows = annual.len(),
        aligned = aligned.len(),
        "merged rents with annual CPI"
    );
    Ok(aligned)
}

/// History of a single entity aligned with CPI
pub fn drill_down(
    records: &[RentRecord],
    entity_id: &str,
    cpi: &CpiSeries,
    implementation_month: u32,
) -> Result<Vec<AlignedRow>> {
    let history: Vec<RentRecord> = records
        .iter()
        .filter(|r| r.entity_id == entity_id)
        .cloned()
        .collect();
    smooth_and_merge(cpi, &history, implementation_month)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, 1).unwrap()
    }

    fn series(points: &[(i32, u32, f64)]) -> CpiSeries {
        CpiSeries::new(
            points
                .iter()
                .map(|(y, m, v)| CpiObservation {
                    period: ymd(*y, *m),
                    value: *v,
                })
                .collect(),
        )
    }

    fn rent(id: &str, year: i32, month: u32, values: [f64; 5]) -> RentRecord {
        RentRecord::new(id, ymd(year, month), RentSizes::filled(values))
    }

    #[test]
    fn test_transform_flattens_sorts_and_drops_missing() {
        let mut matrix = CpiMatrix::new();
        matrix.set("2018", "03", Some(3.0));
        matrix.set("2017", "11", Some(1.0));
        matrix.set("2018", "01", Some(2.0));
        matrix.set("2018", "02", None);

        let cpi = transform_cpi_data(&matrix).unwrap();

        let periods: Vec<NaiveDate> = cpi.observations.iter().map(|o| o.period).collect();
        assert_eq!(periods, vec![ymd(2017, 11), ymd(2018, 1), ymd(2018, 3)]);
        assert_eq!(cpi.observations[2].value, 3.0);
    }

    #[test]
    fn test_transform_preserves_bimonthly_gaps() {
        let mut matrix = CpiMatrix::new();
        for month in ["01", "03", "05", "07", "09", "11"] {
            matrix.set("2021", month, Some(100.0));
        }

        let cpi = transform_cpi_data(&matrix).unwrap();

        assert_eq!(cpi.len(), 6);
    }

    #[test]
    fn test_transform_rejects_bad_labels() {
        let mut matrix = CpiMatrix::new();
        matrix.set("2021", "13", Some(1.0));
        assert!(matches!(
            transform_cpi_data(&matrix),
            Err(FmrError::MalformedPeriod(_))
        ));

        let mut matrix = CpiMatrix::new();
        matrix.set("twenty", "01", Some(1.0));
        assert!(matches!(
            transform_cpi_data(&matrix),
            Err(FmrError::MalformedPeriod(_))
        ));
    }

    #[test]
    fn test_window_start_anchoring() {
        assert_eq!(window_start(ymd(2018, 9), 10), Some(ymd(2017, 10)));
        assert_eq!(window_start(ymd(2018, 10), 10), Some(ymd(2018, 10)));
        assert_eq!(window_start(ymd(2018, 12), 6), Some(ymd(2018, 6)));
        assert_eq!(window_start(ymd(2018, 1), 1), Some(ymd(2018, 1)));
    }

    #[test]
    fn test_rebin_averages_each_window() {
        let cpi = series(&[(2018, 9, 1.0), (2018, 10, 3.0), (2019, 3, 5.0), (2019, 10, 7.0)]);

        let annual = rebin_annual(&cpi, 10).unwrap();

        assert_eq!(
            annual,
            vec![
                CpiObservation { period: ymd(2017, 10), value: 1.0 },
                CpiObservation { period: ymd(2018, 10), value: 4.0 },
                CpiObservation { period: ymd(2019, 10), value: 7.0 },
            ]
        );
    }

    #[test]
    fn test_month_thirteen_fails_before_join() {
        let err = smooth_and_merge(&CpiSeries::default(), &[], 13).unwrap_err();
        assert!(matches!(err, FmrError::Range { value: 13, .. }));

        let err = smooth_and_merge(&CpiSeries::default(), &[], 0).unwrap_err();
        assert!(matches!(err, FmrError::Range { .. }));
    }

    #[test]
    fn test_merge_inner_joins_on_anchor_date() {
        let cpi = series(&[(2018, 10, 290.0), (2019, 2, 310.0), (2019, 11, 320.0)]);
        let rents = vec![
            rent("M1", 2019, 10, [100.0, 200.0, 300.0, 400.0, 500.0]),
            rent("M1", 2018, 10, [100.0, 200.0, 300.0, 400.0, 500.0]),
            rent("M1", 2021, 10, [1.0; 5]),
        ];

        let aligned = smooth_and_merge(&cpi, &rents, 10).unwrap();

        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned[0].period, ymd(2018, 10));
        assert_eq!(aligned[0].cpi, 300.0);
        // (100 + 200 + 300 + 400 + 500 + 300) / 6
        assert_eq!(aligned[0].mean_rent, 300.0);
        assert_eq!(aligned[1].cpi, 320.0);
    }

    #[test]
    fn test_merge_with_june_implementation() {
        let cpi = series(&[(2018, 5, 10.0), (2018, 6, 20.0), (2019, 5, 30.0)]);
        let rents = vec![
            rent("M1", 2017, 6, [1.0; 5]),
            rent("M1", 2018, 6, [1.0; 5]),
        ];

        let aligned = smooth_and_merge(&cpi, &rents, 6).unwrap();

        assert_eq!(aligned[0].period, ymd(2017, 6));
        assert_eq!(aligned[0].cpi, 10.0);
        assert_eq!(aligned[1].period, ymd(2018, 6));
        assert_eq!(aligned[1].cpi, 25.0);
    }

    #[test]
    fn test_aligned_columns_fixed_order() {
        let cpi = series(&[(2018, 10, 6.0)]);
        let rents = vec![rent("M1", 2018, 10, [1.0, 2.0, 3.0, 4.0, 5.0])];

        let row = &smooth_and_merge(&cpi, &rents, 10).unwrap()[0];

        assert_eq!(AlignedRow::COLUMNS[5], "Mean_Rent");
        assert_eq!(
            row.values(),
            [Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0), Some(3.5), Some(6.0)]
        );
        assert_eq!(row.value(AnalysisField::MeanRent), Some(3.5));
    }

    #[test]
    fn test_drill_down_filters_entity() {
        let cpi = series(&[(2018, 10, 6.0)]);
        let records = vec![
            rent("60601", 2018, 10, [1.0; 5]),
            rent("60602", 2018, 10, [2.0; 5]),
        ];

        let history = drill_down(&records, "60602", &cpi, 10).unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].rents.efficiency, Some(2.0));
    }
}
