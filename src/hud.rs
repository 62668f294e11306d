// 🏛️ HUD metro feed shaping
// State-level FMR releases list every metro area once per year; rows are
// tagged with the implementation date of their release.

use crate::error::{FmrError, Result};
use crate::parser::anchor_date;
use crate::records::{RentRecord, RentSizes};
use serde::{Deserialize, Serialize};

/// One metro area in one state release. Unused release fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetroRentRow {
    pub code: String,

    #[serde(rename = "Efficiency")]
    pub efficiency: Option<f64>,

    #[serde(rename = "One-Bedroom")]
    pub one_bedroom: Option<f64>,

    #[serde(rename = "Two-Bedroom")]
    pub two_bedroom: Option<f64>,

    #[serde(rename = "Three-Bedroom")]
    pub three_bedroom: Option<f64>,

    #[serde(rename = "Four-Bedroom")]
    pub four_bedroom: Option<f64>,
}

impl MetroRentRow {
    pub fn rents(&self) -> RentSizes {
        RentSizes::new([
            self.efficiency,
            self.one_bedroom,
            self.two_bedroom,
            self.three_bedroom,
            self.four_bedroom,
        ])
    }

    /// Date the row at `implementation_month` of its release year
    pub fn tag(&self, year: i32, implementation_month: u32) -> Result<RentRecord> {
        Ok(RentRecord::new(
            self.code.trim(),
            anchor_date(year, implementation_month)?,
            self.rents(),
        ))
    }
}

/// The `data` payload of a state release
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StateRelease {
    pub year: String,
    pub metroareas: Vec<MetroRentRow>,
}

impl StateRelease {
    pub fn release_year(&self) -> Result<i32> {
        self.year
            .trim()
            .parse()
            .map_err(|_| FmrError::MalformedPeriod(format!("release year '{}'", self.year)))
    }
}

/// Flatten yearly releases into one long metro table ordered by (code, date)
pub fn tag_releases(releases: &[StateRelease], implementation_month: u32) -> Result<Vec<RentRecord>> {
    let mut records = Vec::new();
    for release in releases {
        let year = release.release_year()?;
        for row in &release.metroareas {
            records.push(row.tag(year, implementation_month)?);
        }
    }
    records.sort_by(|a, b| (&a.entity_id, a.period).cmp(&(&b.entity_id, b.period)));
    Ok(records)
}

/// Metro listing entry with its label split into name and states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetroArea {
    pub cbsa_code: String,
    pub area_name: String,
    pub area_state: Option<String>,
}

impl MetroArea {
    pub fn from_label(cbsa_code: impl Into<String>, label: &str) -> Self {
        let (area_name, area_state) = parse_metro_label(label);
        MetroArea {
            cbsa_code: cbsa_code.into(),
            area_name,
            area_state,
        }
    }
}

/// `"Chicago-Naperville-Elgin, IL-IN-WI HUD Metro FMR Area"` →
/// (`"Chicago-Naperville-Elgin"`, `Some("IL-IN-WI")`)
pub fn parse_metro_label(label: &str) -> (String, Option<String>) {
    match label.split_once(',') {
        Some((name, rest)) => (
            name.trim().to_string(),
            rest.split_whitespace().next().map(str::to_string),
        ),
        None => (label.trim().to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const RELEASE: &str = r#"{
        "year": "2021",
        "metroareas": [
            {"code": "METRO16980M16980", "metro_name": "Chicago", "Efficiency": 1059,
             "One-Bedroom": 1184, "Two-Bedroom": 1364, "Three-Bedroom": 1701,
             "Four-Bedroom": 1983, "FMR Percentile": 40, "smallarea_status": "1"},
            {"code": "METRO14010M14010", "Efficiency": 700, "One-Bedroom": null,
             "Two-Bedroom": 900, "Three-Bedroom": 1200, "Four-Bedroom": 1400}
        ]
    }"#;

    #[test]
    fn test_release_rows_tagged_at_implementation_month() {
        let release: StateRelease = serde_json::from_str(RELEASE).unwrap();

        let records = tag_releases(&[release], 10).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entity_id, "METRO14010M14010");
        assert_eq!(records[0].period, NaiveDate::from_ymd_opt(2021, 10, 1).unwrap());
        assert_eq!(records[0].rents.one_bedroom, None);
        assert_eq!(records[1].rents.two_bedroom, Some(1364.0));
    }

    #[test]
    fn test_bad_month_or_year_rejected() {
        let mut release: StateRelease = serde_json::from_str(RELEASE).unwrap();
        assert!(matches!(
            tag_releases(std::slice::from_ref(&release), 13),
            Err(FmrError::Range { .. })
        ));

        release.year = "FY21".to_string();
        assert!(matches!(
            tag_releases(&[release], 10),
            Err(FmrError::MalformedPeriod(_))
        ));
    }

    #[test]
    fn test_metro_label_split() {
        let area = MetroArea::from_label(
            "METRO16980M16980",
            "Chicago-Naperville-Elgin, IL-IN-WI HUD Metro FMR Area",
        );
        assert_eq!(area.area_name, "Chicago-Naperville-Elgin");
        assert_eq!(area.area_state.as_deref(), Some("IL-IN-WI"));

        assert_eq!(parse_metro_label("Guam"), ("Guam".to_string(), None));
    }
}
