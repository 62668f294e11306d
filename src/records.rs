// 🏠 Rent Records - Canonical data model shared by every pipeline stage

use crate::error::{FmrError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// RENT FIELDS
// ============================================================================

/// One of the five unit-size buckets every FMR release publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RentField {
    Efficiency,
    OneBedroom,
    TwoBedroom,
    ThreeBedroom,
    FourBedroom,
}

impl RentField {
    pub const ALL: [RentField; 5] = [
        RentField::Efficiency,
        RentField::OneBedroom,
        RentField::TwoBedroom,
        RentField::ThreeBedroom,
        RentField::FourBedroom,
    ];

    /// Canonical column name
    pub fn name(&self) -> &'static str {
        match self {
            RentField::Efficiency => "Efficiency",
            RentField::OneBedroom => "One-Bedroom",
            RentField::TwoBedroom => "Two-Bedroom",
            RentField::ThreeBedroom => "Three-Bedroom",
            RentField::FourBedroom => "Four-Bedroom",
        }
    }

    /// Bedroom code used for year-namespaced columns ("2019_0BR")
    pub fn bedroom_code(&self) -> &'static str {
        match self {
            RentField::Efficiency => "0BR",
            RentField::OneBedroom => "1BR",
            RentField::TwoBedroom => "2BR",
            RentField::ThreeBedroom => "3BR",
            RentField::FourBedroom => "4BR",
        }
    }
}

/// Fields the analysis stages accept: the five sizes plus their mean
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisField {
    Size(RentField),
    MeanRent,
}

impl AnalysisField {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisField::Size(field) => field.name(),
            AnalysisField::MeanRent => "Mean_Rent",
        }
    }
}

impl FromStr for AnalysisField {
    type Err = FmrError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "Mean_Rent" {
            return Ok(AnalysisField::MeanRent);
        }
        RentField::ALL
            .iter()
            .find(|f| f.name() == s)
            .map(|f| AnalysisField::Size(*f))
            .ok_or_else(|| FmrError::InvalidArgument(format!("Field {} is not acceptable", s)))
    }
}

impl fmt::Display for AnalysisField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// RENT SIZES
// ============================================================================

/// The five rent amounts of one entity in one period. Any of them may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RentSizes {
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

impl RentSizes {
    pub fn new(values: [Option<f64>; 5]) -> Self {
        let [efficiency, one_bedroom, two_bedroom, three_bedroom, four_bedroom] = values;
        RentSizes {
            efficiency,
            one_bedroom,
            two_bedroom,
            three_bedroom,
            four_bedroom,
        }
    }

    /// All five sizes present
    pub fn filled(values: [f64; 5]) -> Self {
        Self::new(values.map(Some))
    }

    pub fn get(&self, field: RentField) -> Option<f64> {
        match field {
            RentField::Efficiency => self.efficiency,
            RentField::OneBedroom => self.one_bedroom,
            RentField::TwoBedroom => self.two_bedroom,
            RentField::ThreeBedroom => self.three_bedroom,
            RentField::FourBedroom => self.four_bedroom,
        }
    }

    pub fn set(&mut self, field: RentField, value: Option<f64>) {
        match field {
            RentField::Efficiency => self.efficiency = value,
            RentField::OneBedroom => self.one_bedroom = value,
            RentField::TwoBedroom => self.two_bedroom = value,
            RentField::ThreeBedroom => self.three_bedroom = value,
            RentField::FourBedroom => self.four_bedroom = value,
        }
    }

    /// Values in canonical column order
    pub fn values(&self) -> [Option<f64>; 5] {
        RentField::ALL.map(|f| self.get(f))
    }

    /// Mean of the sizes that are present
    pub fn mean(&self) -> Option<f64> {
        mean_of_present(&self.values())
    }

    pub fn value(&self, field: AnalysisField) -> Option<f64> {
        match field {
            AnalysisField::Size(f) => self.get(f),
            AnalysisField::MeanRent => self.mean(),
        }
    }
}

/// Mean of the non-missing values; `None` when every value is missing
pub fn mean_of_present(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

// ============================================================================
// RENT RECORD
// ============================================================================

/// One entity (zip code or metro code) in one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentRecord {
    #[serde(rename = "ZIPCODE")]
    pub entity_id: String,

    #[serde(rename = "Date")]
    pub period: NaiveDate,

    #[serde(flatten)]
    pub rents: RentSizes,

    /// Area code attached by the metro code mapper
    #[serde(rename = "Metro_Codes")]
    pub metro_code: Option<String>,
}

impl RentRecord {
    pub fn new(entity_id: impl Into<String>, period: NaiveDate, rents: RentSizes) -> Self {
        RentRecord {
            entity_id: entity_id.into(),
            period,
            rents,
            metro_code: None,
        }
    }

    pub fn value(&self, field: AnalysisField) -> Option<f64> {
        self.rents.value(field)
    }
}

// ============================================================================
// RAW TABLE
// ============================================================================

/// An already-parsed source table, headers exactly as the file states them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        RawTable { headers, rows }
    }

    /// Position of a header, ignoring surrounding whitespace and CRLF line breaks
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().replace("\r\n", "\n") == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_field_accepts_the_six_names() {
        for name in [
            "Efficiency",
            "One-Bedroom",
            "Two-Bedroom",
            "Three-Bedroom",
            "Four-Bedroom",
            "Mean_Rent",
        ] {
            let field: AnalysisField = name.parse().unwrap();
            assert_eq!(field.name(), name);
        }
    }

    #[test]
    fn test_analysis_field_rejects_unknown_name() {
        let err = "Five-Bedroom".parse::<AnalysisField>().unwrap_err();
        assert!(matches!(err, FmrError::InvalidArgument(_)));
        assert!(err.to_string().contains("Five-Bedroom"));
    }

    #[test]
    fn test_mean_skips_missing_sizes() {
        let rents = RentSizes::new([Some(1000.0), None, Some(1400.0), None, None]);
        assert_eq!(rents.mean(), Some(1200.0));
        assert_eq!(rents.value(AnalysisField::MeanRent), Some(1200.0));
        assert_eq!(RentSizes::default().mean(), None);
    }

    #[test]
    fn test_set_and_get_round_trip_each_field() {
        let mut rents = RentSizes::default();
        for (i, field) in RentField::ALL.iter().enumerate() {
            rents.set(*field, Some(i as f64));
        }
        assert_eq!(
            rents.values(),
            [Some(0.0), Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
        );
    }

    #[test]
    fn test_column_index_normalizes_crlf_headers() {
        let table = RawTable::new(vec!["ZIP\r\nCode".to_string(), " zcta ".to_string()], vec![]);
        assert_eq!(table.column_index("ZIP\nCode"), Some(0));
        assert_eq!(table.column_index("zcta"), Some(1));
        assert_eq!(table.column_index("ZIP"), None);
    }
}
