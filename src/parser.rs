// 🏗️ Schema Normalizer
// Maps each annual small-area FMR release onto the canonical 6-column schema

use crate::error::{FmrError, Result};
use crate::records::{RawTable, RentRecord, RentSizes};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

/// Canonical identifier column of a normalized table
pub const IDENTIFIER_COLUMN: &str = "ZIPCODE";

/// Canonical column order of every normalized table
pub const CANONICAL_COLUMNS: [&str; 6] = [
    IDENTIFIER_COLUMN,
    "Efficiency",
    "One-Bedroom",
    "Two-Bedroom",
    "Three-Bedroom",
    "Four-Bedroom",
];

static YEAR_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)fy(\d{4})").expect("valid regex"));

// ============================================================================
// LAYOUTS
// ============================================================================

/// Layout - The five column layouts the agency has published over the years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    /// 2018 onward except 2020; headers carry embedded line breaks
    A,
    /// 2020
    B,
    /// 2016-2017
    C,
    /// 2015
    D,
    /// 2014 and earlier
    E,
}

/// Year ranges in priority order; first match wins, so the 2020 exception
/// must precede the open-ended 2018+ range.
const LAYOUT_TABLE: &[(RangeInclusive<i32>, Layout)] = &[
    (2020..=2020, Layout::B),
    (2018..=i32::MAX, Layout::A),
    (2016..=2017, Layout::C),
    (2015..=2015, Layout::D),
    (i32::MIN..=2014, Layout::E),
];

impl Layout {
    /// Select the layout a release year was published in
    pub fn for_year(year: i32) -> Layout {
        LAYOUT_TABLE
            .iter()
            .find(|(years, _)| years.contains(&year))
            .map(|(_, layout)| *layout)
            .unwrap_or(Layout::E)
    }

    /// Source column names, in canonical order (identifier, 0BR … 4BR)
    pub fn columns(&self) -> [&'static str; 6] {
        match self {
            Layout::A => [
                "ZIP\nCode",
                "SAFMR\n0BR",
                "SAFMR\n1BR",
                "SAFMR\n2BR",
                "SAFMR\n3BR",
                "SAFMR\n4BR",
            ],
            Layout::B => [
                "zcta",
                "safmr_0br",
                "safmr_1br",
                "safmr_2br",
                "safmr_3br",
                "safmr_4br",
            ],
            Layout::C => [
                "zip_code",
                "area_rent_br0",
                "area_rent_br1",
                "area_rent_br2",
                "area_rent_br3",
                "area_rent_br4",
            ],
            Layout::D => [
                "zipcode",
                "area_rent_br0",
                "area_rent_br1",
                "area_rent_br2",
                "area_rent_br3",
                "area_rent_br4",
            ],
            Layout::E => [
                "ZIP",
                "area_rent_br0",
                "area_rent_br1",
                "area_rent_br2",
                "area_rent_br3",
                "area_rent_br4",
            ],
        }
    }

    pub fn identifier_column(&self) -> &'static str {
        self.columns()[0]
    }

    /// Normalize a raw table published in this layout
    pub fn normalize(&self, file_name: &str, year: i32, raw: &RawTable) -> Result<NormalizedTable> {
        let mut indices = [0usize; 6];
        let mut missing = Vec::new();
        for (slot, column) in indices.iter_mut().zip(self.columns()) {
            match raw.column_index(column) {
                Some(idx) => *slot = idx,
                None => missing.push(column.escape_debug().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(FmrError::format_mismatch(
                file_name,
                format!(
                    "column names do not match layout {:?} for {}: missing {}",
                    self,
                    year,
                    missing.join(", ")
                ),
            ));
        }

        let mut rows = Vec::with_capacity(raw.len());
        for (line, record) in raw.rows.iter().enumerate() {
            let cell = |idx: usize| record.get(idx).map(String::as_str).unwrap_or("");

            let entity_id = cell(indices[0]).trim().to_string();
            let mut amounts = [None; 5];
            for (amount, idx) in amounts.iter_mut().zip(&indices[1..]) {
                *amount = parse_amount(cell(*idx)).map_err(|bad| {
                    FmrError::format_mismatch(
                        file_name,
                        format!("row {}: '{}' is not a rent amount", line + 2, bad),
                    )
                })?;
            }

            rows.push(NormalizedRow {
                entity_id,
                rents: RentSizes::new(amounts),
            });
        }

        Ok(NormalizedTable {
            source_file: file_name.to_string(),
            year,
            layout: *self,
            rows,
        })
    }
}

// ============================================================================
// NORMALIZED TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub entity_id: String,
    pub rents: RentSizes,
}

impl NormalizedRow {
    pub fn new(entity_id: impl Into<String>, rents: RentSizes) -> Self {
        NormalizedRow {
            entity_id: entity_id.into(),
            rents,
        }
    }
}

/// One release year's rows in canonical columns, not yet dated
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    pub source_file: String,
    pub year: i32,
    pub layout: Layout,
    pub rows: Vec<NormalizedRow>,
}

impl NormalizedTable {
    pub fn columns(&self) -> [&'static str; 6] {
        CANONICAL_COLUMNS
    }

    /// Attach the release's anchor date to every row
    pub fn tag_period(&self, anchor_month: u32) -> Result<Vec<RentRecord>> {
        let period = anchor_date(self.year, anchor_month)?;
        Ok(self
            .rows
            .iter()
            .map(|row| RentRecord::new(row.entity_id.clone(), period, row.rents))
            .collect())
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Extract the release year from a file name's `fy####` token (any case)
pub fn extract_year(file_name: &str) -> Option<i32> {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);
    YEAR_TOKEN
        .captures(base)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Detect the year and layout of a source file from its name
pub fn detect_layout(file_name: &str) -> Result<(i32, Layout)> {
    let year = extract_year(file_name).ok_or_else(|| {
        FmrError::format_mismatch(file_name, "file name has no fy#### release year")
    })?;
    Ok((year, Layout::for_year(year)))
}

/// Normalize one source file, choosing its layout from the name
pub fn normalize(file_name: &str, raw: &RawTable) -> Result<NormalizedTable> {
    let (year, layout) = detect_layout(file_name)?;
    layout.normalize(file_name, year, raw)
}

/// First day of `month` in `year`
pub fn anchor_date(year: i32, month: u32) -> Result<NaiveDate> {
    FmrError::check_range("anchor_month", month as i64, 1, 12)?;
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| FmrError::MalformedPeriod(format!("{}-{:02}", year, month)))
}

/// Parse a rent cell. Blank means missing; `$` and thousands separators are tolerated.
/// Returns the offending text when the cell isn't numeric.
fn parse_amount(cell: &str) -> std::result::Result<Option<f64>, String> {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    cleaned
        .parse::<f64>()
        .map(Some)
        .map_err(|_| cell.to_string())
}

// ============================================================================
// TESTS
// ============================================================================
