// 🗺️ Metro Code Mapper
// Tags every zip code with the HUD area code of the metro it belongs to,
// using the newest release as the authority

use crate::error::{FmrError, Result};
use crate::parser::{detect_layout, extract_year};
use crate::records::{RawTable, RentRecord};
use crate::source::SourceTable;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Area-code column carried by the small-area releases
pub const AREA_CODE_COLUMN: &str = "HUD Area Code";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetroCodeMapper {
    codes: HashMap<String, String>,

    /// Release year the mapping was read from
    pub source_year: Option<i32>,
}

impl MetroCodeMapper {
    /// Build the mapping from the newest source (highest `fy####` year).
    ///
    /// A newest file without the expected columns yields an empty mapping:
    /// every entity then maps to no code, which is logged but not an error.
    pub fn from_sources(sources: &[SourceTable]) -> Self {
        let Some((year, latest)) = latest_source(sources) else {
            warn!("no dated source files; metro codes left empty");
            return Self::default();
        };

        let id_column = match detect_layout(&latest.file_name) {
            Ok((_, layout)) => layout.identifier_column(),
            Err(_) => return Self::default(),
        };

        match Self::from_table(&latest.file_name, &latest.table, id_column, AREA_CODE_COLUMN) {
            Ok(mut mapper) => {
                mapper.source_year = Some(year);
                info!(file = %latest.file_name, year, codes = mapper.len(), "loaded metro codes");
                mapper
            }
            Err(err) => {
                warn!(file = %latest.file_name, error = %err, "metro codes unavailable");
                Self::default()
            }
        }
    }

    /// Read an identifier → area code mapping from two columns of a table.
    /// An identifier listed more than once keeps its first code.
    pub fn from_table(
        file_name: &str,
        table: &RawTable,
        id_column: &str,
        code_column: &str,
    ) -> Result<Self> {
        let column = |name: &str| {
            table.column_index(name).ok_or_else(|| {
                FmrError::format_mismatch(file_name, format!("missing column '{}'", name.escape_debug()))
            })
        };
        let id_idx = column(id_column)?;
        let code_idx = column(code_column)?;

        let mut codes = HashMap::new();
        for row in &table.rows {
            let id = row.get(id_idx).map(|s| s.trim()).unwrap_or("");
            let code = row.get(code_idx).map(|s| s.trim()).unwrap_or("");
            if id.is_empty() || code.is_empty() {
                continue;
            }
            codes.entry(id.to_string()).or_insert_with(|| code.to_string());
        }

        Ok(MetroCodeMapper {
            codes,
            source_year: None,
        })
    }

    pub fn code_for(&self, entity_id: &str) -> Option<&str> {
        self.codes.get(entity_id).map(String::as_str)
    }

    /// Left join: every record survives, unmapped entities get no code
    pub fn apply(&self, records: &[RentRecord]) -> Vec<RentRecord> {
        records
            .iter()
            .map(|r| RentRecord {
                metro_code: self.code_for(&r.entity_id).map(str::to_string),
                ..r.clone()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Distinct area codes attached to a corpus, ascending
pub fn metro_codes(records: &[RentRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.metro_code.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Records of the entities inside one metro area; unmapped entities never match
pub fn within_metro(records: &[RentRecord], code: &str) -> Vec<RentRecord> {
    let selected: Vec<RentRecord> = records
        .iter()
        .filter(|r| r.metro_code.as_deref() == Some(code))
        .cloned()
        .collect();
    debug!(code, rows = selected.len(), "filtered corpus to metro area");
    selected
}

/// The source with the highest release year; ties go to the greatest file name
pub fn latest_source(sources: &[SourceTable]) -> Option<(i32, &SourceTable)> {
    sources
        .iter()
        .filter_map(|s| extract_year(&s.file_name).map(|year| (year, s)))
        .max_by(|(ya, a), (yb, b)| (ya, &a.file_name).cmp(&(yb, &b.file_name)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Layout;
    use crate::records::RentSizes;
    use chrono::NaiveDate;

    fn source(name: &str, headers: &[&str], rows: &[&[&str]]) -> SourceTable {
        SourceTable {
            file_name: name.to_string(),
            table: RawTable::new(
                headers.iter().map(|h| h.to_string()).collect(),
                rows.iter()
                    .map(|r| r.iter().map(|c| c.to_string()).collect())
                    .collect(),
            ),
        }
    }

    fn record(id: &str) -> RentRecord {
        RentRecord::new(
            id,
            NaiveDate::from_ymd_opt(2019, 10, 1).unwrap(),
            RentSizes::filled([1.0; 5]),
        )
    }

    fn layout_a_with_codes() -> Vec<String> {
        let mut headers: Vec<String> = Layout::A.columns().iter().map(|c| c.to_string()).collect();
        headers.insert(1, AREA_CODE_COLUMN.to_string());
        headers
    }

    #[test]
    fn test_latest_source_by_year() {
        let sources = vec![
            source("fy2021_safmrs.csv", &["x"], &[]),
            source("FY2023_SAFMRS.csv", &["x"], &[]),
            source("notes.csv", &["x"], &[]),
            source("fy2019_safmrs.csv", &["x"], &[]),
        ];

        let (year, latest) = latest_source(&sources).unwrap();

        assert_eq!(year, 2023);
        assert_eq!(latest.file_name, "FY2023_SAFMRS.csv");
    }

    #[test]
    fn test_latest_source_tie_goes_to_greatest_name() {
        let sources = vec![
            source("fy2023_safmrs_revised.csv", &["x"], &[]),
            source("fy2023_safmrs.csv", &["x"], &[]),
        ];

        let (year, latest) = latest_source(&sources).unwrap();

        assert_eq!(year, 2023);
        assert_eq!(latest.file_name, "fy2023_safmrs_revised.csv");
    }

    #[test]
    fn test_within_metro_excludes_other_areas() {
        let headers = layout_a_with_codes();
        let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
        let sources = vec![source(
            "fy2022_safmrs.csv",
            &headers,
            &[
                &["60601", "METRO_CHI", "1", "2", "3", "4", "5"],
                &["60602", "METRO_CHI", "1", "2", "3", "4", "5"],
                &["61602", "METRO_PIA", "1", "2", "3", "4", "5"],
            ],
        )];
        let mapper = MetroCodeMapper::from_sources(&sources);
        let records = mapper.apply(&[
            record("60601"),
            record("60602"),
            record("61602"),
            record("99999"),
        ]);

        assert_eq!(metro_codes(&records), vec!["METRO_CHI", "METRO_PIA"]);

        let chicago = within_metro(&records, "METRO_CHI");
        let ids: Vec<&str> = chicago.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["60601", "60602"]);

        let report = crate::anomaly::AnomalyScorer::default()
            .score(&chicago, crate::records::AnalysisField::MeanRent)
            .unwrap();
        assert!(report.get("61602").is_none());
        assert!(report.get("99999").is_none());
        assert_eq!(report.rows.len(), 2);
    }

    #[test]
    fn test_maps_from_newest_file_only() {
        let headers = layout_a_with_codes();
        let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
        let sources = vec![
            source("fy2019_safmrs.csv", &headers, &[&["60601", "OLD", "1", "2", "3", "4", "5"]]),
            source("fy2023_safmrs.csv", &headers, &[&["60601", "METRO16980M16980", "1", "2", "3", "4", "5"]]),
        ];

        let mapper = MetroCodeMapper::from_sources(&sources);

        assert_eq!(mapper.source_year, Some(2023));
        assert_eq!(mapper.code_for("60601"), Some("METRO16980M16980"));
    }

    #[test]
    fn test_unmapped_entities_get_no_code() {
        let headers = layout_a_with_codes();
        let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
        let sources = vec![source(
            "fy2022_safmrs.csv",
            &headers,
            &[&["60601", "METRO1", "1", "2", "3", "4", "5"]],
        )];
        let mapper = MetroCodeMapper::from_sources(&sources);

        let mapped = mapper.apply(&[record("60601"), record("99999")]);

        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].metro_code.as_deref(), Some("METRO1"));
        assert_eq!(mapped[1].metro_code, None);
    }

    #[test]
    fn test_first_code_wins_for_repeated_identifier() {
        let table = RawTable::new(
            vec!["zip".to_string(), "code".to_string()],
            vec![
                vec!["60601".to_string(), "A".to_string()],
                vec!["60601".to_string(), "B".to_string()],
            ],
        );

        let mapper = MetroCodeMapper::from_table("t.csv", &table, "zip", "code").unwrap();

        assert_eq!(mapper.code_for("60601"), Some("A"));
        assert_eq!(mapper.len(), 1);
    }

    #[test]
    fn test_missing_code_column_gives_empty_mapping() {
        let headers: Vec<&str> = Layout::A.columns().to_vec();
        let sources = vec![source(
            "fy2022_safmrs.csv",
            &headers,
            &[&["60601", "1", "2", "3", "4", "5"]],
        )];

        let mapper = MetroCodeMapper::from_sources(&sources);

        assert!(mapper.is_empty());
        assert_eq!(mapper.apply(&[record("60601")])[0].metro_code, None);
    }
}
