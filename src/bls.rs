// 📊 BLS feed shaping
// Series ids, request windows and the monthly observation pivot for the
// consumer price index feed. The HTTP exchange itself lives outside the crate.

use crate::error::{FmrError, Result};
use crate::temporal::CpiMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// All-urban-consumers, not seasonally adjusted
pub const SERIES_PREFIX: &str = "CUUR";
/// All items
pub const SERIES_SUFFIX: &str = "SA0";
/// Widest year span the feed answers in one request
pub const MAX_WINDOW_YEARS: i32 = 20;

pub fn series_id(area_code: &str) -> String {
    format!("{}{}{}", SERIES_PREFIX, area_code.trim(), SERIES_SUFFIX)
}

// ============================================================================
// REQUEST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesRequest {
    #[serde(rename = "seriesid")]
    pub series_ids: Vec<String>,

    #[serde(rename = "startyear")]
    pub start_year: i32,

    #[serde(rename = "endyear")]
    pub end_year: i32,
}

impl SeriesRequest {
    pub fn new(series_id: impl Into<String>, start_year: i32, end_year: i32) -> Result<Self> {
        if end_year < start_year {
            return Err(FmrError::InvalidArgument(format!(
                "end year {} precedes start year {}",
                end_year, start_year
            )));
        }
        if end_year - start_year > MAX_WINDOW_YEARS {
            return Err(FmrError::InvalidArgument(format!(
                "{}-{} exceeds the {} year request limit",
                start_year, end_year, MAX_WINDOW_YEARS
            )));
        }
        Ok(SeriesRequest {
            series_ids: vec![series_id.into()],
            start_year,
            end_year,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlsObservation {
    pub year: String,
    /// `M01`…`M12`, or `M13` for the annual average
    pub period: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlsSeries {
    #[serde(rename = "seriesID")]
    pub series_id: String,
    pub data: Vec<BlsObservation>,
}

/// Year × month matrix from the feed's long observation list.
/// Annual averages are skipped; a `-` value marks a month not collected.
pub fn pivot_observations(observations: &[BlsObservation]) -> Result<CpiMatrix> {
    let mut matrix = CpiMatrix::new();
    for obs in observations {
        let month = obs
            .period
            .strip_prefix('M')
            .ok_or_else(|| FmrError::MalformedPeriod(format!("period '{}'", obs.period)))?;
        if month == "13" {
            continue;
        }

        let raw = obs.value.trim();
        let value = if raw.is_empty() || raw == "-" {
            None
        } else {
            Some(raw.parse::<f64>().map_err(|_| {
                FmrError::MalformedPeriod(format!("value '{}' in {} {}", raw, obs.year, obs.period))
            })?)
        };
        matrix.set(obs.year.trim(), month, value);
    }
    debug!(observations = observations.len(), "pivoted CPI observations");
    Ok(matrix)
}

// ============================================================================
// AREA CATALOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsArea {
    pub series_id: String,
    pub area_name: String,
    pub area_state: Option<String>,
}

/// Series-ready areas from (area code, area label) pairs, without the
/// "Size Class A" aggregates
pub fn area_catalog<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<BlsArea> {
    entries
        .into_iter()
        .filter(|(_, label)| !label.contains("Size Class A"))
        .map(|(code, label)| {
            let (area_name, area_state) = parse_area_label(label);
            BlsArea {
                series_id: series_id(code),
                area_name,
                area_state,
            }
        })
        .collect()
}

/// `"Chicago-Naperville-Elgin, IL-IN-WI"` splits on the comma; labels
/// without one (`"Midwest Size Class B/C"`) split on the first space
pub fn parse_area_label(label: &str) -> (String, Option<String>) {
    let (name, state) = match label.split_once(',') {
        Some((name, state)) => (name, Some(state)),
        None => {
            let mut words = label.split(' ');
            (words.next().unwrap_or(""), words.next())
        }
    };
    (
        name.trim().to_string(),
        state.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(year: &str, period: &str, value: &str) -> BlsObservation {
        BlsObservation {
            year: year.to_string(),
            period: period.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_series_id_wraps_area_code() {
        assert_eq!(series_id("S23A"), "CUURS23ASA0");
    }

    #[test]
    fn test_request_window_limit() {
        assert!(SeriesRequest::new("CUURS23ASA0", 2001, 2021).is_ok());
        assert!(matches!(
            SeriesRequest::new("CUURS23ASA0", 2000, 2021),
            Err(FmrError::InvalidArgument(_))
        ));
        assert!(SeriesRequest::new("CUURS23ASA0", 2021, 2020).is_err());
    }

    #[test]
    fn test_request_body_field_names() {
        let body = SeriesRequest::new("CUURS23ASA0", 2017, 2022)
            .unwrap()
            .to_json()
            .unwrap();
        assert_eq!(
            body,
            r#"{"seriesid":["CUURS23ASA0"],"startyear":2017,"endyear":2022}"#
        );
    }

    #[test]
    fn test_pivot_skips_annual_average() {
        let matrix = pivot_observations(&[
            obs("2022", "M13", "290.0"),
            obs("2022", "M02", "287.5"),
            obs("2021", "M12", "-"),
            obs("2021", "M11", "280.1"),
        ])
        .unwrap();

        assert_eq!(matrix.get("2022", "02"), Some(287.5));
        assert_eq!(matrix.get("2022", "13"), None);
        assert_eq!(matrix.get("2021", "12"), None);
        assert_eq!(matrix.years().collect::<Vec<_>>(), vec!["2021", "2022"]);
    }

    #[test]
    fn test_pivot_rejects_unknown_period() {
        assert!(matches!(
            pivot_observations(&[obs("2022", "S01", "1.0")]),
            Err(FmrError::MalformedPeriod(_))
        ));
    }

    #[test]
    fn test_catalog_drops_size_class_a() {
        let catalog = area_catalog([
            ("S23A", "Chicago-Naperville-Elgin, IL-IN-WI"),
            ("0200", "Midwest Size Class A"),
            ("N200", "Midwest Size Class B/C"),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].series_id, "CUURS23ASA0");
        assert_eq!(catalog[0].area_state.as_deref(), Some("IL-IN-WI"));
        assert_eq!(catalog[1].area_name, "Midwest");
        assert_eq!(catalog[1].area_state.as_deref(), Some("Size"));
    }
}
