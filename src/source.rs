// 📂 Source Loader - CSV files on disk into in-memory tables
//
// Everything here is edge glue: the reconciliation stages only ever see
// `RawTable`, `CpiMatrix` and `RentRecord` values.

use crate::bls::{area_catalog, BlsArea};
use crate::hud::MetroRentRow;
use crate::records::{RawTable, RentRecord};
use crate::temporal::CpiMatrix;
use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use glob::glob;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// A raw table together with the name of the file it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub file_name: String,
    pub table: RawTable,
}

impl SourceTable {
    pub fn new(file_name: impl Into<String>, table: RawTable) -> Self {
        SourceTable {
            file_name: file_name.into(),
            table,
        }
    }
}

fn open_csv(path: &Path, delimiter: u8) -> Result<csv::Reader<File>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(file))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv")
        .to_string()
}

/// Headers verbatim (embedded line breaks included), cells as text
pub fn read_raw_table(path: &Path) -> Result<RawTable> {
    let mut reader = open_csv(path, b',')?;
    let name = display_name(path);

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", name))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, name)
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable::new(headers, rows))
}

/// Every `*.csv` in `dir`, in file-name order
pub fn read_source_dir(dir: &Path) -> Result<Vec<SourceTable>> {
    if !dir.is_dir() {
        bail!("Source directory not found: {}", dir.display());
    }

    let pattern = format!("{}/*.csv", dir.display());
    let mut paths: Vec<_> = glob(&pattern)
        .with_context(|| format!("Invalid glob pattern: {}", pattern))?
        .filter_map(|entry| entry.ok())
        .collect();
    paths.sort();

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let table = read_raw_table(&path)?;
        debug!(file = %path.display(), rows = table.len(), "read source table");
        sources.push(SourceTable::new(display_name(&path), table));
    }

    info!(dir = %dir.display(), files = sources.len(), "loaded source directory");
    Ok(sources)
}

/// CPI matrix file: `year` column followed by two-digit month columns.
/// Blank cells are missing values.
pub fn read_cpi_matrix(path: &Path) -> Result<CpiMatrix> {
    let table = read_raw_table(path)?;
    let Some((_, months)) = table.headers.split_first() else {
        bail!("CPI file {} has no columns", path.display());
    };

    let mut matrix = CpiMatrix::new();
    for (line_num, row) in table.rows.iter().enumerate() {
        let Some(year) = row.first() else { continue };
        for (month, cell) in months.iter().zip(row.iter().skip(1)) {
            let cell = cell.trim();
            let value = if cell.is_empty() {
                None
            } else {
                Some(cell.parse::<f64>().with_context(|| {
                    format!(
                        "Invalid CPI value '{}' on line {} of {}",
                        cell,
                        line_num + 2,
                        path.display()
                    )
                })?)
            };
            matrix.set(year.trim(), month.trim(), value);
        }
    }
    Ok(matrix)
}

/// Metro rent history: `code`, `Date` (release year) and the five sizes.
/// Each row is dated at `implementation_month` of its release year.
pub fn read_metro_rents(path: &Path, implementation_month: u32) -> Result<Vec<RentRecord>> {
    let mut reader = open_csv(path, b',')?;
    let name = display_name(path);
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", name))?
        .clone();
    let Some(date_idx) = headers.iter().position(|h| h.trim() == "Date") else {
        bail!("{} has no Date column", name);
    };

    let mut records = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let line = line_num + 2;
        let record = result
            .with_context(|| format!("Failed to parse CSV line {} in {}", line, name))?;
        let row: MetroRentRow = record
            .deserialize(Some(&headers))
            .with_context(|| format!("Invalid metro row on line {} in {}", line, name))?;
        let year: i32 = record
            .get(date_idx)
            .unwrap_or("")
            .trim()
            .parse()
            .with_context(|| format!("Invalid release year on line {} in {}", line, name))?;
        records.push(row.tag(year, implementation_month)?);
    }
    Ok(records)
}

#[derive(serde::Deserialize)]
struct AreaLine {
    area_code: String,
    area_name: String,
}

/// Tab-separated BLS area listing (`area_code`, `area_name`, ...)
pub fn read_area_catalog(path: &Path) -> Result<Vec<BlsArea>> {
    let mut reader = open_csv(path, b'\t')?;
    let mut lines = Vec::new();
    for result in reader.deserialize::<AreaLine>() {
        lines.push(result.with_context(|| format!("Invalid area line in {}", path.display()))?);
    }
    Ok(area_catalog(
        lines
            .iter()
            .map(|l| (l.area_code.as_str(), l.area_name.as_str())),
    ))
}

// ============================================================================
// TESTS
// ============================================================================
