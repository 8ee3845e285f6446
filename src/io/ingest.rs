//! CSV ingest of length-at-age datasets.
//!
//! Turns a specimen CSV into a [`Dataset`] of [`Observation`]s:
//! - column names are configurable through [`ColumnMap`]
//! - missing age/size cells stay `None` (filtering decides what to drop)
//! - malformed rows are skipped and reported as [`RowError`]s
//! - no modelling logic here

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use log::{debug, warn};

use crate::data::Dataset;
use crate::domain::vocab::variable_column;
use crate::domain::{ColumnMap, Observation, Sex};
use crate::error::{GrowthError, Result};

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: parsed dataset plus row accounting.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub dataset: Dataset,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Load a dataset CSV from `path`.
pub fn load_dataset(path: &Path, columns: &ColumnMap) -> Result<IngestedData> {
    let file = File::open(path)
        .map_err(|e| GrowthError::io(format!("failed to open dataset '{}': {e}", path.display())))?;
    let ingested = read_dataset(file, columns)?;
    debug!(
        "read {} rows from '{}', {} used",
        ingested.rows_read,
        path.display(),
        ingested.rows_used
    );
    Ok(ingested)
}

/// Parse a dataset CSV from any reader.
pub fn read_dataset<R: Read>(input: R, columns: &ColumnMap) -> Result<IngestedData> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| GrowthError::io(format!("failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let layout = Layout::resolve(columns, &header_map)?;

    let mut observations = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| layout.parse_row(&record));
        match parsed {
            Ok(obs) => observations.push(obs),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    if !row_errors.is_empty() {
        warn!("skipped {} malformed row(s)", row_errors.len());
    }
    let rows_used = observations.len();
    if rows_used == 0 {
        return Err(GrowthError::data("no valid rows in dataset"));
    }

    Ok(IngestedData {
        dataset: Dataset::new(observations),
        row_errors,
        rows_read,
        rows_used,
    })
}

/// Column positions for each role; optional roles may be absent from the file.
struct Layout {
    age: usize,
    size: usize,
    sex: Option<usize>,
    location: Option<usize>,
    year: Option<usize>,
}

impl Layout {
    fn resolve(columns: &ColumnMap, header_map: &HashMap<String, usize>) -> Result<Self> {
        // Prose variable names ("Fork Length") fall back to their dataset column.
        let optional = |name: &str| {
            header_map
                .get(&normalize_header_name(name))
                .or_else(|| variable_column(name).and_then(|col| header_map.get(col)))
                .copied()
        };
        let required = |name: &str| {
            optional(name)
                .ok_or_else(|| GrowthError::config(format!("missing required column: `{name}`")))
        };
        Ok(Self {
            age: required(&columns.explanatory)?,
            size: required(&columns.response)?,
            sex: optional(&columns.sex),
            location: optional(&columns.location),
            year: optional(&columns.year),
        })
    }

    fn parse_row(&self, record: &StringRecord) -> std::result::Result<Observation, String> {
        let age = parse_opt_f64(cell(record, Some(self.age)), "age")?;
        let size = parse_opt_f64(cell(record, Some(self.size)), "size")?;
        if let Some(s) = size {
            if s < 0.0 {
                return Err(format!("negative size {s}"));
            }
        }
        let sex = cell(record, self.sex)
            .map(|s| s.parse::<Sex>().map_err(|e| e.to_string()))
            .transpose()?;
        let year = cell(record, self.year)
            .map(|s| {
                s.parse::<i32>()
                    .map_err(|_| format!("invalid year '{s}'"))
            })
            .transpose()?;
        Ok(Observation {
            age,
            size,
            sex,
            location: cell(record, self.location).map(str::to_string),
            year,
        })
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn cell(record: &StringRecord, idx: Option<usize>) -> Option<&str> {
    record
        .get(idx?)
        .map(str::trim)
        .filter(|s| {
            !s.is_empty() && !s.eq_ignore_ascii_case("na") && !s.eq_ignore_ascii_case("nan")
        })
}

fn parse_opt_f64(s: Option<&str>, what: &str) -> std::result::Result<Option<f64>, String> {
    let Some(s) = s else { return Ok(None) };
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(format!("invalid {what} '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_default_columns_with_bom_and_case() {
        let csv = "\u{feff}Age,FL,Sex,Source,Year\n1.5,60,f,nsw1,2001\n2,NA,m,qld,2003\n";
        let data = read_dataset(csv.as_bytes(), &ColumnMap::default()).unwrap();
        assert_eq!(data.rows_read, 2);
        assert_eq!(data.rows_used, 2);
        let obs = data.dataset.observations();
        assert_eq!(obs[0].age, Some(1.5));
        assert_eq!(obs[0].sex, Some(Sex::Female));
        assert_eq!(obs[1].size, None);
        assert_eq!(obs[1].location.as_deref(), Some("qld"));
        assert_eq!(obs[1].year, Some(2003));
    }

    #[test]
    fn malformed_rows_are_reported_not_fatal() {
        let csv = "age,fl,sex\n1,50,f\nx,60,m\n3,-2,f\n4,90,unknown\n5,100,m\n";
        let data = read_dataset(csv.as_bytes(), &ColumnMap::default()).unwrap();
        assert_eq!(data.rows_used, 2);
        let lines: Vec<_> = data.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 4, 5]);
    }

    #[test]
    fn missing_required_column_is_a_configuration_error() {
        let columns = ColumnMap {
            response: "stl".into(),
            ..ColumnMap::default()
        };
        let err = read_dataset("age,fl\n1,2\n".as_bytes(), &columns).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn prose_variable_names_resolve_to_columns() {
        let columns = ColumnMap {
            explanatory: "Age".into(),
            response: "Total Length".into(),
            ..ColumnMap::default()
        };
        let data = read_dataset("age,stl\n3,120\n".as_bytes(), &columns).unwrap();
        assert_eq!(data.dataset.observations()[0].size, Some(120.0));
    }

    #[test]
    fn all_rows_bad_is_a_data_error() {
        let err = read_dataset("age,fl\nx,y\n".as_bytes(), &ColumnMap::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
