//! Normalization of the raw fire-incident export.
//!
//! The raw file arrives comma-separated with inconsistent borough labels and
//! bare street numbers; this stage rewrites it into the tab-separated form
//! the street join expects, with a composite address column as the join key.

use crate::table::{COMMA, TAB, Table};
use crate::timeutil::NULL_MARKER;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Appends the English ordinal indicator: `ordinal(3) == "3rd"`.
/// The teens (11–13) always take "th".
pub fn ordinal(n: u64) -> String {
    let suffix = match n % 100 {
        11 | 12 | 13 => "th",
        _ => match n % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    };
    format!("{n}{suffix}")
}

/// Uppercases a street name, rewriting bare numeric tokens as ordinals so
/// they match the street-segment labels ("W 151 ST" -> "W 151ST ST").
pub fn normalize_address(street: &str) -> String {
    if street.trim().is_empty() {
        return NULL_MARKER.to_uppercase();
    }
    street
        .split_whitespace()
        .map(|piece| {
            if piece.chars().all(|c| c.is_ascii_digit()) {
                match piece.parse::<u64>() {
                    Ok(n) => ordinal(n),
                    Err(_) => piece.to_string(),
                }
            } else {
                piece.trim_end().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// County-style borough name used by the street segments. The raw export
/// carries values like "1 - Manhattan".
fn normalize_borough(value: &str) -> String {
    if value.trim().is_empty() {
        return NULL_MARKER.to_string();
    }
    let name = match value.split_once('-') {
        Some((_, rest)) => rest,
        None => value,
    };
    name.trim()
        .replace("Manhattan", "New York")
        .replace("Brooklyn", "Kings")
        .replace("Staten Island", "RICHMOND")
        .to_uppercase()
}

fn normalize_zip(value: &str) -> String {
    if value.trim().is_empty() {
        return NULL_MARKER.to_string();
    }
    value
        .split('-')
        .next()
        .unwrap_or(value)
        .trim()
        .to_uppercase()
}

/// Cleans the raw incident export and writes the tab-separated result with a
/// composite `address` column ("W 151ST ST, NEW YORK, NY 10031") matching
/// the street-segment naming, so the tract join can match exactly.
pub fn normalize_incidents_file(input: &Path, output: &Path) -> Result<()> {
    let mut incidents = Table::read(input, COMMA)?;
    info!(rows = incidents.len(), "incident export loaded");

    incidents.map_column("ZIP_CODE", normalize_zip)?;
    incidents.map_column("BOROUGH_DESC", normalize_borough)?;

    let street_idx = incidents.column_index("STREET_HIGHWAY")?;
    let borough_idx = incidents.column_index("BOROUGH_DESC")?;
    let zip_idx = incidents.column_index("ZIP_CODE")?;

    let addresses: Vec<String> = incidents
        .rows()
        .iter()
        .map(|row| {
            format!(
                "{}, {}, NY {}",
                normalize_address(&row[street_idx]),
                row[borough_idx],
                row[zip_idx]
            )
        })
        .collect();
    incidents.add_column("ADDRESS", addresses)?;

    incidents.map_headers(|h| h.to_lowercase().replace(' ', "_"));
    incidents.write(output, TAB)
}

/// Converts a Socrata-style JSON export (column metadata under
/// `meta.view.columns`, rows under `data`) into a tab-separated file.
pub fn json_to_csv(input: &Path, output: &Path) -> Result<()> {
    let file = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let raw: Value = serde_json::from_reader(file)?;

    let columns: Vec<String> = raw["meta"]["view"]["columns"]
        .as_array()
        .context("export has no meta.view.columns")?
        .iter()
        .filter_map(|c| c["name"].as_str().map(String::from))
        .collect();

    let mut table = Table::new(columns);
    for line in raw["data"].as_array().context("export has no data rows")? {
        let row = line
            .as_array()
            .context("data row is not an array")?
            .iter()
            .map(json_cell)
            .collect();
        table.push_row(row);
    }
    table.write(output, TAB)
}

pub(crate) fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_basic() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(4), "4th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(42), "42nd");
        assert_eq!(ordinal(101), "101st");
    }

    #[test]
    fn test_ordinal_teens_take_th() {
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(13), "13th");
        assert_eq!(ordinal(111), "111th");
        assert_eq!(ordinal(113), "113th");
    }

    #[test]
    fn test_normalize_address_rewrites_numbers() {
        assert_eq!(normalize_address("W 151 St"), "W 151ST ST");
        assert_eq!(normalize_address("5 Ave"), "5TH AVE");
        assert_eq!(normalize_address("Broadway"), "BROADWAY");
    }

    #[test]
    fn test_normalize_address_empty_is_null() {
        assert_eq!(normalize_address(""), "NULL");
        assert_eq!(normalize_address("   "), "NULL");
    }

    #[test]
    fn test_normalize_borough() {
        assert_eq!(normalize_borough("1 - Manhattan"), "NEW YORK");
        assert_eq!(normalize_borough("3 - Brooklyn"), "KINGS");
        assert_eq!(normalize_borough("5 - Staten Island"), "RICHMOND");
        assert_eq!(normalize_borough("2 - Bronx"), "BRONX");
        assert_eq!(normalize_borough(""), "null");
    }

    #[test]
    fn test_normalize_zip_strips_plus_four() {
        assert_eq!(normalize_zip("10031-1234"), "10031");
        assert_eq!(normalize_zip("10031"), "10031");
        assert_eq!(normalize_zip(""), "null");
    }

    #[test]
    fn test_normalize_incidents_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.csv");
        let output = dir.path().join("out.csv");
        std::fs::write(
            &input,
            "INCIDENT_DATE_TIME,STREET_HIGHWAY,BOROUGH_DESC,ZIP_CODE\n\
             01/01/2014 08:00:00 AM,W 151 St,1 - Manhattan,10031-1234\n",
        )
        .unwrap();

        normalize_incidents_file(&input, &output).unwrap();

        let result = Table::read(&output, TAB).unwrap();
        assert_eq!(
            result.headers(),
            &["incident_date_time", "street_highway", "borough_desc", "zip_code", "address"]
        );
        assert_eq!(result.rows()[0][4], "W 151ST ST, NEW YORK, NY 10031");
    }

    #[test]
    fn test_json_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("export.json");
        let output = dir.path().join("out.csv");
        std::fs::write(
            &input,
            r#"{"meta":{"view":{"columns":[{"name":"a"},{"name":"b"}]}},"data":[["1",null],["2","x"]]}"#,
        )
        .unwrap();

        json_to_csv(&input, &output).unwrap();

        let result = Table::read(&output, TAB).unwrap();
        assert_eq!(result.headers(), &["a", "b"]);
        assert_eq!(result.rows()[0], vec!["1".to_string(), String::new()]);
        assert_eq!(result.rows()[1], vec!["2".to_string(), "x".to_string()]);
    }
}
