//! Normalization of the street-segment export.
//!
//! Each raw record is one street segment with a WKT geometry and the census
//! blocks on either side. Segments sharing a street name are unioned into a
//! single record so the incident join can look streets up by name.

use crate::table::{COMMA, TAB, Table};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

#[derive(Default)]
struct StreetEntry {
    geometries: BTreeSet<String>,
    right_block: String,
    left_block: String,
}

fn street_label(label: &str, county: &str, postal: &str) -> String {
    format!(
        "{}, {}, NY {}",
        label.to_uppercase(),
        county.to_uppercase(),
        postal.to_uppercase()
    )
}

/// Collapses a set of WKT members into one WKT value.
fn union_geometries(geometries: &BTreeSet<String>) -> String {
    if geometries.len() == 1 {
        return geometries.iter().next().cloned().unwrap_or_default();
    }
    let members: Vec<&str> = geometries.iter().map(String::as_str).collect();
    format!("GEOMETRYCOLLECTION ({})", members.join(", "))
}

/// Unions street segments by composite street name and writes one record per
/// street: `street  geometry  right_block  left_block`.
pub fn normalize_street_file(input: &Path, output: &Path) -> Result<()> {
    let segments = Table::read(input, COMMA)?;

    let label_idx = segments.column_index("Label")?;
    let left_county_idx = segments.column_index("LeftCounty")?;
    let left_postal_idx = segments.column_index("LeftPostal")?;
    let right_county_idx = segments.column_index("RightCount")?;
    let right_postal_idx = segments.column_index("RightPosta")?;
    let right_census_idx = segments.column_index("RightCensu")?;
    let left_census_idx = segments.column_index("LeftCensus")?;
    let wkt_idx = segments.column_index("WKT")?;

    let mut streets: BTreeMap<String, StreetEntry> = BTreeMap::new();

    // right-side names first, then left, so both sides of every segment are
    // indexed under the name an incident address will carry
    for row in segments.rows() {
        let name = street_label(&row[label_idx], &row[right_county_idx], &row[right_postal_idx]);
        let entry = streets.entry(name).or_default();
        entry.right_block = row[right_census_idx].clone();
        entry.left_block = row[left_census_idx].clone();
        entry.geometries.insert(row[wkt_idx].clone());
    }
    for row in segments.rows() {
        let name = street_label(&row[label_idx], &row[left_county_idx], &row[left_postal_idx]);
        let entry = streets.entry(name).or_default();
        entry.right_block = row[right_census_idx].clone();
        entry.left_block = row[left_census_idx].clone();
        entry.geometries.insert(row[wkt_idx].clone());
    }

    let mut out = Table::new(
        ["street", "geometry", "right_block", "left_block"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
    );
    for (name, entry) in &streets {
        out.push_row(vec![
            name.clone(),
            union_geometries(&entry.geometries),
            entry.right_block.clone(),
            entry.left_block.clone(),
        ]);
    }

    info!(
        segments = segments.len(),
        streets = out.len(),
        "street segments unioned"
    );
    out.write(output, TAB)
}
