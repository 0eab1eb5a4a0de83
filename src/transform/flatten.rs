//! Incident-to-tract assignment and the dense (date × tract) grid.

use crate::table::{TAB, Table};
use crate::timeutil::{self, DAY_FORMAT, INCIDENT_FORMAT};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Census-tract FIPS codes are the first 11 characters of a block id
/// (state 2 + county 3 + tract 6).
const FIPS_TRACT_LEN: usize = 11;

/// Composes the 11-char tract id from the census file's split fields.
pub fn compose_tract(state: &str, county: &str, tract: &str) -> String {
    format!("{state}{county:0>3}{tract:0>6}")
}

fn tract_of_block(block: &str) -> String {
    block.chars().take(FIPS_TRACT_LEN).collect()
}

/// Assigns each incident to a census tract by exact lookup of its composite
/// address against the unioned street names, keeping
/// `incident_date_time  address  census_tract`.
///
/// Incidents whose address has no street match are dropped; the drop count
/// is logged so the gap stays visible.
pub fn join_with_tracts(incidents_path: &Path, streets_path: &Path, output: &Path) -> Result<()> {
    let streets = Table::read(streets_path, TAB)?;
    let incidents = Table::read(incidents_path, TAB)?;

    let street_idx = streets.column_index("street")?;
    let block_idx = streets.column_index("left_block")?;
    let tract_by_street: HashMap<&str, String> = streets
        .rows()
        .iter()
        .map(|row| (row[street_idx].as_str(), tract_of_block(&row[block_idx])))
        .collect();

    let dt_idx = incidents.column_index("incident_date_time")?;
    let addr_idx = incidents.column_index("address")?;

    let mut out = Table::new(
        ["incident_date_time", "address", "census_tract"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
    );
    let mut unmatched = 0usize;
    for row in incidents.rows() {
        match tract_by_street.get(row[addr_idx].as_str()) {
            Some(tract) => out.push_row(vec![
                row[dt_idx].clone(),
                row[addr_idx].clone(),
                tract.clone(),
            ]),
            None => unmatched += 1,
        }
    }

    if unmatched > 0 {
        warn!(
            unmatched,
            total = incidents.len(),
            "incidents without a street match were dropped"
        );
    }
    info!(matched = out.len(), "incidents assigned to tracts");
    out.write(output, TAB)
}

/// Builds the dense (date × tract) grid: one row for every day in the
/// observed incident span crossed with every known tract. Cells with no
/// incident get an explicit count of 0.
pub fn flatten_incidents_tracts(
    incidents_path: &Path,
    census_path: &Path,
    output: &Path,
) -> Result<()> {
    let incidents = Table::read(incidents_path, TAB)?;
    let census = Table::read(census_path, TAB)?;

    let dt_idx = incidents.column_index("incident_date_time")?;
    let tract_idx = incidents.column_index("census_tract")?;

    // group observed incidents into per-(day, tract) counts
    let mut counts: HashMap<(String, String), u64> = HashMap::new();
    let mut span: Option<(NaiveDate, NaiveDate)> = None;
    for row in incidents.rows() {
        let Some(day) = timeutil::normalize_dt(&row[dt_idx], INCIDENT_FORMAT, DAY_FORMAT) else {
            continue;
        };
        let parsed = NaiveDate::parse_from_str(&day, DAY_FORMAT)?;
        span = Some(match span {
            None => (parsed, parsed),
            Some((lo, hi)) => (lo.min(parsed), hi.max(parsed)),
        });
        *counts.entry((day, row[tract_idx].clone())).or_insert(0) += 1;
    }
    let (first, last) = span.context("no parseable incident dates")?;

    // the full date axis, inclusive of the last observed day
    let upper = last
        .succ_opt()
        .context("incident date range overflows the calendar")?;
    let all_dates = timeutil::generate_dates(
        &first.format(DAY_FORMAT).to_string(),
        &upper.format(DAY_FORMAT).to_string(),
        DAY_FORMAT,
        DAY_FORMAT,
    )?;

    // the tract axis, in census-file order
    let state_idx = census.column_index("state")?;
    let county_idx = census.column_index("county")?;
    let code_idx = census.column_index("tract")?;
    let mut seen = HashSet::new();
    let mut all_tracts = Vec::new();
    for row in census.rows() {
        let tract = compose_tract(&row[state_idx], &row[county_idx], &row[code_idx]);
        if seen.insert(tract.clone()) {
            all_tracts.push(tract);
        }
    }

    let mut out = Table::new(
        ["incident_date_time", "census_tract", "nbr_incidents"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
    );
    for date in &all_dates {
        for tract in &all_tracts {
            let n = counts
                .get(&(date.clone(), tract.clone()))
                .copied()
                .unwrap_or(0);
            out.push_row(vec![date.clone(), tract.clone(), n.to_string()]);
        }
    }

    info!(
        dates = all_dates.len(),
        tracts = all_tracts.len(),
        rows = out.len(),
        "incident grid flattened"
    );
    out.write(output, TAB)
}
