//! Monthly aggregation of the municipal building exports.
//!
//! Complaints, violations, and permits all follow the same recipe: derive a
//! borough-block-lot building id, join it to the building→tract lookup,
//! bucket the record date to month granularity, and count per (tract, month).
//! The mappluto roll-up reduces the tax-lot dump to per-tract building stats.

use crate::table::{COMMA, TAB, Table};
use crate::timeutil::{self, COMPLAINT_FORMAT, INCIDENT_FORMAT, MONTH_FORMAT, VIOLATION_FORMAT};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Borough digit → county FIPS code (PLUTO data dictionary, appendix).
static BORO_CODE: &[(&str, &str)] = &[
    ("1", "36061"),
    ("2", "36005"),
    ("3", "36047"),
    ("4", "36081"),
    ("5", "36085"),
];

/// Borough name → borough digit, for exports that spell the borough out.
static BORO_NAME_CODE: &[(&str, &str)] = &[
    ("MANHATTAN", "1"),
    ("BRONX", "2"),
    ("BROOKLYN", "3"),
    ("QUEENS", "4"),
    ("STATEN ISLAND", "5"),
];

fn county_for_boro(digit: &str) -> Option<&'static str> {
    BORO_CODE.iter().find(|(d, _)| *d == digit).map(|(_, c)| *c)
}

fn boro_digit_for_name(name: &str) -> Option<&'static str> {
    let name = name.trim().to_uppercase();
    BORO_NAME_CODE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| *d)
}

/// Tax blocks are 5 digits in a BBL.
fn pad_block(block: &str) -> String {
    format!("{block:0>5}")
}

/// Lots arrive 4-wide; a 5-wide value carries a spurious leading zero.
fn trim_lot(lot: &str) -> String {
    if lot.len() == 5 {
        lot[1..].to_string()
    } else {
        lot.to_string()
    }
}

/// Some exports write the borough as a multi-char code; the BBL wants the
/// leading digit only.
fn borough_digit(boro: &str) -> String {
    if boro.len() > 1 {
        boro[..1].to_string()
    } else {
        boro.to_string()
    }
}

fn bbl(boro: &str, block: &str, lot: &str) -> String {
    format!("{}{}{}", borough_digit(boro), pad_block(block), trim_lot(lot))
}

/// Loads the building→tract lookup keyed by the given id column.
fn building_lookup(path: &Path, key_column: &str) -> Result<HashMap<String, String>> {
    let buildings = Table::read(path, TAB)?;
    let key_idx = buildings.column_index(key_column)?;
    let tract_idx = buildings.column_index("census_tract")?;
    Ok(buildings
        .rows()
        .iter()
        .map(|row| (row[key_idx].clone(), row[tract_idx].clone()))
        .collect())
}

/// Counts complaint records per (tract, month): rows carrying a disposition
/// code and rows carrying a complaint category, separately.
pub fn aggregate_complaints(
    buildings_path: &Path,
    complaints_path: &Path,
    output: &Path,
) -> Result<()> {
    let tract_by_bin = building_lookup(buildings_path, "BIN")?;
    let complaints = Table::read(complaints_path, COMMA)?;

    let bin_idx = complaints.column_index("BIN")?;
    let date_idx = complaints.column_index("Date Entered")?;
    let disposition_idx = complaints.column_index("Disposition Code")?;
    let category_idx = complaints.column_index("Complaint Category")?;

    let mut counts: BTreeMap<(String, String), (u64, u64)> = BTreeMap::new();
    for row in complaints.rows() {
        let Some(tract) = tract_by_bin.get(&row[bin_idx]) else {
            continue;
        };
        let Some(month) = timeutil::normalize_dt(&row[date_idx], COMPLAINT_FORMAT, MONTH_FORMAT)
        else {
            continue;
        };
        let cell = counts.entry((tract.clone(), month)).or_insert((0, 0));
        if !row[disposition_idx].is_empty() {
            cell.0 += 1;
        }
        if !row[category_idx].is_empty() {
            cell.1 += 1;
        }
    }

    let mut out = Table::new(
        ["census_tract", "month", "nbr_dispositions", "nbr_complaints"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
    );
    for ((tract, month), (dispositions, categories)) in &counts {
        out.push_row(vec![
            tract.clone(),
            month.clone(),
            dispositions.to_string(),
            categories.to_string(),
        ]);
    }
    info!(rows = out.len(), "complaints aggregated");
    out.write(output, TAB)
}

/// Per-(tract, month) violation counts for one source file. Records whose
/// issue date is not exactly 8 characters are malformed and discarded.
fn count_violations(
    path: &Path,
    tract_by_bbl: &HashMap<String, String>,
) -> Result<BTreeMap<(String, String), u64>> {
    let violations = Table::read(path, COMMA)?;
    let boro_idx = violations.column_index("BORO")?;
    let block_idx = violations.column_index("BLOCK")?;
    let lot_idx = violations.column_index("LOT")?;
    let issue_idx = violations.column_index("ISSUE_DATE")?;

    let mut counts: BTreeMap<(String, String), u64> = BTreeMap::new();
    let mut malformed = 0usize;
    for row in violations.rows() {
        let id = bbl(&row[boro_idx], &row[block_idx], &row[lot_idx]);
        let Some(tract) = tract_by_bbl.get(&id) else {
            continue;
        };
        let issue = &row[issue_idx];
        if issue.len() != 8 {
            malformed += 1;
            continue;
        }
        let Some(month) = timeutil::normalize_dt(issue, VIOLATION_FORMAT, MONTH_FORMAT) else {
            continue;
        };
        *counts.entry((tract.clone(), month)).or_insert(0) += 1;
    }
    if malformed > 0 {
        debug!(malformed, path = %path.display(), "violations with malformed issue dates discarded");
    }
    Ok(counts)
}

/// Aggregates ECB and DOB violation exports and outer-merges the two count
/// series on (tract, month).
pub fn aggregate_violations(
    buildings_path: &Path,
    dob_path: &Path,
    ecb_path: &Path,
    output: &Path,
) -> Result<()> {
    let tract_by_bbl = building_lookup(buildings_path, "BBL")?;

    let ecb = count_violations(ecb_path, &tract_by_bbl)?;
    let dob = count_violations(dob_path, &tract_by_bbl)?;

    let mut merged: BTreeMap<(String, String), (Option<u64>, Option<u64>)> = BTreeMap::new();
    for (key, n) in ecb {
        merged.entry(key).or_insert((None, None)).0 = Some(n);
    }
    for (key, n) in dob {
        merged.entry(key).or_insert((None, None)).1 = Some(n);
    }

    let render = |n: Option<u64>| n.map(|v| v.to_string()).unwrap_or_default();
    let mut out = Table::new(
        ["census_tract", "month", "nbr_ecb_violations", "nbr_dob_violations"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
    );
    for ((tract, month), (ecb_n, dob_n)) in &merged {
        out.push_row(vec![
            tract.clone(),
            month.clone(),
            render(*ecb_n),
            render(*dob_n),
        ]);
    }
    info!(rows = out.len(), "violations aggregated");
    out.write(output, TAB)
}

/// Counts issued permits per (tract, month). The permit export spells the
/// borough out, so the BBL goes through the name→digit table.
pub fn aggregate_permits(buildings_path: &Path, permits_path: &Path, output: &Path) -> Result<()> {
    let tract_by_bbl = building_lookup(buildings_path, "BBL")?;
    let permits = Table::read(permits_path, COMMA)?;

    let boro_idx = permits.column_index("BOROUGH")?;
    let block_idx = permits.column_index("Block")?;
    let lot_idx = permits.column_index("Lot")?;
    let issued_idx = permits.column_index("Issuance Date")?;

    let mut counts: BTreeMap<(String, String), u64> = BTreeMap::new();
    for row in permits.rows() {
        let Some(digit) = boro_digit_for_name(&row[boro_idx]) else {
            continue;
        };
        let id = bbl(digit, &row[block_idx], &row[lot_idx]);
        let Some(tract) = tract_by_bbl.get(&id) else {
            continue;
        };
        let Some(month) = timeutil::normalize_dt(&row[issued_idx], INCIDENT_FORMAT, MONTH_FORMAT)
        else {
            continue;
        };
        *counts.entry((tract.clone(), month)).or_insert(0) += 1;
    }

    let mut out = Table::new(
        ["census_tract", "month", "nbr_dob_permits"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
    );
    for ((tract, month), n) in &counts {
        out.push_row(vec![tract.clone(), month.clone(), n.to_string()]);
    }
    info!(rows = out.len(), "permits aggregated");
    out.write(output, TAB)
}

#[derive(Default)]
struct MeanAcc {
    sum: f64,
    n: u64,
}

impl MeanAcc {
    fn push(&mut self, v: f64) {
        self.sum += v;
        self.n += 1;
    }

    fn mean(&self) -> f64 {
        if self.n == 0 { 0.0 } else { self.sum / self.n as f64 }
    }
}

#[derive(Default)]
struct TractAcc {
    numfloors: MeanAcc,
    yearbuilt: MeanAcc,
    lot_bldgarea: MeanAcc,
    unitstotal: f64,
    bldgarea: f64,
    comarea: f64,
    resarea: f64,
    officearea: f64,
    retailarea: f64,
    unitsres: f64,
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub static MAPPLUTO_AGG_COLUMNS: &[&str] = &[
    "census_tract",
    "avg_unitsres",
    "ratio_retailarea",
    "ratio_resarea",
    "ratio_comarea",
    "avg_yearbuilt",
    "ratio_officerea",
    "avg_numfloors",
    "total_units",
    "avg_unitarea",
    "total_bldgarea",
];

/// Rolls the tax-lot dump up to per-tract building statistics: average
/// floors, building age, unit counts, and use-type area ratios.
pub fn aggregate_mappluto(input: &Path, output: &Path) -> Result<()> {
    let lots = Table::read(input, TAB)?;

    let bbl_idx = lots.column_index("bbl")?;
    let tract_idx = lots.column_index("tract2010")?;
    let col = |name: &str| lots.column_index(name);
    let yearbuilt_idx = col("yearbuilt")?;
    let bldgarea_idx = col("bldgarea")?;
    let unitsres_idx = col("unitsres")?;
    let unitstotal_idx = col("unitstotal")?;
    let resarea_idx = col("resarea")?;
    let officearea_idx = col("officearea")?;
    let retailarea_idx = col("retailarea")?;
    let comarea_idx = col("comarea")?;
    let numfloors_idx = col("numfloors")?;

    let mut tracts: BTreeMap<String, TractAcc> = BTreeMap::new();
    for row in lots.rows() {
        // bbl values come out of the dump as decimals ("1000010010.0")
        let id = row[bbl_idx].split('.').next().unwrap_or_default();
        let Some(county) = id.get(..1).and_then(county_for_boro) else {
            continue;
        };
        let code = &row[tract_idx];
        let tract = if code.len() == 4 {
            format!("{county}{code}00")
        } else {
            format!("{county}{code}")
        };

        let acc = tracts.entry(tract).or_default();
        let parse = |idx: usize| row[idx].parse::<f64>().ok();
        if let Some(v) = parse(numfloors_idx) {
            acc.numfloors.push(v);
        }
        if let Some(v) = parse(yearbuilt_idx) {
            acc.yearbuilt.push(v);
        }
        if let Some(v) = parse(bldgarea_idx) {
            acc.lot_bldgarea.push(v);
            acc.bldgarea += v;
        }
        acc.unitstotal += parse(unitstotal_idx).unwrap_or(0.0);
        acc.comarea += parse(comarea_idx).unwrap_or(0.0);
        acc.resarea += parse(resarea_idx).unwrap_or(0.0);
        acc.officearea += parse(officearea_idx).unwrap_or(0.0);
        acc.retailarea += parse(retailarea_idx).unwrap_or(0.0);
        acc.unitsres += parse(unitsres_idx).unwrap_or(0.0);
    }

    let mut out = Table::new(MAPPLUTO_AGG_COLUMNS.iter().map(|h| h.to_string()).collect());
    for (tract, acc) in &tracts {
        out.push_row(vec![
            tract.clone(),
            ratio(acc.unitsres, acc.unitstotal).to_string(),
            ratio(acc.retailarea, acc.bldgarea).to_string(),
            ratio(acc.resarea, acc.bldgarea).to_string(),
            ratio(acc.comarea, acc.bldgarea).to_string(),
            acc.yearbuilt.mean().to_string(),
            ratio(acc.officearea, acc.bldgarea).to_string(),
            acc.numfloors.mean().to_string(),
            acc.unitstotal.to_string(),
            ratio(acc.lot_bldgarea.mean(), acc.unitstotal).to_string(),
            acc.bldgarea.to_string(),
        ]);
    }
    info!(tracts = out.len(), "mappluto aggregated");
    out.write(output, TAB)
}
