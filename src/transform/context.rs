//! Successive left joins of the context layers into the incident grid.
//!
//! Each join keys on the grid's natural columns (tract, day, or month of
//! day) and never drops a grid row; unmatched context columns stay empty
//! until the final feature projection zero-fills them.

use crate::table::{TAB, Table};
use crate::timeutil::{self, DAY_FORMAT, MONTH_FORMAT};
use crate::transform::flatten::compose_tract;
use anyhow::Result;
use std::path::Path;
use tracing::info;

/// Joins census demographics by tract. The census export splits the tract id
/// into state/county/tract fields; they are composed before the join.
pub fn join_with_census(grid_path: &Path, census_path: &Path, output: &Path) -> Result<()> {
    let grid = Table::read(grid_path, TAB)?;
    let mut census = Table::read(census_path, TAB)?;

    let state_idx = census.column_index("state")?;
    let county_idx = census.column_index("county")?;
    let code_idx = census.column_index("tract")?;
    let tracts: Vec<String> = census
        .rows()
        .iter()
        .map(|row| compose_tract(&row[state_idx], &row[county_idx], &row[code_idx]))
        .collect();
    census.add_column("census_tract", tracts)?;

    let joined = grid.left_join(&census, &["census_tract"], &["census_tract"])?;
    info!(rows = joined.len(), "census layer joined");
    joined.write(output, TAB)
}

/// Joins the daily weather summary by date.
pub fn join_with_weather(context_path: &Path, weather_path: &Path, output: &Path) -> Result<()> {
    let context = Table::read(context_path, TAB)?;
    let weather = Table::read(weather_path, TAB)?;

    let joined = context.left_join(&weather, &["incident_date_time"], &["observation_date_time"])?;
    info!(rows = joined.len(), "weather layer joined");
    joined.write(output, TAB)
}

/// Joins the per-tract mappluto aggregates.
pub fn join_with_mappluto(context_path: &Path, mappluto_path: &Path, output: &Path) -> Result<()> {
    let context = Table::read(context_path, TAB)?;
    let mappluto = Table::read(mappluto_path, TAB)?;

    let joined = context.left_join(&mappluto, &["census_tract"], &["census_tract"])?;
    info!(rows = joined.len(), "mappluto layer joined");
    joined.write(output, TAB)
}

/// Joins a monthly (tract, month) aggregate against the month of each grid
/// date.
pub fn join_monthly_aggregate(context_path: &Path, aggregate_path: &Path, output: &Path) -> Result<()> {
    let mut context = Table::read(context_path, TAB)?;
    let aggregate = Table::read(aggregate_path, TAB)?;

    let date_idx = context.column_index("incident_date_time")?;
    let months: Vec<String> = context
        .rows()
        .iter()
        .map(|row| {
            timeutil::normalize_dt(&row[date_idx], DAY_FORMAT, MONTH_FORMAT).unwrap_or_default()
        })
        .collect();
    context.add_column("_month", months)?;

    let mut joined = context.left_join(
        &aggregate,
        &["census_tract", "_month"],
        &["census_tract", "month"],
    )?;
    joined.drop_column("_month")?;
    info!(rows = joined.len(), "monthly aggregate joined");
    joined.write(output, TAB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_with_census_keeps_all_grid_rows() {
        let dir = tempfile::tempdir().unwrap();
        let grid = dir.path().join("grid.csv");
        let census = dir.path().join("census.csv");
        let output = dir.path().join("out.csv");
        std::fs::write(
            &grid,
            "incident_date_time\tcensus_tract\tnbr_incidents\n\
             01-01-2014\t36061000100\t1\n\
             01-01-2014\t36061000200\t0\n",
        )
        .unwrap();
        std::fs::write(
            &census,
            "NAME\tB01001_001E\tstate\tcounty\ttract\n\
             Tract 1\t5000\t36\t061\t000100\n",
        )
        .unwrap();

        join_with_census(&grid, &census, &output).unwrap();

        let joined = Table::read(&output, TAB).unwrap();
        assert_eq!(joined.len(), 2);
        let pop_idx = joined.column_index("B01001_001E").unwrap();
        assert_eq!(joined.rows()[0][pop_idx], "5000");
        assert_eq!(joined.rows()[1][pop_idx], "");
    }

    #[test]
    fn test_join_monthly_aggregate_buckets_dates() {
        let dir = tempfile::tempdir().unwrap();
        let context = dir.path().join("context.csv");
        let aggregate = dir.path().join("agg.csv");
        let output = dir.path().join("out.csv");
        std::fs::write(
            &context,
            "incident_date_time\tcensus_tract\tnbr_incidents\n\
             15-01-2014\t36061000100\t1\n\
             15-02-2014\t36061000100\t0\n",
        )
        .unwrap();
        std::fs::write(
            &aggregate,
            "census_tract\tmonth\tnbr_dob_permits\n\
             36061000100\t01-2014\t7\n",
        )
        .unwrap();

        join_monthly_aggregate(&context, &aggregate, &output).unwrap();

        let joined = Table::read(&output, TAB).unwrap();
        assert!(!joined.has_column("_month"));
        assert!(!joined.has_column("month"));
        let permits_idx = joined.column_index("nbr_dob_permits").unwrap();
        assert_eq!(joined.rows()[0][permits_idx], "7");
        assert_eq!(joined.rows()[1][permits_idx], "");
    }

    #[test]
    fn test_join_with_weather_on_date() {
        let dir = tempfile::tempdir().unwrap();
        let context = dir.path().join("context.csv");
        let weather = dir.path().join("weather.csv");
        let output = dir.path().join("out.csv");
        std::fs::write(
            &context,
            "incident_date_time\tcensus_tract\tnbr_incidents\n\
             01-01-2014\t36061000100\t1\n",
        )
        .unwrap();
        std::fs::write(
            &weather,
            "observation_date_time\tmintempm\tmaxtempm\n\
             01-01-2014\t-3\t4\n",
        )
        .unwrap();

        join_with_weather(&context, &weather, &output).unwrap();

        let joined = Table::read(&output, TAB).unwrap();
        let min_idx = joined.column_index("mintempm").unwrap();
        assert_eq!(joined.rows()[0][min_idx], "-3");
    }
}
