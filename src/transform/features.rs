//! Final feature engineering: calendar one-hots, readable census column
//! names, and the fixed feature whitelist.

use crate::table::{TAB, Table};
use crate::timeutil::{self, DAY_FORMAT};
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub const DATE_FIELD: &str = "incident_date_time";
pub const TARGET: &str = "nbr_incidents";

/// ACS5 variable code → readable column name.
/// Demographics, tract-level income and poverty, housing stock, and the
/// at-risk groups as defined by the CDC.
pub static CENSUS_FIELDS: &[(&str, &str)] = &[
    // people
    ("B01001_001E", "total_population"),
    // building
    ("B11001_002E", "family_households"),
    ("B11011_001E", "household_type_by_units_in_structure"),
    ("B19001_001E", "households_income"),
    ("B25010_001E", "people_per_household"),
    ("B25001_001E", "total_housing_units"),
    ("B25021_001E", "median_number_of_rooms"),
    ("B25058_001E", "median_contract_rent"),
    ("B25064_001M", "median_gross_rent"),
    ("B19013_001E", "median_household_income"),
    ("B19025_001E", "aggregate_household_income"),
    ("B25077_001E", "owner_occupied_homes_median_value"),
    ("B25075_025E", "value_for_owner_occupied_housing_units"),
    // neighborhood
    ("B25004_001E", "total_vacancies"),
    ("B25004_005E", "sold_not_occupied"),
    ("B25004_002E", "for_rent"),
    // age
    ("B01002_001E", "median_age"),
    ("B16001_001E", "population_5_and_over"),
    ("B23003_001E", "adults_18_to_20"),
    ("B23006_001E", "adults_25_to_64_with_bachelors_degree"),
    ("B06012_002E", "poverty_level_u100"),
    // ethnicity
    ("B06001_049E", "foreign_born_population"),
    ("B02001_002E", "white_pop"),
    ("B02001_003E", "black_pop"),
    ("B01001I_001E", "hispanic_pop"),
    ("B02001_005E", "asian_pop"),
    ("B02001_006E", "pacific_pop"),
    ("B02001_004E", "native_pop"),
    ("B02001_007E", "older_pop"),
    // year structure was built
    ("B25034_001E", "built_total"),
    ("B25034_006E", "built_1970s"),
    ("B25034_007E", "built_1960s"),
    ("B25034_008E", "built_1950s"),
    ("B25034_009E", "built_1940s"),
    ("B25034_010E", "built_before_1940"),
    // at-risk groups
    ("B01001_003E", "m_u5"),
    ("B01001_027E", "f_u5"),
    ("B01001B_003E", "m_u5_black"),
    ("B01001B_027E", "f_u5_black"),
    ("B01001C_003E", "m_u5_indig"),
    ("B01001C_027E", "f_u5_indig"),
    ("B01001H_003E", "m_u5_latin"),
    ("B01001H_027E", "f_u5_latin"),
    ("B05009_012E", "one_foreign_parent_one_us_parent_u6_foreign"),
    ("B05009_009E", "foreign_parents_u6_foreign"),
    ("B05009_019E", "one_foreign_parent_u6_foreign"),
    ("B05009_005E", "foreign_born_child"),
    ("B06012_003E", "poverty_level_u149_o100"),
];

pub static WDAY_COLUMNS: &[&str] = &[
    "wday_mon", "wday_tue", "wday_wed", "wday_thu", "wday_fri", "wday_sat", "wday_sun",
];

pub static MONTH_COLUMNS: &[&str] = &[
    "month_jan", "month_feb", "month_mar", "month_apr", "month_may", "month_jun",
    "month_jul", "month_aug", "month_sep", "month_oct", "month_nov", "month_dec",
];

/// The columns the final feature table keeps, in order.
pub static RELEVANT_FEATURES: &[&str] = &[
    "incident_date_time", "census_tract", "nbr_incidents",
    "wday_mon", "wday_tue", "wday_wed", "wday_thu", "wday_fri", "wday_sat", "wday_sun",
    "month_jan", "month_feb", "month_mar", "month_apr", "month_may", "month_jun",
    "month_jul", "month_aug", "month_sep", "month_oct", "month_nov", "month_dec",
    "population_5_and_over", "f_u5", "older_pop", "built_total",
    "f_u5_latin", "black_pop", "household_type_by_units_in_structure",
    "built_1940s", "built_before_1940", "built_1950s", "built_1960s", "built_1970s",
    "adults_18_to_20", "adults_25_to_64_with_bachelors_degree", "white_pop",
    "people_per_household", "m_u5_latin", "median_gross_rent",
    "m_u5_indig", "owner_occupied_homes_median_value",
    "family_households", "pacific_pop", "aggregate_household_income",
    "households_income", "total_housing_units",
    "for_rent", "m_u5", "one_foreign_parent_one_us_parent_u6_foreign",
    "value_for_owner_occupied_housing_units",
    "one_foreign_parent_u6_foreign", "median_household_income",
    "f_u5_indig", "median_number_of_rooms", "asian_pop",
    "total_vacancies", "median_age", "sold_not_occupied",
    "foreign_born_child", "foreign_born_population", "hispanic_pop",
    "foreign_parents_u6_foreign", "poverty_level_u149_o100",
    "poverty_level_u100", "total_population", "m_u5_black",
    "native_pop", "median_contract_rent", "f_u5_black",
    "mintempm", "maxtempm", "snowdepthm", "meanpressurem", "meanwindspdm", "precipm",
    "nbr_ecb_violations", "nbr_dob_violations", "nbr_dob_permits",
    "avg_unitsres", "ratio_retailarea", "ratio_resarea", "ratio_comarea",
    "avg_yearbuilt", "ratio_officerea", "avg_numfloors", "total_units",
    "avg_unitarea", "total_bldgarea",
];

/// The model's input columns: everything in the feature table except the
/// row identity, the target, and the municipal count columns.
pub static PREDICTORS: &[&str] = &[
    "wday_mon", "wday_tue", "wday_wed", "wday_thu", "wday_fri", "wday_sat", "wday_sun",
    "month_jan", "month_feb", "month_mar", "month_apr", "month_may", "month_jun",
    "month_jul", "month_aug", "month_sep", "month_oct", "month_nov", "month_dec",
    "population_5_and_over", "f_u5", "older_pop", "built_total",
    "f_u5_latin", "black_pop", "household_type_by_units_in_structure",
    "built_1940s", "built_before_1940", "built_1950s", "built_1960s", "built_1970s",
    "adults_18_to_20", "adults_25_to_64_with_bachelors_degree", "white_pop",
    "people_per_household", "m_u5_latin", "median_gross_rent",
    "m_u5_indig", "owner_occupied_homes_median_value",
    "family_households", "pacific_pop", "aggregate_household_income",
    "households_income", "total_housing_units",
    "for_rent", "m_u5", "one_foreign_parent_one_us_parent_u6_foreign",
    "value_for_owner_occupied_housing_units",
    "one_foreign_parent_u6_foreign", "median_household_income",
    "f_u5_indig", "median_number_of_rooms", "asian_pop",
    "total_vacancies", "median_age", "sold_not_occupied",
    "foreign_born_child", "foreign_born_population", "hispanic_pop",
    "foreign_parents_u6_foreign", "poverty_level_u149_o100",
    "poverty_level_u100", "total_population", "m_u5_black",
    "native_pop", "median_contract_rent", "f_u5_black",
    "mintempm", "maxtempm", "snowdepthm", "meanpressurem", "meanwindspdm", "precipm",
    "avg_unitsres", "ratio_retailarea", "ratio_resarea", "ratio_comarea",
    "avg_yearbuilt", "ratio_officerea", "avg_numfloors", "total_units",
    "avg_unitarea", "total_bldgarea",
];

/// Adds `week_day`/`month` plus their one-hot encodings, in place.
pub fn encode_time_features(path: &Path) -> Result<()> {
    let mut context = Table::read(path, TAB)?;

    let date_idx = context.column_index(DATE_FIELD)?;
    let weekdays: Vec<Option<u32>> = context
        .rows()
        .iter()
        .map(|row| timeutil::weekday(&row[date_idx], DAY_FORMAT))
        .collect();
    let months: Vec<Option<u32>> = context
        .rows()
        .iter()
        .map(|row| timeutil::month(&row[date_idx], DAY_FORMAT))
        .collect();

    let rendered = |values: &[Option<u32>]| -> Vec<String> {
        values
            .iter()
            .map(|v| v.map(|n| n.to_string()).unwrap_or_default())
            .collect()
    };
    context.add_column("week_day", rendered(&weekdays))?;
    context.add_column("month", rendered(&months))?;

    for (i, column) in WDAY_COLUMNS.iter().enumerate() {
        let flags = weekdays
            .iter()
            .map(|wd| if *wd == Some(i as u32) { "1".into() } else { "0".into() })
            .collect();
        context.add_column(column, flags)?;
    }
    for (i, column) in MONTH_COLUMNS.iter().enumerate() {
        let flags = months
            .iter()
            .map(|m| if *m == Some(i as u32 + 1) { "1".into() } else { "0".into() })
            .collect();
        context.add_column(column, flags)?;
    }

    context.write(path, TAB)
}

/// Rewrites ACS variable codes into their readable names, in place.
pub fn rename_census_columns(path: &Path) -> Result<()> {
    let mut context = Table::read(path, TAB)?;
    let names: HashMap<&str, &str> = CENSUS_FIELDS.iter().copied().collect();
    context.map_headers(|h| names.get(h).map(|n| n.to_string()).unwrap_or_else(|| h.to_string()));
    context.write(path, TAB)
}

/// Projects the context table onto the feature whitelist; any missing value
/// becomes 0.
pub fn select_relevant_features(input: &Path, output: &Path) -> Result<()> {
    let context = Table::read(input, TAB)?;
    let selected = context.project(RELEVANT_FEATURES, "0")?;
    info!(
        rows = selected.len(),
        columns = selected.headers().len(),
        "feature table written"
    );
    selected.write(output, TAB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_census_name_in_whitelist_exists() {
        let names: Vec<&str> = CENSUS_FIELDS.iter().map(|(_, n)| *n).collect();
        let known: Vec<&str> = names
            .iter()
            .copied()
            .chain(WDAY_COLUMNS.iter().copied())
            .chain(MONTH_COLUMNS.iter().copied())
            .collect();
        for feature in RELEVANT_FEATURES {
            let is_census_like = feature.starts_with("built_")
                || feature.ends_with("_pop")
                || feature.contains("household");
            if is_census_like {
                assert!(known.contains(feature), "unknown column {feature}");
            }
        }
    }

    #[test]
    fn test_predictors_are_a_subset_of_features() {
        for p in PREDICTORS {
            assert!(RELEVANT_FEATURES.contains(p), "{p} not in whitelist");
        }
        assert!(!PREDICTORS.contains(&DATE_FIELD));
        assert!(!PREDICTORS.contains(&TARGET));
    }

    #[test]
    fn test_encode_time_features_one_hot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.csv");
        // 2014-12-25 was a Thursday
        std::fs::write(
            &path,
            "incident_date_time\tcensus_tract\tnbr_incidents\n\
             25-12-2014\t36061000100\t1\n",
        )
        .unwrap();

        encode_time_features(&path).unwrap();

        let context = Table::read(&path, TAB).unwrap();
        let get = |name: &str| {
            let idx = context.column_index(name).unwrap();
            context.rows()[0][idx].clone()
        };
        assert_eq!(get("week_day"), "3");
        assert_eq!(get("month"), "12");
        assert_eq!(get("wday_thu"), "1");
        assert_eq!(get("wday_fri"), "0");
        assert_eq!(get("month_dec"), "1");
        assert_eq!(get("month_jan"), "0");
    }

    #[test]
    fn test_rename_census_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.csv");
        std::fs::write(
            &path,
            "census_tract\tB01001_001E\tother\n\
             36061000100\t5000\tx\n",
        )
        .unwrap();

        rename_census_columns(&path).unwrap();

        let context = Table::read(&path, TAB).unwrap();
        assert!(context.has_column("total_population"));
        assert!(context.has_column("other"));
        assert!(!context.has_column("B01001_001E"));
    }
}
