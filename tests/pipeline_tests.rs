//! End-to-end runs of the preprocess and feature plans over tiny fixtures.

use firecaster::config::PipelineConfig;
use firecaster::pipeline::{self, FileRole};
use firecaster::table::{TAB, Table};
use firecaster::transform::features::{CENSUS_FIELDS, RELEVANT_FEATURES};
use std::path::Path;

fn test_config(root: &Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.raw_dir = root.join("raw");
    cfg.interim_dir = root.join("interim");
    cfg.processed_dir = root.join("processed");
    cfg.ensure_dirs().unwrap();
    cfg
}

fn write_fixture(cfg: &PipelineConfig, role: FileRole, content: &str) {
    std::fs::write(role.path(cfg), content).unwrap();
}

/// A census export with every demographic variable set to `2` for one tract.
fn census_fixture(tracts: &[(&str, &str, &str)]) -> String {
    let mut header = vec!["NAME".to_string()];
    header.extend(CENSUS_FIELDS.iter().map(|(code, _)| code.to_string()));
    header.extend(["state".to_string(), "county".to_string(), "tract".to_string()]);

    let mut out = header.join("\t");
    out.push('\n');
    for (state, county, tract) in tracts {
        let mut row = vec![format!("Census Tract {tract}")];
        row.extend(CENSUS_FIELDS.iter().map(|_| "2".to_string()));
        row.extend([state.to_string(), county.to_string(), tract.to_string()]);
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

fn weather_line(compact_date: &str, mintemp: &str) -> String {
    format!(
        "{compact_date}\t{{\"mintempm\":\"{mintemp}\",\"maxtempm\":\"4\",\"humidity\":\"81\",\
         \"snow\":\"0\",\"snowdepthm\":\"T\",\"meanpressurem\":\"1016\",\
         \"meanwindspdm\":\"13\",\"precipm\":\"0.5\",\"rain\":\"0\"}}\n"
    )
}

fn write_all_fixtures(cfg: &PipelineConfig) {
    write_fixture(
        cfg,
        FileRole::RawIncidents,
        "INCIDENT_DATE_TIME,STREET_HIGHWAY,BOROUGH_DESC,ZIP_CODE\n\
         01/01/2014 08:30:00 AM,W 151 St,1 - Manhattan,10031\n\
         01/03/2014 11:00:00 PM,W 151 St,1 - Manhattan,10031\n",
    );
    write_fixture(
        cfg,
        FileRole::RawStreets,
        "Label,LeftCounty,LeftPostal,RightCount,RightPosta,RightCensu,LeftCensus,WKT\n\
         W 151st St,New York,10031,New York,10031,360610001001000,360610001001001,\"LINESTRING (0 0, 1 1)\"\n",
    );
    write_fixture(
        cfg,
        FileRole::BuildingTracts,
        "BIN\tBBL\tcensus_tract\n\
         1000001\t10012345\t36061000100\n",
    );
    write_fixture(
        cfg,
        FileRole::RawComplaints,
        "BIN,Date Entered,Complaint Category,Disposition Code\n\
         1000001,01/10/2014,05,A8\n",
    );
    write_fixture(
        cfg,
        FileRole::RawDobViolations,
        "BORO,BLOCK,LOT,ISSUE_DATE\n\
         1,123,45,20140110\n\
         1,123,45,4011\n",
    );
    write_fixture(
        cfg,
        FileRole::RawEcbViolations,
        "BORO,BLOCK,LOT,ISSUE_DATE\n\
         1,123,45,20140105\n",
    );
    write_fixture(
        cfg,
        FileRole::RawPermits,
        "BOROUGH,Block,Lot,Issuance Date\n\
         MANHATTAN,123,45,01/05/2014 12:00:00 AM\n",
    );
    write_fixture(
        cfg,
        FileRole::MapplutoDump,
        "bbl\ttract2010\tyearbuilt\tcomarea\tresarea\tofficearea\tretailarea\tunitsres\tbldgarea\tassesstot\tunitstotal\tnumbldgs\tnumfloors\n\
         1000010010.0\t0001\t1950\t0\t1000\t0\t0\t8\t1000\t0\t10\t1\t4\n",
    );
    // weather only for the first two days; the third day must survive the
    // left join with zero-filled weather
    let mut weather = weather_line("20140101", "-3");
    weather.push_str(&weather_line("20140102", "-5"));
    write_fixture(cfg, FileRole::WeatherRaw, &weather);
    write_fixture(
        cfg,
        FileRole::CensusTracts,
        &census_fixture(&[("36", "061", "000100")]),
    );
}

#[test]
fn test_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    write_all_fixtures(&cfg);

    pipeline::run(pipeline::PREPROCESS_PLAN, pipeline::PREPROCESS_SOURCES, &cfg).unwrap();
    pipeline::run(pipeline::FEATURE_PLAN, pipeline::FEATURE_SOURCES, &cfg).unwrap();

    let features = Table::read(&FileRole::FeatureTable.path(&cfg), TAB).unwrap();

    // exact whitelist, in order
    let headers: Vec<&str> = features.headers().iter().map(String::as_str).collect();
    assert_eq!(headers, RELEVANT_FEATURES);

    // 3 observed days x 1 tract
    assert_eq!(features.len(), 3);

    let get = |date: &str, name: &str| -> String {
        let date_idx = features.column_index("incident_date_time").unwrap();
        let idx = features.column_index(name).unwrap();
        features
            .rows()
            .iter()
            .find(|r| r[date_idx] == date)
            .unwrap_or_else(|| panic!("no row for {date}"))[idx]
            .clone()
    };

    // incident counts: observed days carry their count, the gap day is an
    // explicit zero
    assert_eq!(get("01-01-2014", "nbr_incidents"), "1");
    assert_eq!(get("02-01-2014", "nbr_incidents"), "0");
    assert_eq!(get("03-01-2014", "nbr_incidents"), "1");

    // census demographics joined by tract and renamed
    assert_eq!(get("01-01-2014", "total_population"), "2");
    assert_eq!(get("02-01-2014", "median_age"), "2");

    // weather joined by date; the uncovered day zero-fills
    assert_eq!(get("01-01-2014", "mintempm"), "-3");
    assert_eq!(get("02-01-2014", "mintempm"), "-5");
    assert_eq!(get("03-01-2014", "mintempm"), "0");
    assert_eq!(get("01-01-2014", "snowdepthm"), "0.001");

    // monthly municipal aggregates land on every day of the month
    assert_eq!(get("01-01-2014", "nbr_dob_permits"), "1");
    assert_eq!(get("03-01-2014", "nbr_ecb_violations"), "1");
    // the malformed DOB violation row was discarded, one valid row remains
    assert_eq!(get("02-01-2014", "nbr_dob_violations"), "1");

    // mappluto aggregates joined by tract
    assert_eq!(get("01-01-2014", "total_units"), "10");
    assert_eq!(get("02-01-2014", "avg_numfloors"), "4");

    // calendar one-hots: 2014-01-01 was a Wednesday
    assert_eq!(get("01-01-2014", "wday_wed"), "1");
    assert_eq!(get("01-01-2014", "wday_thu"), "0");
    assert_eq!(get("02-01-2014", "wday_thu"), "1");
    assert_eq!(get("01-01-2014", "month_jan"), "1");
    assert_eq!(get("01-01-2014", "month_feb"), "0");
}

#[test]
fn test_single_incident_yields_single_row() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    write_all_fixtures(&cfg);
    // overwrite incidents with a single record
    write_fixture(
        &cfg,
        FileRole::RawIncidents,
        "INCIDENT_DATE_TIME,STREET_HIGHWAY,BOROUGH_DESC,ZIP_CODE\n\
         01/01/2014 08:30:00 AM,W 151 St,1 - Manhattan,10031\n",
    );

    pipeline::run(pipeline::PREPROCESS_PLAN, pipeline::PREPROCESS_SOURCES, &cfg).unwrap();
    pipeline::run(pipeline::FEATURE_PLAN, pipeline::FEATURE_SOURCES, &cfg).unwrap();

    let features = Table::read(&FileRole::FeatureTable.path(&cfg), TAB).unwrap();
    assert_eq!(features.len(), 1);

    let date_idx = features.column_index("incident_date_time").unwrap();
    let tract_idx = features.column_index("census_tract").unwrap();
    let count_idx = features.column_index("nbr_incidents").unwrap();
    assert_eq!(features.rows()[0][date_idx], "01-01-2014");
    assert_eq!(features.rows()[0][tract_idx], "36061000100");
    assert_eq!(features.rows()[0][count_idx], "1");
}

#[test]
fn test_feature_plan_fails_without_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    // no fixture files at all: the first stage must abort the run
    let err = pipeline::run(pipeline::FEATURE_PLAN, pipeline::FEATURE_SOURCES, &cfg).unwrap_err();
    assert!(err.to_string().contains("join_incident_tracts"));
}
