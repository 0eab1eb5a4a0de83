//! Explicit pipeline description.
//!
//! Stage ordering used to be implied by a driver calling functions in
//! sequence; here each plan is data — named stages declaring which file
//! roles they consume and produce — so the ordering is validated before
//! anything runs.

use crate::config::PipelineConfig;
use crate::transform::{aggregate, context, features, flatten, incidents, streets};
use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

/// Every file the stages exchange, by role rather than by path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    RawIncidents,
    RawStreets,
    RawComplaints,
    RawDobViolations,
    RawEcbViolations,
    RawPermits,
    BuildingTracts,
    WeatherRaw,
    WeatherDaily,
    CensusTracts,
    MapplutoDump,
    MapplutoAgg,
    ComplaintsAgg,
    ViolationsAgg,
    PermitsAgg,
    NormalizedIncidents,
    StreetSegments,
    IncidentTracts,
    IncidentGrid,
    ContextTable,
    FeatureTable,
    ModelFile,
}

use FileRole::*;

impl FileRole {
    pub fn file_name(self) -> &'static str {
        match self {
            RawIncidents => "nyc_fire_incidents.csv",
            RawStreets => "StreetSegment.csv",
            RawComplaints => "nyc_dob_complaints.csv",
            RawDobViolations => "nyc_dob_violations.csv",
            RawEcbViolations => "nyc_dob_ecb_violations.csv",
            RawPermits => "nyc_dob_permits.csv",
            BuildingTracts => "nyc_bin_bbl_tract.csv",
            WeatherRaw => "nyc_weather_info.csv",
            WeatherDaily => "nyc_weather_filtered.csv",
            CensusTracts => "nyc_tracts.csv",
            MapplutoDump => "nyc_mappluto_filtered.csv",
            MapplutoAgg => "nyc_mappluto_agg.csv",
            ComplaintsAgg => "nyc_dob_complaints_agg.csv",
            ViolationsAgg => "nyc_dob_ecb_violations_agg.csv",
            PermitsAgg => "nyc_dob_permits_agg.csv",
            NormalizedIncidents => "nyc_fire_incidents_out.csv",
            StreetSegments => "nyc_streets_segments.csv",
            IncidentTracts => "nyc_fire_incidents_tracts.csv",
            IncidentGrid => "nyc_fire_incidents_sparse.csv",
            ContextTable => "nyc_fire_incidents_context.csv",
            FeatureTable => "nyc_fire_incidents_context_final.csv",
            ModelFile => "rf_classifier_firecaster.bin",
        }
    }

    pub fn path(self, cfg: &PipelineConfig) -> PathBuf {
        let dir = match self {
            RawIncidents | RawStreets | RawComplaints | RawDobViolations | RawEcbViolations
            | RawPermits => &cfg.raw_dir,
            WeatherRaw => &cfg.interim_dir,
            _ => &cfg.processed_dir,
        };
        dir.join(self.file_name())
    }
}

/// One named stage: the file roles it consumes and produces, and its body.
pub struct StageDef {
    pub name: &'static str,
    pub inputs: &'static [FileRole],
    pub outputs: &'static [FileRole],
    pub run: fn(&PipelineConfig) -> Result<()>,
}

fn stage_normalize_incidents(cfg: &PipelineConfig) -> Result<()> {
    incidents::normalize_incidents_file(&RawIncidents.path(cfg), &NormalizedIncidents.path(cfg))
}

fn stage_normalize_streets(cfg: &PipelineConfig) -> Result<()> {
    streets::normalize_street_file(&RawStreets.path(cfg), &StreetSegments.path(cfg))
}

fn stage_filter_weather(cfg: &PipelineConfig) -> Result<()> {
    let collector =
        crate::acquire::WeatherCollector::new(&cfg.experiment_start, &cfg.experiment_end);
    collector.filter_weather(&WeatherRaw.path(cfg), &WeatherDaily.path(cfg))
}

fn stage_aggregate_mappluto(cfg: &PipelineConfig) -> Result<()> {
    aggregate::aggregate_mappluto(&MapplutoDump.path(cfg), &MapplutoAgg.path(cfg))
}

fn stage_aggregate_complaints(cfg: &PipelineConfig) -> Result<()> {
    aggregate::aggregate_complaints(
        &BuildingTracts.path(cfg),
        &RawComplaints.path(cfg),
        &ComplaintsAgg.path(cfg),
    )
}

fn stage_aggregate_violations(cfg: &PipelineConfig) -> Result<()> {
    aggregate::aggregate_violations(
        &BuildingTracts.path(cfg),
        &RawDobViolations.path(cfg),
        &RawEcbViolations.path(cfg),
        &ViolationsAgg.path(cfg),
    )
}

fn stage_aggregate_permits(cfg: &PipelineConfig) -> Result<()> {
    aggregate::aggregate_permits(
        &BuildingTracts.path(cfg),
        &RawPermits.path(cfg),
        &PermitsAgg.path(cfg),
    )
}

fn stage_join_incident_tracts(cfg: &PipelineConfig) -> Result<()> {
    flatten::join_with_tracts(
        &NormalizedIncidents.path(cfg),
        &StreetSegments.path(cfg),
        &IncidentTracts.path(cfg),
    )
}

fn stage_flatten_grid(cfg: &PipelineConfig) -> Result<()> {
    flatten::flatten_incidents_tracts(
        &IncidentTracts.path(cfg),
        &CensusTracts.path(cfg),
        &IncidentGrid.path(cfg),
    )
}

fn stage_join_census(cfg: &PipelineConfig) -> Result<()> {
    context::join_with_census(
        &IncidentGrid.path(cfg),
        &CensusTracts.path(cfg),
        &ContextTable.path(cfg),
    )
}

fn stage_join_weather(cfg: &PipelineConfig) -> Result<()> {
    context::join_with_weather(
        &ContextTable.path(cfg),
        &WeatherDaily.path(cfg),
        &ContextTable.path(cfg),
    )
}

fn stage_join_mappluto(cfg: &PipelineConfig) -> Result<()> {
    context::join_with_mappluto(
        &ContextTable.path(cfg),
        &MapplutoAgg.path(cfg),
        &ContextTable.path(cfg),
    )
}

fn stage_join_complaints(cfg: &PipelineConfig) -> Result<()> {
    context::join_monthly_aggregate(
        &ContextTable.path(cfg),
        &ComplaintsAgg.path(cfg),
        &ContextTable.path(cfg),
    )
}

fn stage_join_violations(cfg: &PipelineConfig) -> Result<()> {
    context::join_monthly_aggregate(
        &ContextTable.path(cfg),
        &ViolationsAgg.path(cfg),
        &ContextTable.path(cfg),
    )
}

fn stage_join_permits(cfg: &PipelineConfig) -> Result<()> {
    context::join_monthly_aggregate(
        &ContextTable.path(cfg),
        &PermitsAgg.path(cfg),
        &ContextTable.path(cfg),
    )
}

fn stage_encode_time_features(cfg: &PipelineConfig) -> Result<()> {
    features::encode_time_features(&ContextTable.path(cfg))
}

fn stage_rename_census_columns(cfg: &PipelineConfig) -> Result<()> {
    features::rename_census_columns(&ContextTable.path(cfg))
}

fn stage_select_features(cfg: &PipelineConfig) -> Result<()> {
    features::select_relevant_features(&ContextTable.path(cfg), &FeatureTable.path(cfg))
}

/// Files that must already exist before the preprocess plan runs.
pub static PREPROCESS_SOURCES: &[FileRole] = &[
    RawIncidents,
    RawStreets,
    RawComplaints,
    RawDobViolations,
    RawEcbViolations,
    RawPermits,
    BuildingTracts,
    WeatherRaw,
    MapplutoDump,
];

pub static PREPROCESS_PLAN: &[StageDef] = &[
    StageDef {
        name: "normalize_incidents",
        inputs: &[RawIncidents],
        outputs: &[NormalizedIncidents],
        run: stage_normalize_incidents,
    },
    StageDef {
        name: "normalize_streets",
        inputs: &[RawStreets],
        outputs: &[StreetSegments],
        run: stage_normalize_streets,
    },
    StageDef {
        name: "filter_weather",
        inputs: &[WeatherRaw],
        outputs: &[WeatherDaily],
        run: stage_filter_weather,
    },
    StageDef {
        name: "aggregate_mappluto",
        inputs: &[MapplutoDump],
        outputs: &[MapplutoAgg],
        run: stage_aggregate_mappluto,
    },
    StageDef {
        name: "aggregate_complaints",
        inputs: &[BuildingTracts, RawComplaints],
        outputs: &[ComplaintsAgg],
        run: stage_aggregate_complaints,
    },
    StageDef {
        name: "aggregate_violations",
        inputs: &[BuildingTracts, RawDobViolations, RawEcbViolations],
        outputs: &[ViolationsAgg],
        run: stage_aggregate_violations,
    },
    StageDef {
        name: "aggregate_permits",
        inputs: &[BuildingTracts, RawPermits],
        outputs: &[PermitsAgg],
        run: stage_aggregate_permits,
    },
];

/// Files the feature plan expects from acquisition and preprocessing.
pub static FEATURE_SOURCES: &[FileRole] = &[
    NormalizedIncidents,
    StreetSegments,
    WeatherDaily,
    CensusTracts,
    MapplutoAgg,
    ComplaintsAgg,
    ViolationsAgg,
    PermitsAgg,
];

pub static FEATURE_PLAN: &[StageDef] = &[
    StageDef {
        name: "join_incident_tracts",
        inputs: &[NormalizedIncidents, StreetSegments],
        outputs: &[IncidentTracts],
        run: stage_join_incident_tracts,
    },
    StageDef {
        name: "flatten_incident_grid",
        inputs: &[IncidentTracts, CensusTracts],
        outputs: &[IncidentGrid],
        run: stage_flatten_grid,
    },
    StageDef {
        name: "join_census",
        inputs: &[IncidentGrid, CensusTracts],
        outputs: &[ContextTable],
        run: stage_join_census,
    },
    StageDef {
        name: "join_weather",
        inputs: &[ContextTable, WeatherDaily],
        outputs: &[ContextTable],
        run: stage_join_weather,
    },
    StageDef {
        name: "join_mappluto",
        inputs: &[ContextTable, MapplutoAgg],
        outputs: &[ContextTable],
        run: stage_join_mappluto,
    },
    StageDef {
        name: "join_complaints",
        inputs: &[ContextTable, ComplaintsAgg],
        outputs: &[ContextTable],
        run: stage_join_complaints,
    },
    StageDef {
        name: "join_violations",
        inputs: &[ContextTable, ViolationsAgg],
        outputs: &[ContextTable],
        run: stage_join_violations,
    },
    StageDef {
        name: "join_permits",
        inputs: &[ContextTable, PermitsAgg],
        outputs: &[ContextTable],
        run: stage_join_permits,
    },
    StageDef {
        name: "encode_time_features",
        inputs: &[ContextTable],
        outputs: &[ContextTable],
        run: stage_encode_time_features,
    },
    StageDef {
        name: "rename_census_columns",
        inputs: &[ContextTable],
        outputs: &[ContextTable],
        run: stage_rename_census_columns,
    },
    StageDef {
        name: "select_features",
        inputs: &[ContextTable],
        outputs: &[FeatureTable],
        run: stage_select_features,
    },
];

/// Checks that every stage input is either a declared source or an output of
/// an earlier stage.
pub fn validate(plan: &[StageDef], sources: &[FileRole]) -> Result<()> {
    let mut available: HashSet<FileRole> = sources.iter().copied().collect();
    for stage in plan {
        for input in stage.inputs {
            if !available.contains(input) {
                bail!(
                    "stage '{}' consumes {:?}, which no earlier stage produces",
                    stage.name,
                    input
                );
            }
        }
        available.extend(stage.outputs.iter().copied());
    }
    Ok(())
}

/// Validates the plan, then runs its stages in order. The first failing
/// stage aborts the run.
pub fn run(plan: &[StageDef], sources: &[FileRole], cfg: &PipelineConfig) -> Result<()> {
    validate(plan, sources)?;
    for stage in plan {
        info!(stage = stage.name, "running stage");
        (stage.run)(cfg).with_context(|| format!("stage '{}' failed", stage.name))?;
    }
    Ok(())
}

/// Logs the plan as `stage: inputs -> outputs` lines.
pub fn log_plan(title: &str, plan: &[StageDef]) {
    info!(plan = title, stages = plan.len(), "pipeline plan");
    for stage in plan {
        info!(
            stage = stage.name,
            inputs = ?stage.inputs.iter().map(|r| r.file_name()).collect::<Vec<_>>(),
            outputs = ?stage.outputs.iter().map(|r| r.file_name()).collect::<Vec<_>>(),
            "stage"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipped_plans_validate() {
        validate(PREPROCESS_PLAN, PREPROCESS_SOURCES).unwrap();
        validate(FEATURE_PLAN, FEATURE_SOURCES).unwrap();
    }

    #[test]
    fn test_validation_rejects_missing_source() {
        // the feature plan cannot run from the preprocess sources alone:
        // the census export never appears
        let sources: Vec<FileRole> = FEATURE_SOURCES
            .iter()
            .copied()
            .filter(|r| *r != CensusTracts)
            .collect();
        let err = validate(FEATURE_PLAN, &sources).unwrap_err();
        assert!(err.to_string().contains("CensusTracts"));
    }

    #[test]
    fn test_validation_rejects_reordered_stages() {
        fn noop(_: &PipelineConfig) -> Result<()> {
            Ok(())
        }
        let out_of_order = [
            StageDef {
                name: "consume_first",
                inputs: &[IncidentGrid],
                outputs: &[ContextTable],
                run: noop,
            },
            StageDef {
                name: "produce_later",
                inputs: &[IncidentTracts],
                outputs: &[IncidentGrid],
                run: noop,
            },
        ];
        assert!(validate(&out_of_order, &[IncidentTracts]).is_err());
    }

    #[test]
    fn test_paths_resolve_per_directory_kind() {
        let cfg = PipelineConfig::default();
        assert!(RawIncidents.path(&cfg).starts_with("data/raw"));
        assert!(WeatherRaw.path(&cfg).starts_with("data/interim"));
        assert!(FeatureTable.path(&cfg).starts_with("data/processed"));
    }
}
