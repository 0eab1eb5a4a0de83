//! CLI entry point for the FireCaster pipeline.
//!
//! Provides subcommands for collecting contextual data, preprocessing raw
//! exports, running the feature join pipeline, and training the classifier.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use firecaster::acquire::{CensusClient, WeatherClient, WeatherCollector};
use firecaster::analysis::metrics::mean_scores;
use firecaster::analysis::model::{self, FireModel};
use firecaster::config::PipelineConfig;
use firecaster::db::{Db, Quester};
use firecaster::pipeline::{self, FileRole};
use firecaster::transform::features::{PREDICTORS, TARGET};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "firecaster")]
#[command(about = "Fire-risk feature pipeline and model builder", long_about = None)]
struct Cli {
    /// Path to the pipeline configuration file
    #[arg(short, long, default_value = "config/firecaster.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect contextual data: weather history, census demographics, and
    /// database table dumps
    Collect {
        /// Skip the database exports (weather and census only)
        #[arg(long, default_value_t = false)]
        skip_db: bool,

        /// Also assign incident tracts server-side via the street-name join
        #[arg(long, default_value_t = false)]
        assign_tracts: bool,
    },
    /// Normalize raw exports and aggregate the municipal building files
    Preprocess,
    /// Run the join pipeline producing the final feature table
    Features,
    /// Print and validate the pipeline stage plans
    Plan,
    /// Train and evaluate the fire-risk classifier
    Train {
        /// Walk-forward day-by-day evaluation over the test period
        #[arg(short, long, default_value_t = true)]
        walk_forward: bool,

        /// Shuffled cross-validation and model persistence
        #[arg(short, long, default_value_t = false)]
        shuffle: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/firecaster.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("firecaster.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let cfg = PipelineConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Collect {
            skip_db,
            assign_tracts,
        } => {
            collect(&cfg, skip_db, assign_tracts).await?;
        }
        Commands::Preprocess => {
            cfg.ensure_dirs()?;
            pipeline::run(pipeline::PREPROCESS_PLAN, pipeline::PREPROCESS_SOURCES, &cfg)?;
        }
        Commands::Features => {
            cfg.ensure_dirs()?;
            pipeline::run(pipeline::FEATURE_PLAN, pipeline::FEATURE_SOURCES, &cfg)?;
        }
        Commands::Plan => {
            pipeline::validate(pipeline::PREPROCESS_PLAN, pipeline::PREPROCESS_SOURCES)?;
            pipeline::log_plan("preprocess", pipeline::PREPROCESS_PLAN);
            pipeline::validate(pipeline::FEATURE_PLAN, pipeline::FEATURE_SOURCES)?;
            pipeline::log_plan("features", pipeline::FEATURE_PLAN);
            info!("both plans validate");
        }
        Commands::Train {
            walk_forward,
            shuffle,
        } => {
            train(&cfg, walk_forward, shuffle)?;
        }
    }

    Ok(())
}

/// Fetches the weather history and census demographics, and dumps the
/// building tables from Postgres.
#[tracing::instrument(skip(cfg))]
async fn collect(cfg: &PipelineConfig, skip_db: bool, assign_tracts: bool) -> Result<()> {
    cfg.ensure_dirs()?;

    info!("collecting weather history");
    let mut weather = WeatherClient::load(&cfg.weather_keys_file)?;
    let collector = WeatherCollector::new(&cfg.experiment_start, &cfg.experiment_end);
    collector
        .collect_period(
            &mut weather,
            &FileRole::WeatherRaw.path(cfg),
            &cfg.region,
            &cfg.city,
        )
        .await?;

    info!("collecting census demographics");
    let key = std::env::var("CENSUS_API_KEY").context("CENSUS_API_KEY must be set")?;
    let census = CensusClient::new(cfg.census_year, &cfg.census_dataset, key);
    census
        .export_tracts(&cfg.census_state, &FileRole::CensusTracts.path(cfg))
        .await?;

    if skip_db {
        info!("skipping database exports");
        return Ok(());
    }

    info!("exporting building tables");
    let quester = Quester::new(Db::connect(&cfg.db)?);
    quester
        .export_mappluto(&FileRole::MapplutoDump.path(cfg))
        .await?;
    quester
        .export_buildings(&FileRole::BuildingTracts.path(cfg))
        .await?;
    if assign_tracts {
        quester.assign_incident_tracts().await?;
    }

    Ok(())
}

/// Trains and evaluates the classifier on the final feature table.
#[tracing::instrument(skip(cfg))]
fn train(cfg: &PipelineConfig, walk_forward: bool, shuffle: bool) -> Result<()> {
    let mut table = model::load_feature_table(&FileRole::FeatureTable.path(cfg))?;
    model::label_target(&mut table, TARGET)?;

    if walk_forward {
        // train on all days up to d-1, predict day d, for each test day
        let days = cfg.test_days()?;
        let results = model::walk_forward(&table, PREDICTORS, TARGET, &days)?;
        let scores: Vec<_> = results.iter().map(|(_, s)| *s).collect();
        let mean = mean_scores(&scores);
        info!(
            days = results.len(),
            accuracy = mean.accuracy,
            precision = mean.precision,
            recall = mean.recall,
            f1 = mean.f1,
            roc_auc = mean.roc_auc,
            "walk-forward evaluation complete"
        );
    }

    if shuffle {
        let ds = model::to_dataset(&table, PREDICTORS, TARGET)?;

        let cv = model::cross_validate(&ds, cfg.cv_folds)?;
        info!(
            folds = cfg.cv_folds,
            accuracy = cv.accuracy,
            precision = cv.precision,
            recall = cv.recall,
            f1 = cv.f1,
            roc_auc = cv.roc_auc,
            "cross-validation complete"
        );

        let (train_ds, test_ds) = model::shuffled_split(&ds, cfg.test_fraction, cfg.seed);
        let fitted = FireModel::fit(&train_ds)?;
        let holdout = fitted.evaluate(&test_ds)?;
        info!(
            accuracy = holdout.accuracy,
            f1 = holdout.f1,
            "holdout evaluation complete"
        );
        fitted.save(&FileRole::ModelFile.path(cfg))?;
    }

    Ok(())
}
