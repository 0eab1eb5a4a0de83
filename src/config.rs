//! Pipeline configuration.
//!
//! One explicit struct carries every path, date range, and external-service
//! parameter a stage needs; stages receive it as an argument instead of
//! reading ambient globals. Loaded from a JSON file, with defaults matching
//! the standard `data/` layout.

use crate::db::DbConfig;
use crate::timeutil::{self, DAY_FORMAT};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub interim_dir: PathBuf,
    pub processed_dir: PathBuf,

    /// Acquisition window, `%Y-%m-%d`, half-open.
    pub experiment_start: String,
    pub experiment_end: String,

    /// Walk-forward test window, `%d-%m-%Y`, half-open.
    pub test_period_start: String,
    pub test_period_end: String,

    pub census_year: u16,
    pub census_dataset: String,
    pub census_state: String,

    pub region: String,
    pub city: String,
    pub weather_keys_file: PathBuf,

    pub cv_folds: usize,
    pub test_fraction: f64,
    pub seed: u64,

    pub db: DbConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            raw_dir: PathBuf::from("data/raw"),
            interim_dir: PathBuf::from("data/interim"),
            processed_dir: PathBuf::from("data/processed"),
            experiment_start: "2013-01-01".to_string(),
            experiment_end: "2015-01-01".to_string(),
            test_period_start: "01-12-2014".to_string(),
            test_period_end: "01-01-2015".to_string(),
            census_year: 2015,
            census_dataset: "acs5".to_string(),
            census_state: "36".to_string(),
            region: "NY".to_string(),
            city: "New_York".to_string(),
            weather_keys_file: PathBuf::from("config/weather_keys.json"),
            cv_folds: 2,
            test_fraction: 0.3,
            seed: 42,
            db: DbConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Loads `path` when it exists, otherwise falls back to the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.raw_dir, &self.interim_dir, &self.processed_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    /// The walk-forward test days, oldest first.
    pub fn test_days(&self) -> Result<Vec<String>> {
        timeutil::generate_dates(
            &self.test_period_start,
            &self.test_period_end,
            DAY_FORMAT,
            DAY_FORMAT,
        )
    }
}
