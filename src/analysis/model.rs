//! Train/test splitting, the random-forest model, and the validation
//! protocols over the final feature table.

use crate::analysis::metrics::{Scores, mean_scores, score_predictions};
use crate::table::{TAB, Table};
use crate::transform::features::DATE_FIELD;
use anyhow::{Context, Result, anyhow, ensure};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Feature matrix plus binary target, row-aligned.
#[derive(Debug, Default, Clone)]
pub struct Dataset {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<u32>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

pub fn load_feature_table(path: &Path) -> Result<Table> {
    let table = Table::read(path, TAB)?;
    info!(
        rows = table.len(),
        columns = table.headers().len(),
        "feature table loaded"
    );
    Ok(table)
}

/// Binarizes the incident-count target in place: 0 stays 0, any incident
/// becomes 1.
pub fn label_target(table: &mut Table, target: &str) -> Result<()> {
    table.map_column(target, |v| {
        let count = v.parse::<f64>().unwrap_or(0.0);
        if count == 0.0 { "0".to_string() } else { "1".to_string() }
    })?;

    let idx = table.column_index(target)?;
    let positives = table.rows().iter().filter(|r| r[idx] == "1").count();
    info!(
        positives,
        negatives = table.len() - positives,
        "target labeled"
    );
    Ok(())
}

fn row_sample(row: &[String], feature_idx: &[usize]) -> Vec<f64> {
    feature_idx
        .iter()
        .map(|&i| row[i].parse::<f64>().unwrap_or(0.0))
        .collect()
}

/// Extracts the full (X, y) sample set from a labeled feature table.
pub fn to_dataset(table: &Table, features: &[&str], target: &str) -> Result<Dataset> {
    let feature_idx: Vec<usize> = features
        .iter()
        .map(|f| table.column_index(f))
        .collect::<Result<_>>()?;
    let target_idx = table.column_index(target)?;

    let mut ds = Dataset::default();
    for row in table.rows() {
        ds.x.push(row_sample(row, &feature_idx));
        ds.y.push(row[target_idx].parse::<f64>().unwrap_or(0.0) as u32);
    }
    Ok(ds)
}

/// Partitions rows into train/test by date-list membership rather than
/// randomly; rows on dates in neither list are dropped.
pub fn chronological_split(
    table: &Table,
    features: &[&str],
    target: &str,
    train_dates: &HashSet<String>,
    test_dates: &HashSet<String>,
) -> Result<(Dataset, Dataset)> {
    let date_idx = table.column_index(DATE_FIELD)?;
    let feature_idx: Vec<usize> = features
        .iter()
        .map(|f| table.column_index(f))
        .collect::<Result<_>>()?;
    let target_idx = table.column_index(target)?;

    let mut train = Dataset::default();
    let mut test = Dataset::default();
    for row in table.rows() {
        let bucket = if train_dates.contains(&row[date_idx]) {
            &mut train
        } else if test_dates.contains(&row[date_idx]) {
            &mut test
        } else {
            continue;
        };
        bucket.x.push(row_sample(row, &feature_idx));
        bucket.y.push(row[target_idx].parse::<f64>().unwrap_or(0.0) as u32);
    }

    info!(
        train_rows = train.len(),
        test_rows = test.len(),
        "chronological split"
    );
    Ok((train, test))
}

/// Seeded random split holding out `test_fraction` of the rows.
pub fn shuffled_split(ds: &Dataset, test_fraction: f64, seed: u64) -> (Dataset, Dataset) {
    let mut indices: Vec<usize> = (0..ds.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_len = (ds.len() as f64 * test_fraction).round() as usize;
    let mut train = Dataset::default();
    let mut test = Dataset::default();
    for (n, &i) in indices.iter().enumerate() {
        let bucket = if n < test_len { &mut test } else { &mut train };
        bucket.x.push(ds.x[i].clone());
        bucket.y.push(ds.y[i]);
    }
    (train, test)
}

type Forest = RandomForestClassifier<f64, u32, DenseMatrix<f64>, Vec<u32>>;

/// The persisted classifier. The target is binary (any incident vs. none),
/// so the forest is applied directly rather than one-vs-rest wrapped.
#[derive(Serialize, Deserialize)]
pub struct FireModel {
    forest: Forest,
}

impl FireModel {
    pub fn fit(train: &Dataset) -> Result<Self> {
        ensure!(!train.is_empty(), "cannot fit on an empty training set");
        let rows: Vec<&[f64]> = train.x.iter().map(|r| r.as_slice()).collect();
        let x = DenseMatrix::from_2d_array(&rows);
        let forest = RandomForestClassifier::fit(
            &x,
            &train.y,
            RandomForestClassifierParameters::default(),
        )
        .map_err(|e| anyhow!("random forest training failed: {e}"))?;
        Ok(FireModel { forest })
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<u32>> {
        let rows: Vec<&[f64]> = x.iter().map(|r| r.as_slice()).collect();
        let matrix = DenseMatrix::from_2d_array(&rows);
        self.forest
            .predict(&matrix)
            .map_err(|e| anyhow!("prediction failed: {e}"))
    }

    pub fn evaluate(&self, test: &Dataset) -> Result<Scores> {
        let pred = self.predict(&test.x)?;
        Ok(score_predictions(&test.y, &pred))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self).context("serializing model")?;
        std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "model saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        bincode::deserialize(&bytes).context("deserializing model")
    }
}

/// K-fold cross-validation over contiguous folds; returns the mean of each
/// score across folds.
pub fn cross_validate(ds: &Dataset, k: usize) -> Result<Scores> {
    ensure!(k >= 2, "cross-validation needs at least 2 folds");
    ensure!(ds.len() >= k, "fewer samples than folds");

    let fold_len = ds.len() / k;
    let mut folds = Vec::with_capacity(k);
    for fold in 0..k {
        let start = fold * fold_len;
        let end = if fold == k - 1 { ds.len() } else { start + fold_len };

        let mut train = Dataset::default();
        let mut test = Dataset::default();
        for i in 0..ds.len() {
            let bucket = if i >= start && i < end { &mut test } else { &mut train };
            bucket.x.push(ds.x[i].clone());
            bucket.y.push(ds.y[i]);
        }

        let model = FireModel::fit(&train)?;
        let scores = model.evaluate(&test)?;
        info!(
            fold,
            accuracy = scores.accuracy,
            f1 = scores.f1,
            "fold evaluated"
        );
        folds.push(scores);
    }
    Ok(mean_scores(&folds))
}

/// Walk-forward validation: for each consecutive pair of test days, the
/// earlier day joins the training set and the later day is predicted, so
/// every model trains on all days up to the one it predicts.
pub fn walk_forward(
    table: &Table,
    features: &[&str],
    target: &str,
    test_days: &[String],
) -> Result<Vec<(String, Scores)>> {
    let date_idx = table.column_index(DATE_FIELD)?;
    let test_set: HashSet<String> = test_days.iter().cloned().collect();
    let mut train_dates: HashSet<String> = table
        .rows()
        .iter()
        .map(|row| row[date_idx].clone())
        .filter(|d| !test_set.contains(d))
        .collect();

    let mut results = Vec::new();
    for pair in test_days.windows(2) {
        train_dates.insert(pair[0].clone());
        let test_dates: HashSet<String> = std::iter::once(pair[1].clone()).collect();

        info!(day = %pair[1], "predicting day");
        let (train, test) =
            chronological_split(table, features, target, &train_dates, &test_dates)?;
        if test.is_empty() {
            continue;
        }

        let model = FireModel::fit(&train)?;
        let scores = model.evaluate(&test)?;
        info!(
            day = %pair[1],
            accuracy = scores.accuracy,
            precision = scores.precision,
            recall = scores.recall,
            f1 = scores.f1,
            "day evaluated"
        );
        results.push((pair[1].clone(), scores));
    }
    Ok(results)
}
