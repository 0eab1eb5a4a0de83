//! Evaluation arithmetic: summary statistics and binary classification
//! scores computed from label vectors. Degenerate input (empty vectors, a
//! single class) scores 0.0 rather than NaN.

use serde::Serialize;

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Computes the population standard deviation given a pre-computed mean.
/// Returns 0.0 for empty input.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

fn confusion(truth: &[u32], pred: &[u32]) -> (f64, f64, f64, f64) {
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut fn_ = 0.0;
    let mut tn = 0.0;
    for (&t, &p) in truth.iter().zip(pred) {
        match (t, p) {
            (1, 1) => tp += 1.0,
            (0, 1) => fp += 1.0,
            (1, 0) => fn_ += 1.0,
            _ => tn += 1.0,
        }
    }
    (tp, fp, fn_, tn)
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn accuracy(truth: &[u32], pred: &[u32]) -> f64 {
    let (tp, fp, fn_, tn) = confusion(truth, pred);
    safe_div(tp + tn, tp + fp + fn_ + tn)
}

pub fn precision(truth: &[u32], pred: &[u32]) -> f64 {
    let (tp, fp, _, _) = confusion(truth, pred);
    safe_div(tp, tp + fp)
}

pub fn recall(truth: &[u32], pred: &[u32]) -> f64 {
    let (tp, _, fn_, _) = confusion(truth, pred);
    safe_div(tp, tp + fn_)
}

pub fn f1(truth: &[u32], pred: &[u32]) -> f64 {
    let p = precision(truth, pred);
    let r = recall(truth, pred);
    safe_div(2.0 * p * r, p + r)
}

/// Rank-based ROC-AUC over prediction scores, with tied scores receiving
/// their average rank. 0.0 when either class is absent.
pub fn roc_auc(truth: &[u32], scores: &[f64]) -> f64 {
    let positives = truth.iter().filter(|&&t| t == 1).count() as f64;
    let negatives = truth.len() as f64 - positives;
    if positives == 0.0 || negatives == 0.0 {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..truth.len()).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; truth.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j + 2) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = truth
        .iter()
        .zip(&ranks)
        .filter(|&(&t, _)| t == 1)
        .map(|(_, r)| *r)
        .sum();
    (positive_rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives)
}

/// The score set the evaluation reports.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Scores {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
}

pub fn score_predictions(truth: &[u32], pred: &[u32]) -> Scores {
    let as_scores: Vec<f64> = pred.iter().map(|&p| p as f64).collect();
    Scores {
        accuracy: accuracy(truth, pred),
        precision: precision(truth, pred),
        recall: recall(truth, pred),
        f1: f1(truth, pred),
        roc_auc: roc_auc(truth, &as_scores),
    }
}

/// Field-wise mean over a set of fold scores.
pub fn mean_scores(folds: &[Scores]) -> Scores {
    let collect = |f: fn(&Scores) -> f64| mean(&folds.iter().map(f).collect::<Vec<_>>());
    Scores {
        accuracy: collect(|s| s.accuracy),
        precision: collect(|s| s.precision),
        recall: collect(|s| s.recall),
        f1: collect(|s| s.f1),
        roc_auc: collect(|s| s.roc_auc),
    }
}
