use crate::record::FeatureRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Record {path} has no '{field}'")]
    MissingField { path: String, field: &'static str },

    #[error("Unknown proxy metric '{0}' (expected score_std, duplicate_fraction or sharpness_corr)")]
    UnknownMetric(String),
}

/// Unsupervised statistics usable as a ranking objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMetric {
    #[default]
    ScoreStd,
    DuplicateFraction,
    SharpnessCorr,
}

impl ProxyMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMetric::ScoreStd => "score_std",
            ProxyMetric::DuplicateFraction => "duplicate_fraction",
            ProxyMetric::SharpnessCorr => "sharpness_corr",
        }
    }
}

impl fmt::Display for ProxyMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProxyMetric {
    type Err = EvaluationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score_std" => Ok(ProxyMetric::ScoreStd),
            "duplicate_fraction" => Ok(ProxyMetric::DuplicateFraction),
            "sharpness_corr" => Ok(ProxyMetric::SharpnessCorr),
            other => Err(EvaluationError::UnknownMetric(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProxyMetrics {
    /// Population standard deviation of `final_score`. NaN for an empty batch.
    pub score_std: f64,
    /// Share of records whose `path` already appeared earlier in the batch.
    pub duplicate_fraction: f64,
    /// Pearson correlation of `sharpness_norm` against `aesthetic`. `0.0` for
    /// fewer than two records, NaN when either column is constant.
    pub sharpness_corr: f64,
}

impl ProxyMetrics {
    pub fn get(&self, metric: ProxyMetric) -> f64 {
        match metric {
            ProxyMetric::ScoreStd => self.score_std,
            ProxyMetric::DuplicateFraction => self.duplicate_fraction,
            ProxyMetric::SharpnessCorr => self.sharpness_corr,
        }
    }
}

impl fmt::Display for ProxyMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "score_std={:.4}, duplicate_fraction={:.4}, sharpness_corr={:.4}",
            self.score_std, self.duplicate_fraction, self.sharpness_corr
        )
    }
}

/// Outcome of a proxy evaluation. An unavailable evaluation is not the same
/// thing as all-zero metrics.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Metrics(ProxyMetrics),
    Unavailable(EvaluationError),
}

impl Evaluation {
    pub fn metric(&self, metric: ProxyMetric) -> Option<f64> {
        match self {
            Evaluation::Metrics(m) => Some(m.get(metric)),
            Evaluation::Unavailable(_) => None,
        }
    }

    /// Metric name to value; empty when the evaluation is unavailable.
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        match self {
            Evaluation::Metrics(m) => [
                ProxyMetric::ScoreStd,
                ProxyMetric::DuplicateFraction,
                ProxyMetric::SharpnessCorr,
            ]
            .into_iter()
            .map(|metric| (metric.as_str(), m.get(metric)))
            .collect(),
            Evaluation::Unavailable(_) => BTreeMap::new(),
        }
    }
}

/// Scores a ranked batch without ground-truth labels.
pub trait Evaluator {
    fn evaluate(&self, ranked: &[FeatureRecord]) -> Evaluation;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyEvaluator;

impl ProxyEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn compute(&self, ranked: &[FeatureRecord]) -> Result<ProxyMetrics, EvaluationError> {
        let scores = column(ranked, "final_score", |r| r.final_score)?;
        let score_std = population_std(&scores);

        let mut seen = HashSet::new();
        let duplicates = ranked.iter().filter(|r| !seen.insert(r.path.as_str())).count();
        let duplicate_fraction = duplicates as f64 / ranked.len().max(1) as f64;

        let sharpness = column(ranked, "sharpness_norm", |r| r.sharpness_norm)?;
        let aesthetic = column(ranked, "aesthetic", |r| r.aesthetic)?;
        let sharpness_corr = if ranked.len() > 1 {
            pearson(&sharpness, &aesthetic)
        } else {
            0.0
        };

        Ok(ProxyMetrics {
            score_std,
            duplicate_fraction,
            sharpness_corr,
        })
    }
}

impl Evaluator for ProxyEvaluator {
    fn evaluate(&self, ranked: &[FeatureRecord]) -> Evaluation {
        match self.compute(ranked) {
            Ok(metrics) => {
                info!("Proxy evaluation: {}", metrics);
                Evaluation::Metrics(metrics)
            }
            Err(e) => {
                warn!("Proxy evaluation unavailable: {}", e);
                Evaluation::Unavailable(e)
            }
        }
    }
}

fn column(
    records: &[FeatureRecord],
    field: &'static str,
    get: impl Fn(&FeatureRecord) -> Option<f64>,
) -> Result<Vec<f64>, EvaluationError> {
    records
        .iter()
        .map(|r| {
            get(r).ok_or_else(|| EvaluationError::MissingField {
                path: r.path.clone(),
                field,
            })
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let (mx, my) = (mean(xs), mean(ys));
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mx, y - my);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let r = cov / (var_x * var_y).sqrt();
    if r.is_finite() { r.clamp(-1.0, 1.0) } else { f64::NAN }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn scored(path: &str, score: f64, sharpness_norm: f64, aesthetic: f64) -> FeatureRecord {
        FeatureRecord {
            final_score: Some(score),
            sharpness_norm: Some(sharpness_norm),
            aesthetic: Some(aesthetic),
            ..FeatureRecord::new(path)
        }
    }

    fn metrics(evaluation: Evaluation) -> ProxyMetrics {
        match evaluation {
            Evaluation::Metrics(m) => m,
            Evaluation::Unavailable(e) => panic!("expected metrics, got {e}"),
        }
    }

    #[test]
    fn test_single_record() {
        let m = metrics(ProxyEvaluator::new().evaluate(&[scored("/a", 0.7, 0.3, 0.5)]));
        assert_eq!(m.sharpness_corr, 0.0);
        assert_eq!(m.duplicate_fraction, 0.0);
        assert_eq!(m.score_std, 0.0);
    }

    #[test]
    fn test_score_std_is_population() {
        let batch = [scored("/a", 1.0, 0.0, 0.1), scored("/b", 0.0, 1.0, 0.9)];
        let m = metrics(ProxyEvaluator::new().evaluate(&batch));
        assert!((m.score_std - 0.5).abs() < TOL);
    }

    #[test]
    fn test_duplicate_fraction_counts_repeated_paths() {
        let batch = [
            scored("/a", 0.9, 0.1, 0.2),
            scored("/b", 0.8, 0.2, 0.1),
            scored("/a", 0.7, 0.3, 0.4),
            scored("/other/a", 0.6, 0.4, 0.3),
        ];
        let m = metrics(ProxyEvaluator::new().evaluate(&batch));
        assert!((m.duplicate_fraction - 0.25).abs() < TOL);
    }

    #[test]
    fn test_sharpness_correlation() {
        let batch = [
            scored("/a", 0.9, 0.0, 0.1),
            scored("/b", 0.8, 0.5, 0.2),
            scored("/c", 0.7, 1.0, 0.3),
        ];
        let m = metrics(ProxyEvaluator::new().evaluate(&batch));
        assert!((m.sharpness_corr - 1.0).abs() < TOL);

        let batch = [scored("/a", 0.9, 0.0, 0.3), scored("/b", 0.8, 1.0, 0.1)];
        let m = metrics(ProxyEvaluator::new().evaluate(&batch));
        assert!((m.sharpness_corr + 1.0).abs() < TOL);
    }

    #[test]
    fn test_constant_column_correlation_is_nan() {
        let batch = [scored("/a", 0.9, 0.0, 0.3), scored("/b", 0.8, 0.0, 0.1)];
        let m = metrics(ProxyEvaluator::new().evaluate(&batch));
        assert!(m.sharpness_corr.is_nan());
        assert!((m.score_std - 0.05).abs() < TOL);
    }

    #[test]
    fn test_missing_field_is_unavailable() {
        let mut broken = scored("/b", 0.8, 0.2, 0.1);
        broken.sharpness_norm = None;
        let evaluation = ProxyEvaluator::new().evaluate(&[scored("/a", 0.9, 0.1, 0.2), broken]);
        assert!(matches!(
            evaluation,
            Evaluation::Unavailable(EvaluationError::MissingField { field: "sharpness_norm", .. })
        ));
        assert!(evaluation.to_map().is_empty());
        assert_eq!(evaluation.metric(ProxyMetric::ScoreStd), None);
    }

    #[test]
    fn test_empty_batch_still_reports_metrics() {
        let evaluation = ProxyEvaluator::new().evaluate(&[]);
        let Evaluation::Metrics(metrics) = &evaluation else {
            panic!("expected metrics, got {:?}", evaluation);
        };
        assert!(metrics.score_std.is_nan());
        assert_eq!(metrics.duplicate_fraction, 0.0);
        assert_eq!(metrics.sharpness_corr, 0.0);
    }

    #[test]
    fn test_metric_names() {
        let evaluation = ProxyEvaluator::new().evaluate(&[scored("/a", 0.7, 0.3, 0.5)]);
        let map = evaluation.to_map();
        assert_eq!(
            map.keys().copied().collect::<Vec<_>>(),
            vec!["duplicate_fraction", "score_std", "sharpness_corr"]
        );
        assert_eq!("sharpness_corr".parse::<ProxyMetric>(), Ok(ProxyMetric::SharpnessCorr));
        assert!("recall".parse::<ProxyMetric>().is_err());
    }
}
