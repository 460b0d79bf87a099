//! Label-free assessment of a ranked batch plus the visual artifacts the
//! `evaluate` command writes.

pub mod proxy;
pub mod report;

pub use proxy::{Evaluation, EvaluationError, Evaluator, ProxyEvaluator, ProxyMetric, ProxyMetrics};
pub use report::{Histogram, ReportError, export_top_k, plot_score_distribution};
