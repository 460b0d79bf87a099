//! Rank a folder of photos by a blended quality score, drop near-duplicates,
//! judge the ranking without labels, and search for better blend weights.

pub mod config;
pub mod evaluation;
pub mod features;
pub mod io;
pub mod ranking;
pub mod record;
pub mod search;

pub use config::{Config, ConfigError};
pub use evaluation::{Evaluation, EvaluationError, Evaluator, ProxyEvaluator, ProxyMetric, ProxyMetrics};
pub use features::{Annotations, CompositeExtractor, ExtractionError, Extractor, TechnicalExtractor, extract_batch};
pub use ranking::{Deduplicator, FusionError, FusionScorer, HashError, NormalizationError, PerceptualHasher, normalize, rank};
pub use record::{Feature, FeatureRecord, RawFeatures, WeightVector};
pub use search::{CandidateGrid, SearchOutcome, WeightSearch};
