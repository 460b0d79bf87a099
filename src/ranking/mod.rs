//! Scoring and filtering of a feature batch: per-column min-max
//! normalization, weighted fusion into `final_score`, the stable ranking
//! sort, and greedy perceptual-hash deduplication.

pub mod dedup;
pub mod fusion;
pub mod normalize;

pub use dedup::{Deduplicator, Fingerprint, Fingerprinter, HashError, PerceptualHasher};
pub use fusion::{FusionError, FusionScorer, rank};
pub use normalize::{NormalizationError, normalize};
