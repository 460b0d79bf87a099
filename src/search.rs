use crate::evaluation::{Evaluator, ProxyMetric};
use crate::features::{Extractor, extract_batch};
use crate::ranking::{FusionScorer, rank};
use crate::record::{Feature, FeatureRecord, WeightVector};
use itertools::Itertools;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// How far a candidate's weights may sum from `1.0` and still be searched.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Candidate values per feature. Dimensions keep the order they were given
/// in, which fixes the Cartesian product order and so the tie winner.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGrid(Vec<(Feature, Vec<f64>)>);

impl Default for CandidateGrid {
    fn default() -> Self {
        Self::from_ranges([
            (Feature::Aesthetic, vec![0.35, 0.4, 0.45]),
            (Feature::Sharpness, vec![0.25, 0.3, 0.35]),
            (Feature::Exposure, vec![0.15, 0.2]),
            (Feature::Contrast, vec![0.05, 0.1]),
            (Feature::Faces, vec![0.0, 0.05]),
        ])
    }
}

impl CandidateGrid {
    /// A repeated feature replaces the earlier values but keeps its position.
    pub fn from_ranges<I>(ranges: I) -> Self
    where
        I: IntoIterator<Item = (Feature, Vec<f64>)>,
    {
        let mut grid = Self(Vec::new());
        for (feature, values) in ranges {
            grid.insert(feature, values);
        }
        grid
    }

    fn insert(&mut self, feature: Feature, values: Vec<f64>) {
        match self.0.iter_mut().find(|(f, _)| *f == feature) {
            Some((_, existing)) => *existing = values,
            None => self.0.push((feature, values)),
        }
    }

    pub fn ranges(&self) -> impl Iterator<Item = (Feature, &[f64])> {
        self.0.iter().map(|(f, values)| (*f, values.as_slice()))
    }

    /// Every combination in the Cartesian product whose values sum to `1.0`.
    /// Features without a range weigh `0`.
    pub fn combinations(&self) -> Vec<WeightVector> {
        if self.0.is_empty() {
            return Vec::new();
        }
        let features: Vec<Feature> = self.0.iter().map(|(f, _)| *f).collect();

        self.0
            .iter()
            .map(|(_, values)| values.iter().copied())
            .multi_cartesian_product()
            .filter(|values| (values.iter().sum::<f64>() - 1.0).abs() < WEIGHT_SUM_TOLERANCE)
            .map(|values| WeightVector::from_pairs(features.iter().copied().zip(values)))
            .collect()
    }
}

impl Serialize for CandidateGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (feature, values) in &self.0 {
            map.serialize_entry(feature, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CandidateGrid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GridVisitor;

        impl<'de> Visitor<'de> for GridVisitor {
            type Value = CandidateGrid;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of feature name to candidate weights")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut grid = CandidateGrid(Vec::new());
                while let Some((feature, values)) = access.next_entry::<Feature, Vec<f64>>()? {
                    if grid.0.iter().any(|(f, _)| *f == feature) {
                        return Err(de::Error::custom(format!("duplicate feature '{}'", feature)));
                    }
                    grid.0.push((feature, values));
                }
                Ok(grid)
            }
        }

        deserializer.deserialize_map(GridVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub metric: ProxyMetric,
    /// `None` when no candidate produced a usable metric.
    pub best_weights: Option<WeightVector>,
    pub best_metric_value: f64,
    pub evaluated: usize,
    pub skipped: usize,
}

/// Exhaustive search of a [`CandidateGrid`] for the weights that maximize a
/// proxy metric.
pub struct WeightSearch<'a, V: Evaluator> {
    grid: &'a CandidateGrid,
    metric: ProxyMetric,
    evaluator: &'a V,
}

impl<'a, V: Evaluator> WeightSearch<'a, V> {
    pub fn new(grid: &'a CandidateGrid, metric: ProxyMetric, evaluator: &'a V) -> Self {
        Self {
            grid,
            metric,
            evaluator,
        }
    }

    /// Extract `image_paths` once, then score every candidate against the
    /// cached features.
    pub fn search<E: Extractor>(&self, image_paths: &[PathBuf], extractor: &E) -> SearchOutcome {
        let records = extract_batch(image_paths, extractor);
        self.search_records(&records)
    }

    /// Replay fusion and evaluation for each candidate over `records`.
    ///
    /// Ties keep the earliest candidate. A candidate whose fusion fails or
    /// whose evaluation is unavailable is skipped.
    pub fn search_records(&self, records: &[FeatureRecord]) -> SearchOutcome {
        let candidates = self.grid.combinations();
        info!("Total weight combinations to evaluate: {}", candidates.len());

        let mut best_weights = None;
        let mut best_metric_value = f64::NEG_INFINITY;
        let mut evaluated = 0;
        let mut skipped = 0;

        for weights in candidates {
            let mut batch = records.to_vec();
            if let Err(e) = FusionScorer::new(weights).fuse(&mut batch) {
                warn!("Failed evaluating weights {}: {}", weights, e);
                skipped += 1;
                continue;
            }
            let ranked = rank(batch);

            let value = match self.evaluator.evaluate(&ranked).metric(self.metric) {
                Some(value) => value,
                None => {
                    warn!("No {} for weights {}", self.metric, weights);
                    skipped += 1;
                    continue;
                }
            };
            evaluated += 1;
            debug!("{} -> {}={:.4}", weights, self.metric, value);

            if value > best_metric_value {
                best_metric_value = value;
                best_weights = Some(weights);
            }
        }

        match &best_weights {
            Some(w) => info!("Best weights: {} -> {}={:.4}", w, self.metric, best_metric_value),
            None => warn!("No candidate produced a usable {}", self.metric),
        }

        SearchOutcome {
            metric: self.metric,
            best_weights,
            best_metric_value,
            evaluated,
            skipped,
        }
    }
}
