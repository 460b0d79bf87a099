use crate::ranking::normalize::{NormalizationError, normalize};
use crate::record::{Feature, FeatureRecord, WeightVector};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FusionError {
    #[error("Cannot fuse an empty batch")]
    EmptyBatch,

    #[error("Record {path} is missing raw feature '{feature}'")]
    MissingFeature { path: String, feature: Feature },

    #[error("Failed to normalize '{feature}': {source}")]
    Normalization {
        feature: Feature,
        #[source]
        source: NormalizationError,
    },
}

/// Technical columns that are min-max normalized across the batch, and
/// whether each is log-compressed first.
const NORMALIZED_COLUMNS: [(Feature, bool); 3] = [
    (Feature::Sharpness, true),
    (Feature::Exposure, false),
    (Feature::Contrast, false),
];

/// Blends normalized technical features and the aesthetic score into one
/// `final_score` per record.
#[derive(Debug, Clone, Default)]
pub struct FusionScorer {
    weights: WeightVector,
}

impl FusionScorer {
    pub fn new(weights: WeightVector) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &WeightVector {
        &self.weights
    }

    /// Normalize every technical column across `records`, derive
    /// `face_present`, and write `final_score` in place.
    ///
    /// The whole batch is validated before any record is touched.
    pub fn fuse(&self, records: &mut [FeatureRecord]) -> Result<(), FusionError> {
        if records.is_empty() {
            return Err(FusionError::EmptyBatch);
        }

        let mut normalized = Vec::with_capacity(NORMALIZED_COLUMNS.len());
        for (feature, log_scale) in NORMALIZED_COLUMNS {
            let column = raw_column(records, feature)?;
            let normed = normalize(&column, log_scale)
                .map_err(|source| FusionError::Normalization { feature, source })?;
            normalized.push((feature, normed));
        }

        let faces: Vec<u32> = records
            .iter()
            .map(|r| {
                r.faces.ok_or_else(|| FusionError::MissingFeature {
                    path: r.path.clone(),
                    feature: Feature::Faces,
                })
            })
            .collect::<Result<_, _>>()?;

        for (feature, normed) in normalized {
            for (record, value) in records.iter_mut().zip(normed) {
                match feature {
                    Feature::Sharpness => record.sharpness_norm = Some(value),
                    Feature::Exposure => record.exposure_norm = Some(value),
                    Feature::Contrast => record.contrast_norm = Some(value),
                    Feature::Aesthetic | Feature::Faces => {}
                }
            }
        }

        for (record, count) in records.iter_mut().zip(faces) {
            record.face_present = Some(u8::from(count > 0));
            record.final_score = Some(self.score(record));
        }

        info!(images = records.len(), weights = %self.weights, "Feature fusion completed");
        Ok(())
    }

    /// Weighted sum over whatever derived fields `record` carries; absent
    /// fields contribute zero.
    pub fn score(&self, record: &FeatureRecord) -> f64 {
        let w = &self.weights;
        w.aesthetic * record.aesthetic.unwrap_or(0.0)
            + w.sharpness * record.sharpness_norm.unwrap_or(0.0)
            + w.exposure * record.exposure_norm.unwrap_or(0.0)
            + w.contrast * record.contrast_norm.unwrap_or(0.0)
            + w.faces * record.face_present.map(f64::from).unwrap_or(0.0)
    }
}

fn raw_column(records: &[FeatureRecord], feature: Feature) -> Result<Vec<f64>, FusionError> {
    records
        .iter()
        .map(|r| {
            let value = match feature {
                Feature::Sharpness => r.sharpness,
                Feature::Exposure => r.exposure,
                Feature::Contrast => r.contrast,
                Feature::Aesthetic => r.aesthetic,
                Feature::Faces => r.faces.map(f64::from),
            };
            value.ok_or_else(|| FusionError::MissingFeature {
                path: r.path.clone(),
                feature,
            })
        })
        .collect()
}

/// Order records by `final_score`, best first.
///
/// The sort is stable: equal scores keep their batch order. Unscored
/// records sink to the bottom.
pub fn rank(mut records: Vec<FeatureRecord>) -> Vec<FeatureRecord> {
    let key = |r: &FeatureRecord| r.final_score.unwrap_or(f64::NEG_INFINITY);
    records.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
    debug!(images = records.len(), "Ranked batch");
    records
}
