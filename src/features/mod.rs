//! Per-image feature extraction.
//!
//! The ranking core only ever sees the [`Extractor`] capability: give it a
//! path, get back raw measurements. Concrete sources are combined through
//! [`CompositeExtractor`], and [`extract_batch`] runs one over a whole folder.

pub mod annotations;
pub mod technical;

pub use annotations::{Annotation, Annotations};
pub use technical::TechnicalExtractor;

use crate::record::{FeatureRecord, RawFeatures};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Image {path} has no pixels")]
    EmptyImage { path: String },

    #[error("Failed to read annotations {path}: {source}")]
    AnnotationsRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse annotations {path}: {source}")]
    AnnotationsParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid annotation for {key}: {reason}")]
    InvalidAnnotation { key: String, reason: String },
}

/// Produces raw features for one image.
pub trait Extractor: Sync {
    fn extract(&self, path: &Path) -> Result<RawFeatures, ExtractionError>;
}

/// The feature sources this crate knows how to run.
#[derive(Debug, Clone)]
pub enum FeatureSource {
    Technical(TechnicalExtractor),
    Annotations(Annotations),
}

impl Extractor for FeatureSource {
    fn extract(&self, path: &Path) -> Result<RawFeatures, ExtractionError> {
        match self {
            FeatureSource::Technical(t) => t.extract(path),
            FeatureSource::Annotations(a) => a.extract(path),
        }
    }
}

/// Runs several sources and overlays their output in order; any source
/// failing fails the image.
#[derive(Debug, Clone, Default)]
pub struct CompositeExtractor {
    sources: Vec<FeatureSource>,
}

impl CompositeExtractor {
    pub fn new(sources: Vec<FeatureSource>) -> Self {
        Self { sources }
    }

    /// Pixel statistics plus externally supplied aesthetic and face scores.
    pub fn standard(annotations: Annotations) -> Self {
        Self::new(vec![
            FeatureSource::Technical(TechnicalExtractor::new()),
            FeatureSource::Annotations(annotations),
        ])
    }
}

impl Extractor for CompositeExtractor {
    fn extract(&self, path: &Path) -> Result<RawFeatures, ExtractionError> {
        self.sources
            .iter()
            .try_fold(RawFeatures::default(), |acc, source| Ok(acc.merge(source.extract(path)?)))
    }
}

/// Extract every image in parallel.
///
/// The returned records follow `paths` order. Images whose extraction fails
/// are logged and left out; they never abort the batch.
pub fn extract_batch<E: Extractor>(paths: &[PathBuf], extractor: &E) -> Vec<FeatureRecord> {
    let progress = ProgressBar::new(paths.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{bar:40}] {pos}/{len} {msg}") {
        progress.set_style(style);
    }
    progress.set_message("Extracting features");

    let results: Vec<Result<RawFeatures, ExtractionError>> = paths
        .par_iter()
        .map(|path| {
            let result = extractor.extract(path);
            progress.inc(1);
            result
        })
        .collect();
    progress.finish_and_clear();

    let mut records = Vec::with_capacity(paths.len());
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(raw) => records.push(FeatureRecord::from_features(path, raw)),
            Err(e) => warn!("Feature extraction failed for {}: {}", path.display(), e),
        }
    }

    info!(
        requested = paths.len(),
        extracted = records.len(),
        "Feature extraction finished"
    );
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};
    use tempfile::TempDir;

    #[test]
    fn test_composite_merges_sources() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shot.png");
        ImageBuffer::from_fn(12, 12, |x, _| Luma([(x * 20) as u8])).save(&path).unwrap();

        let annotations = Annotations::from_entries([(
            "shot.png".to_string(),
            Annotation { aesthetic: Some(0.6), faces: 1 },
        )])
        .unwrap();
        let raw = CompositeExtractor::standard(annotations).extract(&path).unwrap();

        assert_eq!(raw.aesthetic, Some(0.6));
        assert_eq!(raw.faces, Some(1));
        assert!(raw.sharpness.is_some());
        assert!(raw.exposure.is_some());
        assert!(raw.contrast.is_some());
    }

    #[test]
    fn test_batch_keeps_order_and_drops_failures() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for (i, name) in ["c.png", "a.png", "broken.png", "b.png"].iter().enumerate() {
            let path = temp_dir.path().join(name);
            if *name == "broken.png" {
                std::fs::write(&path, b"nope").unwrap();
            } else {
                ImageBuffer::from_pixel(6, 6, Luma([(i * 60) as u8])).save(&path).unwrap();
            }
            paths.push(path);
        }

        let records = extract_batch(&paths, &CompositeExtractor::standard(Annotations::empty()));
        let files: Vec<&str> = records.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(files, vec!["c.png", "a.png", "b.png"]);
        assert!(records.iter().all(|r| r.faces == Some(0) && r.aesthetic.is_none()));
    }
}
