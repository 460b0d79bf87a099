use crate::evaluation::ProxyMetric;
use crate::ranking::dedup::DEFAULT_THRESHOLD;
use crate::record::WeightVector;
use crate::search::CandidateGrid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid {field}: {value} (must be finite and non-negative)")]
    InvalidValue { field: String, value: f64 },

    #[error("At least one image extension is required")]
    NoExtensions,
}

/// Settings for one run, built once at startup and passed down by reference.
///
/// Keys missing from a config file fall back to [`Config::default`]; inside
/// `weights`, a missing feature weighs `0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub weights: WeightVector,
    pub dedup_threshold: u32,
    pub metric: ProxyMetric,
    pub search_grid: CandidateGrid,
    pub csv_dir: PathBuf,
    pub topk_dir: PathBuf,
    pub plot_dir: PathBuf,
    pub extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weights: WeightVector::default(),
            dedup_threshold: DEFAULT_THRESHOLD,
            metric: ProxyMetric::default(),
            search_grid: CandidateGrid::default(),
            csv_dir: PathBuf::from("output/csvs"),
            topk_dir: PathBuf::from("output/topk_images"),
            plot_dir: PathBuf::from("results"),
            extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (feature, value) in self.weights.iter() {
            check_non_negative(format!("weight '{}'", feature), value)?;
        }
        for (feature, values) in self.search_grid.ranges() {
            for &value in values {
                check_non_negative(format!("search_grid value for '{}'", feature), value)?;
            }
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        Ok(())
    }
}

fn check_non_negative(field: String, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue { field, value })
    }
}
