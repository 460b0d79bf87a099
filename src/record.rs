use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The five inputs a [`WeightVector`] can weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Aesthetic,
    Sharpness,
    Exposure,
    Contrast,
    Faces,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::Aesthetic,
        Feature::Sharpness,
        Feature::Exposure,
        Feature::Contrast,
        Feature::Faces,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Aesthetic => "aesthetic",
            Feature::Sharpness => "sharpness",
            Feature::Exposure => "exposure",
            Feature::Contrast => "contrast",
            Feature::Faces => "faces",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-feature coefficients for the linear blend.
///
/// Deserializing treats an absent feature as weight `0`; `Default` gives the
/// stock ranking weights instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    #[serde(default)]
    pub aesthetic: f64,
    #[serde(default)]
    pub sharpness: f64,
    #[serde(default)]
    pub exposure: f64,
    #[serde(default)]
    pub contrast: f64,
    #[serde(default)]
    pub faces: f64,
}

impl Default for WeightVector {
    fn default() -> Self {
        Self {
            aesthetic: 0.35,
            sharpness: 0.35,
            exposure: 0.2,
            contrast: 0.1,
            faces: 0.05,
        }
    }
}

impl WeightVector {
    pub fn zero() -> Self {
        Self {
            aesthetic: 0.0,
            sharpness: 0.0,
            exposure: 0.0,
            contrast: 0.0,
            faces: 0.0,
        }
    }

    /// Build from `(feature, weight)` pairs; features not mentioned weigh `0`.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Feature, f64)>,
    {
        let mut weights = Self::zero();
        for (feature, value) in pairs {
            weights.set(feature, value);
        }
        weights
    }

    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Aesthetic => self.aesthetic,
            Feature::Sharpness => self.sharpness,
            Feature::Exposure => self.exposure,
            Feature::Contrast => self.contrast,
            Feature::Faces => self.faces,
        }
    }

    pub fn set(&mut self, feature: Feature, value: f64) {
        match feature {
            Feature::Aesthetic => self.aesthetic = value,
            Feature::Sharpness => self.sharpness = value,
            Feature::Exposure => self.exposure = value,
            Feature::Contrast => self.contrast = value,
            Feature::Faces => self.faces = value,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        Feature::ALL.into_iter().map(move |f| (f, self.get(f)))
    }

    pub fn sum(&self) -> f64 {
        self.iter().map(|(_, w)| w).sum()
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(feature, w)| format!("{}={:.2}", feature, w))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Raw measurements produced by an extractor for one image.
///
/// Every field is optional so partial extractors (pixel statistics on one side,
/// externally scored aesthetics on the other) can be merged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawFeatures {
    pub aesthetic: Option<f64>,
    pub sharpness: Option<f64>,
    pub exposure: Option<f64>,
    pub contrast: Option<f64>,
    pub faces: Option<u32>,
}

impl RawFeatures {
    /// Overlay `other` on `self`; values present in `other` win.
    pub fn merge(self, other: RawFeatures) -> RawFeatures {
        RawFeatures {
            aesthetic: other.aesthetic.or(self.aesthetic),
            sharpness: other.sharpness.or(self.sharpness),
            exposure: other.exposure.or(self.exposure),
            contrast: other.contrast.or(self.contrast),
            faces: other.faces.or(self.faces),
        }
    }
}

/// One image flowing through the ranking pipeline.
///
/// Raw fields come from extraction (or are absent when the record was read
/// back from a ranking CSV); the `*_norm`, `face_present` and `final_score`
/// fields are filled in by fusion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    pub path: String,
    pub file: String,
    pub aesthetic: Option<f64>,
    pub sharpness: Option<f64>,
    pub exposure: Option<f64>,
    pub contrast: Option<f64>,
    pub faces: Option<u32>,
    pub sharpness_norm: Option<f64>,
    pub exposure_norm: Option<f64>,
    pub contrast_norm: Option<f64>,
    pub face_present: Option<u8>,
    pub final_score: Option<f64>,
}

impl FeatureRecord {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let file = Path::new(&path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        Self {
            path,
            file,
            ..Default::default()
        }
    }

    pub fn from_features(path: &Path, raw: RawFeatures) -> Self {
        Self {
            aesthetic: raw.aesthetic,
            sharpness: raw.sharpness,
            exposure: raw.exposure,
            contrast: raw.contrast,
            faces: raw.faces,
            ..Self::new(path.to_string_lossy().into_owned())
        }
    }
}
