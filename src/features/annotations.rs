use crate::features::{ExtractionError, Extractor};
use crate::record::RawFeatures;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Externally computed scores for one image.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Annotation {
    pub aesthetic: Option<f64>,
    #[serde(default)]
    pub faces: u32,
}

/// Scores produced outside this crate (the learned aesthetic model, a face
/// detector), keyed by full path or by file name.
///
/// Images without an entry get no aesthetic score and zero faces.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    entries: HashMap<String, Annotation>,
}

impl Annotations {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Result<Self, ExtractionError>
    where
        I: IntoIterator<Item = (String, Annotation)>,
    {
        let entries: HashMap<String, Annotation> = entries.into_iter().collect();
        for (key, annotation) in &entries {
            if let Some(score) = annotation.aesthetic {
                if !(0.0..=1.0).contains(&score) {
                    return Err(ExtractionError::InvalidAnnotation {
                        key: key.clone(),
                        reason: format!("aesthetic {score} is outside [0, 1]"),
                    });
                }
            }
        }
        Ok(Self { entries })
    }

    /// Load a JSON object of `{ "<path or file>": { "aesthetic": f, "faces": n } }`.
    pub fn load(path: &Path) -> Result<Self, ExtractionError> {
        let shown = path.to_string_lossy().into_owned();
        let raw = fs::read_to_string(path).map_err(|source| ExtractionError::AnnotationsRead {
            path: shown.clone(),
            source,
        })?;
        let entries: HashMap<String, Annotation> =
            serde_json::from_str(&raw).map_err(|source| ExtractionError::AnnotationsParse {
                path: shown.clone(),
                source,
            })?;
        let annotations = Self::from_entries(entries)?;
        info!("Loaded {} annotations from {}", annotations.len(), shown);
        Ok(annotations)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, path: &Path) -> Option<&Annotation> {
        let full = path.to_string_lossy();
        self.entries.get(full.as_ref()).or_else(|| {
            let name = path.file_name()?.to_string_lossy();
            self.entries.get(name.as_ref())
        })
    }
}

impl Extractor for Annotations {
    fn extract(&self, path: &Path) -> Result<RawFeatures, ExtractionError> {
        let features = match self.lookup(path) {
            Some(annotation) => RawFeatures {
                aesthetic: annotation.aesthetic,
                faces: Some(annotation.faces),
                ..Default::default()
            },
            None => {
                debug!("No annotation for {}", path.display());
                RawFeatures {
                    faces: Some(0),
                    ..Default::default()
                }
            }
        };
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lookup_by_path_then_file_name() {
        let annotations = Annotations::from_entries([
            (
                "/shoot/a.jpg".to_string(),
                Annotation { aesthetic: Some(0.9), faces: 1 },
            ),
            (
                "a.jpg".to_string(),
                Annotation { aesthetic: Some(0.1), faces: 0 },
            ),
            (
                "b.jpg".to_string(),
                Annotation { aesthetic: Some(0.4), faces: 3 },
            ),
        ])
        .unwrap();

        let a = annotations.extract(Path::new("/shoot/a.jpg")).unwrap();
        assert_eq!(a.aesthetic, Some(0.9));
        let other_a = annotations.extract(Path::new("/elsewhere/a.jpg")).unwrap();
        assert_eq!(other_a.aesthetic, Some(0.1));
        let b = annotations.extract(Path::new("/shoot/b.jpg")).unwrap();
        assert_eq!(b.faces, Some(3));
    }

    #[test]
    fn test_missing_entry_has_no_aesthetic() {
        let features = Annotations::empty().extract(Path::new("/x.png")).unwrap();
        assert_eq!(features.aesthetic, None);
        assert_eq!(features.faces, Some(0));
        assert_eq!(features.sharpness, None);
    }

    #[test]
    fn test_load_json() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("scores.json");
        fs::write(&file, r#"{"a.jpg": {"aesthetic": 0.75, "faces": 2}, "b.jpg": {"aesthetic": 0.5}}"#).unwrap();

        let annotations = Annotations::load(&file).unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations.lookup(Path::new("b.jpg")).unwrap().faces, 0);
    }

    #[test]
    fn test_load_rejects_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("scores.json");

        fs::write(&file, r#"{"a.jpg": {"aesthetic": 1.5}}"#).unwrap();
        assert!(matches!(
            Annotations::load(&file),
            Err(ExtractionError::InvalidAnnotation { .. })
        ));

        fs::write(&file, "not json").unwrap();
        assert!(matches!(
            Annotations::load(&file),
            Err(ExtractionError::AnnotationsParse { .. })
        ));

        assert!(matches!(
            Annotations::load(&temp_dir.path().join("absent.json")),
            Err(ExtractionError::AnnotationsRead { .. })
        ));
    }
}
