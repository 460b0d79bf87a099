use crate::record::FeatureRecord;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// List the images directly inside `dir` whose extension is in `extensions`
/// (case-insensitive), sorted by path.
pub fn scan_directory(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, IoError> {
    if !dir.is_dir() {
        return Err(IoError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut images = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| IoError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() {
            if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                if extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)) {
                    images.push(path.to_path_buf());
                }
            }
        }
        spinner.tick();
    }
    spinner.finish_and_clear();

    images.sort();
    info!("Found {} images in {}", images.len(), dir.display());
    Ok(images)
}

/// Header of the ranking CSV, in column order.
pub const RANKING_COLUMNS: [&str; 8] = [
    "file",
    "path",
    "final_score",
    "aesthetic",
    "sharpness_norm",
    "exposure_norm",
    "contrast_norm",
    "face_present",
];

/// One line of the ranking CSV. Field order matches [`RANKING_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RankingRow {
    file: String,
    path: String,
    final_score: Option<f64>,
    aesthetic: Option<f64>,
    sharpness_norm: Option<f64>,
    exposure_norm: Option<f64>,
    contrast_norm: Option<f64>,
    face_present: Option<u8>,
}

impl From<&FeatureRecord> for RankingRow {
    fn from(r: &FeatureRecord) -> Self {
        Self {
            file: r.file.clone(),
            path: r.path.clone(),
            final_score: r.final_score,
            aesthetic: r.aesthetic,
            sharpness_norm: r.sharpness_norm,
            exposure_norm: r.exposure_norm,
            contrast_norm: r.contrast_norm,
            face_present: r.face_present,
        }
    }
}

impl From<RankingRow> for FeatureRecord {
    fn from(row: RankingRow) -> Self {
        Self {
            file: row.file,
            path: row.path,
            final_score: row.final_score,
            aesthetic: row.aesthetic,
            sharpness_norm: row.sharpness_norm,
            exposure_norm: row.exposure_norm,
            contrast_norm: row.contrast_norm,
            face_present: row.face_present,
            ..Default::default()
        }
    }
}

/// Write the ranking CSV; absent values become empty cells.
pub fn write_ranking_csv(path: &Path, ranked: &[FeatureRecord]) -> Result<(), IoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| IoError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let csv_err = |source: csv::Error| IoError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err)?;
    writer.write_record(RANKING_COLUMNS).map_err(csv_err)?;
    for record in ranked {
        writer.serialize(RankingRow::from(record)).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| csv_err(csv::Error::from(e)))?;

    info!("Saved ranking CSV with {} rows to {}", ranked.len(), path.display());
    Ok(())
}

/// Read a ranking CSV back, in file order. Empty cells come back as absent
/// fields; malformed numbers are an error.
pub fn read_ranking_csv(path: &Path) -> Result<Vec<FeatureRecord>, IoError> {
    let csv_err = |source: csv::Error| IoError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize::<RankingRow>()
        .map(|row| row.map(FeatureRecord::from).map_err(csv_err))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exts() -> Vec<String> {
        vec!["jpg".into(), "jpeg".into(), "png".into()]
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["b.JPG", "a.png", "notes.txt", "c.jpeg"] {
            fs::write(temp_dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(temp_dir.path().join("nested")).unwrap();
        fs::write(temp_dir.path().join("nested").join("d.jpg"), b"x").unwrap();

        let images = scan_directory(temp_dir.path(), &exts()).unwrap();
        let names: Vec<String> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "b.JPG", "c.jpeg"]);
    }

    #[test]
    fn test_scan_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.png");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            scan_directory(&file, &exts()),
            Err(IoError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_empty_ranking_still_has_header() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("empty.csv");
        write_ranking_csv(&out, &[]).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap().trim_end(), RANKING_COLUMNS.join(","));
        assert!(read_ranking_csv(&out).unwrap().is_empty());
    }

    #[test]
    fn test_csv_layout_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("csvs").join("set.csv");

        let scored = FeatureRecord {
            final_score: Some(0.765),
            aesthetic: Some(0.9),
            sharpness_norm: Some(0.8),
            exposure_norm: Some(0.5),
            contrast_norm: Some(0.2),
            face_present: Some(1),
            sharpness: Some(123.0),
            ..FeatureRecord::new("/set/a.jpg")
        };
        let partial = FeatureRecord {
            final_score: Some(0.1),
            ..FeatureRecord::new("/set/b.jpg")
        };
        write_ranking_csv(&out, &[scored, partial]).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "file,path,final_score,aesthetic,sharpness_norm,exposure_norm,contrast_norm,face_present"
        );
        assert_eq!(lines.next().unwrap(), "a.jpg,/set/a.jpg,0.765,0.9,0.8,0.5,0.2,1");
        assert_eq!(lines.next().unwrap(), "b.jpg,/set/b.jpg,0.1,,,,,");

        let back = read_ranking_csv(&out).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].final_score, Some(0.765));
        assert_eq!(back[0].face_present, Some(1));
        // raw features are not part of the CSV
        assert_eq!(back[0].sharpness, None);
        assert_eq!(back[1].aesthetic, None);
    }

    #[test]
    fn test_read_rejects_malformed_number() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("bad.csv");
        fs::write(
            &file,
            "file,path,final_score,aesthetic,sharpness_norm,exposure_norm,contrast_norm,face_present\n\
             a.jpg,/a.jpg,high,0.1,0.1,0.1,0.1,0\n",
        )
        .unwrap();
        assert!(matches!(read_ranking_csv(&file), Err(IoError::Csv { .. })));
    }
}
