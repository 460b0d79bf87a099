use crate::record::FeatureRecord;
use image::{ImageBuffer, ImageReader, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const HISTOGRAM_BINS: usize = 20;

const PLOT_WIDTH: u32 = 600;
const PLOT_HEIGHT: u32 = 400;
const MARGIN: u32 = 40;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const BAR_FILL: Rgb<u8> = Rgb([135, 206, 235]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("No scored records to plot")]
    NoScores,

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Equal-width bin counts over `[lo, hi]`. A single distinct value is
/// centred in a unit-wide range.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub lo: f64,
    pub hi: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn new(values: &[f64], bins: usize) -> Option<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() || bins == 0 {
            return None;
        }
        let mut lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let mut hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }

        let mut counts = vec![0usize; bins];
        for v in finite {
            let idx = (((v - lo) / (hi - lo)) * bins as f64).floor() as usize;
            counts[idx.min(bins - 1)] += 1;
        }
        Some(Self { lo, hi, counts })
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Render a histogram of `final_score` as a PNG bar chart.
pub fn plot_score_distribution(records: &[FeatureRecord], output_path: &Path) -> Result<(), ReportError> {
    let scores: Vec<f64> = records.iter().filter_map(|r| r.final_score).collect();
    let histogram = Histogram::new(&scores, HISTOGRAM_BINS).ok_or(ReportError::NoScores)?;

    let canvas = render_histogram(&histogram);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ReportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    canvas.save(output_path).map_err(|source| ReportError::Image {
        path: output_path.to_path_buf(),
        source,
    })?;

    info!("Score distribution saved to {}", output_path.display());
    Ok(())
}

fn render_histogram(histogram: &Histogram) -> RgbImage {
    let mut canvas: RgbImage = ImageBuffer::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, BACKGROUND);

    let plot_w = PLOT_WIDTH - 2 * MARGIN;
    let plot_h = PLOT_HEIGHT - 2 * MARGIN;
    let baseline = PLOT_HEIGHT - MARGIN;
    let bins = histogram.counts.len() as u32;
    let bar_w = plot_w / bins;
    let tallest = histogram.max_count().max(1) as f64;

    for (i, &count) in histogram.counts.iter().enumerate() {
        let height = ((count as f64 / tallest) * plot_h as f64).round() as u32;
        if height == 0 {
            continue;
        }
        let x0 = MARGIN + i as u32 * bar_w;
        let x1 = x0 + bar_w - 1;
        let y0 = baseline - height;
        for y in y0..baseline {
            for x in x0..=x1 {
                let edge = x == x0 || x == x1 || y == y0;
                canvas.put_pixel(x, y, if edge { INK } else { BAR_FILL });
            }
        }
    }

    // axes
    for x in MARGIN..(PLOT_WIDTH - MARGIN) {
        canvas.put_pixel(x, baseline, INK);
    }
    for y in MARGIN..=baseline {
        canvas.put_pixel(MARGIN - 1, y, INK);
    }
    canvas
}

/// Re-encode the first `k` images of `ranked` as RGB into `save_dir`,
/// named `NN_<file>`. Images that fail to load or save are skipped.
///
/// Returns how many images were written.
pub fn export_top_k(ranked: &[FeatureRecord], k: usize, save_dir: &Path) -> Result<usize, ReportError> {
    fs::create_dir_all(save_dir).map_err(|source| ReportError::Io {
        path: save_dir.to_path_buf(),
        source,
    })?;

    let mut written = 0;
    for (i, record) in ranked.iter().take(k).enumerate() {
        // `file` may come from an untrusted CSV; keep only its last component
        let Some(name) = Path::new(&record.file).file_name() else {
            warn!("Skipping {}: no usable file name in '{}'", record.path, record.file);
            continue;
        };
        let dest = save_dir.join(format!("{:02}_{}", i + 1, name.to_string_lossy()));
        match copy_as_rgb(Path::new(&record.path), &dest) {
            Ok(()) => written += 1,
            Err(e) => warn!("Failed to export {}: {}", record.path, e),
        }
    }

    info!("Saved top-{} images to {}", written, save_dir.display());
    Ok(written)
}

fn copy_as_rgb(src: &Path, dest: &Path) -> Result<(), ReportError> {
    let img = ImageReader::open(src)
        .map_err(|source| ReportError::Io {
            path: src.to_path_buf(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| ReportError::Io {
            path: src.to_path_buf(),
            source,
        })?
        .decode()
        .map_err(|source| ReportError::Image {
            path: src.to_path_buf(),
            source,
        })?;
    img.to_rgb8().save(dest).map_err(|source| ReportError::Image {
        path: dest.to_path_buf(),
        source,
    })
}
