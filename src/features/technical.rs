use crate::features::{ExtractionError, Extractor};
use crate::record::RawFeatures;
use image::{DynamicImage, GenericImageView, GrayImage, ImageReader};
use std::path::Path;

/// Width of the exposure bell curve around mid-grey.
const EXPOSURE_SIGMA: f64 = 0.18;
/// Scale at which tonal spread saturates the contrast score.
const CONTRAST_SIGMA: f64 = 0.12;

/// Pixel statistics computed on the 8-bit grayscale plane: Laplacian
/// variance for sharpness, a bell curve around mid-grey for exposure, and a
/// saturating curve over the tonal spread for contrast.
///
/// Face counting needs a detector this extractor does not carry, so `faces`
/// is left for another source to fill.
#[derive(Debug, Clone, Copy, Default)]
pub struct TechnicalExtractor;

impl TechnicalExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn measure(&self, image: &DynamicImage) -> RawFeatures {
        let gray = image.to_luma8();
        let (mean, std) = mean_and_std(&gray);

        let mean = mean / 255.0;
        let std = std / 255.0;

        RawFeatures {
            sharpness: Some(laplacian_variance(&gray)),
            exposure: Some((-(mean - 0.5).powi(2) / (2.0 * EXPOSURE_SIGMA.powi(2))).exp()),
            contrast: Some(1.0 - (-std.powi(2) / (2.0 * CONTRAST_SIGMA.powi(2))).exp()),
            ..Default::default()
        }
    }
}

impl Extractor for TechnicalExtractor {
    fn extract(&self, path: &Path) -> Result<RawFeatures, ExtractionError> {
        let display = path.to_string_lossy().into_owned();
        let img = ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|source| ExtractionError::Open {
                path: display.clone(),
                source,
            })?
            .decode()
            .map_err(|source| ExtractionError::Decode {
                path: display.clone(),
                source,
            })?;
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(ExtractionError::EmptyImage { path: display });
        }
        Ok(self.measure(&img))
    }
}

fn mean_and_std(gray: &GrayImage) -> (f64, f64) {
    let n = (gray.width() as f64) * (gray.height() as f64);
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let sum: f64 = gray.pixels().map(|p| p[0] as f64).sum();
    let mean = sum / n;
    let var = gray
        .pixels()
        .map(|p| (p[0] as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean, var.sqrt())
}

/// Variance of the 4-neighbour Laplacian over every pixel. Borders are
/// padded by reflection without repeating the edge (`dcb|abcd|cba`).
fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }

    let px = |x: i64, y: i64| {
        let x = reflect_101(x, width as i64);
        let y = reflect_101(y, height as i64);
        gray.get_pixel(x, y)[0] as f64
    };
    let mut sum = 0.0;
    let mut sum_sq = 0.0;

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let laplacian = px(x, y - 1) + px(x - 1, y) + px(x + 1, y) + px(x, y + 1) - 4.0 * px(x, y);
            sum += laplacian;
            sum_sq += laplacian * laplacian;
        }
    }

    let count = width as f64 * height as f64;
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Map an index one step outside `0..len` back inside by mirroring around
/// the edge pixel.
fn reflect_101(i: i64, len: i64) -> u32 {
    let i = if len == 1 {
        0
    } else if i < 0 {
        -i
    } else if i >= len {
        2 * len - 2 - i
    } else {
        i
    };
    i as u32
}
