use thiserror::Error;

/// Added to the range so a constant column maps to all zeros instead of NaN.
pub const RANGE_EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum NormalizationError {
    #[error("Cannot normalize an empty column")]
    Empty,

    #[error("Non-numeric value {value} at index {index}")]
    NonFinite { index: usize, value: f64 },
}

/// Min-max rescale `values` onto `[0, 1]`, optionally compressing with
/// `ln(1 + v)` first.
///
/// A constant column has zero range and normalizes to all zeros.
pub fn normalize(values: &[f64], log_scale: bool) -> Result<Vec<f64>, NormalizationError> {
    if values.is_empty() {
        return Err(NormalizationError::Empty);
    }

    let transformed: Vec<f64> = if log_scale {
        values.iter().map(|v| v.ln_1p()).collect()
    } else {
        values.to_vec()
    };

    if let Some(index) = transformed.iter().position(|v| !v.is_finite()) {
        return Err(NormalizationError::NonFinite {
            index,
            value: values[index],
        });
    }

    let min = transformed.iter().copied().fold(f64::INFINITY, f64::min);
    let max = transformed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let ptp = max - min;

    Ok(transformed
        .into_iter()
        .map(|v| (v - min) / (ptp + RANGE_EPSILON))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-6;

    #[test]
    fn test_minmax_bounds() {
        let out = normalize(&[3.0, 7.0, 5.0, 11.0], false).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out[0].abs() < TOL);
        assert!((out[3] - 1.0).abs() < TOL);
        assert!((out[1] - 0.5).abs() < TOL);
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_constant_column_is_zero() {
        let out = normalize(&[4.2, 4.2, 4.2], false).unwrap();
        assert_eq!(out, vec![0.0, 0.0, 0.0]);

        let out = normalize(&[9.0], true).unwrap();
        assert_eq!(out, vec![0.0]);
    }

    #[test]
    fn test_log_scale_compresses() {
        let out = normalize(&[0.0, 9.0, 99.0], true).unwrap();
        // ln(10) / ln(100) == 0.5
        assert!(out[0].abs() < TOL);
        assert!((out[1] - 0.5).abs() < TOL);
        assert!((out[2] - 1.0).abs() < TOL);
    }

    #[test]
    fn test_empty_column_fails() {
        assert_eq!(normalize(&[], false), Err(NormalizationError::Empty));
    }

    #[test]
    fn test_non_finite_fails() {
        let err = normalize(&[1.0, f64::NAN, 2.0], false).unwrap_err();
        assert!(matches!(err, NormalizationError::NonFinite { index: 1, .. }));

        let err = normalize(&[1.0, -2.0], true).unwrap_err();
        assert!(matches!(err, NormalizationError::NonFinite { index: 1, .. }));
    }
}
