//! Closed-form ordinary least squares over a single pass of the data.

use super::EstimateError;

/// Fewest points a line fit will accept.
pub const MIN_FIT_POINTS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub n: usize,
    pub mean_y: f64,
}

/// Fits `y = slope * x + intercept`.
///
/// `slope = (nΣxy − ΣxΣy) / (nΣx² − (Σx)²)`. Fewer than `MIN_FIT_POINTS`
/// points, or x values that are (numerically) all the same, are rejected.
pub fn linear_fit<I>(points: I) -> Result<LinearFit, EstimateError>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (mut n, mut sx, mut sy, mut sxy, mut sxx, mut syy) = (0usize, 0.0, 0.0, 0.0, 0.0, 0.0);
    for (x, y) in points {
        n += 1;
        sx += x;
        sy += y;
        sxy += x * y;
        sxx += x * x;
        syy += y * y;
    }
    if n < MIN_FIT_POINTS {
        return Err(EstimateError::InsufficientData {
            needed: MIN_FIT_POINTS,
            got: n,
        });
    }

    let nf = n as f64;
    let denom_x = nf * sxx - sx * sx;
    // Relative guard: cancellation leaves a tiny residue when all x are equal
    if denom_x <= 1e-12 * nf * sxx || denom_x <= f64::MIN_POSITIVE {
        return Err(EstimateError::DegenerateFit);
    }

    let num = nf * sxy - sx * sy;
    let slope = num / denom_x;
    let intercept = (sy - slope * sx) / nf;

    let denom_y = nf * syy - sy * sy;
    let r_squared = if denom_y <= 1e-12 * nf * syy {
        1.0 // Constant y: the horizontal line is exact
    } else {
        (num * num) / (denom_x * denom_y)
    };

    Ok(LinearFit {
        slope,
        intercept,
        r_squared,
        n,
        mean_y: sy / nf,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let fit = linear_fit((0..10).map(|i| (i as f64, 3.0 * i as f64 - 2.0))).unwrap();
        assert!((fit.slope - 3.0).abs() < 1e-12);
        assert!((fit.intercept + 2.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert_eq!(fit.n, 10);
    }

    #[test]
    fn test_too_few_points() {
        let err = linear_fit((0..4).map(|i| (i as f64, i as f64))).unwrap_err();
        assert_eq!(err, EstimateError::InsufficientData { needed: 5, got: 4 });
    }

    #[test]
    fn test_vertical_data_is_degenerate() {
        let err = linear_fit((0..8).map(|i| (2.5, i as f64))).unwrap_err();
        assert_eq!(err, EstimateError::DegenerateFit);
    }

    #[test]
    fn test_noisy_fit_quality_below_one() {
        let noise = [0.3, -0.2, 0.1, -0.4, 0.2, 0.0, -0.1, 0.3];
        let fit = linear_fit(noise.iter().enumerate().map(|(i, e)| (i as f64, i as f64 + e))).unwrap();
        assert!(fit.r_squared < 1.0 && fit.r_squared > 0.9);
    }
}
