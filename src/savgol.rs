//! Savitzky-Golay smoothing
//!
//! Every output point is the value of a least-squares polynomial fitted to the window centred on
//! it. The first and last half-windows are taken from the polynomials fitted to the first and
//! the last full windows, which is what `scipy.signal.savgol_filter` does in its `interp` mode.

use crate::array_stats::median;

use nalgebra::DMatrix;

/// Window of the quadratic filter used on long-cadence (thirty-minute) light curves
pub const LONG_CADENCE_WINDOW: usize = 49;
/// Window of the quadratic filter used on short-cadence (one-minute) light curves
pub const SHORT_CADENCE_WINDOW: usize = 1471;

const POLY_ORDER: usize = 2;

/// Hat matrix `V (VᵀV)⁻¹ Vᵀ` of polynomial least squares over `window` equidistant points
///
/// Row `i` gives the weights producing the fitted value at the `i`-th window position.
fn hat_matrix(window: usize, order: usize) -> Option<DMatrix<f64>> {
    let half = (window / 2) as f64;
    // Scale abscissa to [-1, 1] to keep the normal matrix well-conditioned
    let vandermonde = DMatrix::from_fn(window, order + 1, |i, j| {
        ((i as f64 - half) / half.max(1.0)).powi(j as i32)
    });
    let normal = vandermonde.transpose() * &vandermonde;
    let normal_inv = normal.try_inverse()?;
    Some(&vandermonde * normal_inv * vandermonde.transpose())
}

/// Quadratic Savitzky-Golay smoothing of `y` with an odd `window`
///
/// Returns `None` when the series is shorter than the window.
pub fn savgol_filter(y: &[f64], window: usize) -> Option<Vec<f64>> {
    assert_eq!(window % 2, 1, "Savitzky-Golay window must be odd");
    let n = y.len();
    if n < window || window <= POLY_ORDER {
        return None;
    }
    let hat = hat_matrix(window, POLY_ORDER)?;
    let half = window / 2;
    let centre = hat.row(half);

    let mut smoothed = vec![0.0; n];
    for (i, value) in smoothed.iter_mut().enumerate().take(n - half).skip(half) {
        *value = centre
            .iter()
            .zip(&y[i - half..=i + half])
            .map(|(w, v)| w * v)
            .sum();
    }
    for i in 0..half {
        smoothed[i] = hat.row(i).iter().zip(&y[..window]).map(|(w, v)| w * v).sum();
    }
    for i in (n - half)..n {
        let row = hat.row(i + window - n);
        smoothed[i] = row.iter().zip(&y[n - window..]).map(|(w, v)| w * v).sum();
    }
    Some(smoothed)
}

/// High-pass "flatten": subtract the smoothed trend and restore the median level
///
/// Series shorter than the window are returned unchanged.
pub fn flatten(y: &[f64], window: usize) -> Vec<f64> {
    match savgol_filter(y, window) {
        Some(smoothed) => {
            let med = median(y);
            y.iter()
                .zip(smoothed)
                .map(|(&value, trend)| value - trend + med)
                .collect()
        }
        None => y.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn quadratic_is_preserved() {
        let y: Vec<_> = (0..60)
            .map(|i| {
                let x = i as f64;
                1.0 + 0.3 * x - 0.02 * x * x
            })
            .collect();
        let smoothed = savgol_filter(&y, 11).unwrap();
        assert_abs_diff_eq!(&smoothed[..], &y[..], epsilon = 1e-9);
    }

    #[test]
    fn centre_weights_match_tabulated() {
        // savgol_coeffs(5, 2) = [-3, 12, 17, 12, -3] / 35
        let hat = hat_matrix(5, 2).unwrap();
        let desired = [-3.0 / 35.0, 12.0 / 35.0, 17.0 / 35.0, 12.0 / 35.0, -3.0 / 35.0];
        let actual: Vec<_> = hat.row(2).iter().copied().collect();
        assert_abs_diff_eq!(&actual[..], &desired[..], epsilon = 1e-12);
    }

    #[test]
    fn flatten_removes_trend() {
        let y: Vec<_> = (0..200).map(|i| 10.0 + 0.01 * i as f64).collect();
        let flat = flatten(&y, 49);
        let med = median(&y);
        for value in flat {
            assert_abs_diff_eq!(value, med, epsilon = 1e-9);
        }
    }

    #[test]
    fn short_series_is_kept() {
        let y = vec![1.0, 5.0, 2.0];
        assert_eq!(flatten(&y, 49), y);
    }
}
