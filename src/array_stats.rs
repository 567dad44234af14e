//! NaN-skipping array statistics used by noise estimates and sigma clipping

use crate::sorted_array::SortedArray;

use ndarray::ArrayView1;
use ndarray_stats::QuantileExt;
use std::ops::Range;

/// Scale factor converting the median absolute deviation into a Gaussian standard deviation
pub const MAD_TO_SIGMA: f64 = 1.4826;

pub fn median(x: &[f64]) -> f64 {
    SortedArray::from(x).median()
}

/// Median absolute deviation from the median, not scaled
pub fn mad(x: &[f64]) -> f64 {
    let med = median(x);
    let deviations: Vec<_> = x.iter().map(|&v| f64::abs(v - med)).collect();
    median(&deviations)
}

/// Robust standard deviation estimate, `1.4826 * MAD`
pub fn robust_sigma(x: &[f64]) -> f64 {
    MAD_TO_SIGMA * mad(x)
}

pub fn mean(x: &[f64]) -> f64 {
    let (sum, count) = x
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), &v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Population (biased) standard deviation
pub fn std(x: &[f64]) -> f64 {
    let mu = mean(x);
    if mu.is_nan() {
        return f64::NAN;
    }
    let (sum, count) = x
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), &v| {
            (sum + (v - mu).powi(2), count + 1)
        });
    f64::sqrt(sum / count as f64)
}

/// Index of the first minimum, NaN values are skipped
pub fn nanargmin(x: ArrayView1<f64>) -> Option<usize> {
    x.argmin_skipnan().ok()
}

/// Compute the weighted mean of an array, NaN values and their weights are skipped
pub fn weighted_mean(values: ArrayView1<f64>, weights: ArrayView1<f64>) -> Option<f64> {
    if values.is_empty() || values.len() != weights.len() {
        return None;
    }

    let (sum, weight_sum) = values
        .iter()
        .zip(weights.iter())
        .filter(|(v, _)| !v.is_nan())
        .fold((0.0, 0.0), |(sum, weight_sum), (&v, &w)| {
            (sum + v * w, weight_sum + w)
        });

    if weight_sum == 0.0 {
        None
    } else {
        Some(sum / weight_sum)
    }
}

/// Consecutive index ranges of length `size`, the last one may be shorter
pub fn chunks(len: usize, size: usize) -> impl Iterator<Item = Range<usize>> {
    assert!(size > 0, "chunk size must be positive");
    (0..len)
        .step_by(size)
        .map(move |start| start..usize::min(start + size, len))
}

/// Median of the standard deviations of consecutive chunks, a white-noise estimate insensitive
/// to slow trends
pub fn median_chunk_std(x: &[f64], size: usize) -> f64 {
    let stds: Vec<_> = chunks(x.len(), size).map(|r| std(&x[r])).collect();
    median(&stds)
}
