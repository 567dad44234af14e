use crate::data::bundle::ObservationBundle;
use crate::data::quality::QualityFlags;
use crate::data::segments::Segments;
use crate::error::DataError;

use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::ops::Range;

/// Validated pixel light curve with per-cadence masks
///
/// Pixel values are guaranteed to be finite: non-finite values are replaced by linear
/// interpolation in time and the cadence is flagged with [QualityFlags::NAN].
#[derive(Clone, Debug)]
pub struct LightCurve {
    time: Array1<f64>,
    fpix: Array2<f64>,
    fraw: Array1<f64>,
    fraw_err: Array1<f64>,
    neighbors: Option<Array2<f64>>,
    flags: Vec<QualityFlags>,
    segments: Segments,
}

fn to_matrix(
    rows: &[Vec<f64>],
    name: &'static str,
    len: usize,
    width: Option<usize>,
) -> Result<Array2<f64>, DataError> {
    if rows.len() != len {
        return Err(DataError::LengthMismatch {
            name,
            actual: rows.len(),
            expected: len,
        });
    }
    let width = width.unwrap_or_else(|| rows.first().map_or(0, Vec::len));
    let mut matrix = Array2::zeros((len, width));
    for (index, (row, mut dest)) in rows.iter().zip(matrix.rows_mut()).enumerate() {
        if row.len() != width {
            return Err(DataError::PixelCountMismatch {
                index,
                actual: row.len(),
                expected: width,
            });
        }
        dest.assign(&ArrayView1::from(row.as_slice()));
    }
    Ok(matrix)
}

/// Replace non-finite values with linear interpolation over finite neighbours, ends are
/// extended with the nearest finite value
fn interpolate_non_finite(time: &[f64], values: &mut [f64]) -> Option<()> {
    let finite: Vec<usize> = (0..values.len())
        .filter(|&i| values[i].is_finite())
        .collect();
    let (&first, &last) = (finite.first()?, finite.last()?);
    for i in 0..first {
        values[i] = values[first];
    }
    for i in last + 1..values.len() {
        values[i] = values[last];
    }
    for (&a, &b) in finite.iter().tuple_windows() {
        for i in a + 1..b {
            let frac = (time[i] - time[a]) / (time[b] - time[a]);
            values[i] = values[a] + frac * (values[b] - values[a]);
        }
    }
    Some(())
}

/// Flag rows having a non-finite value and interpolate every column over time
fn fill_non_finite(
    matrix: &mut Array2<f64>,
    time: &[f64],
    flags: &mut [QualityFlags],
) -> Result<(), DataError> {
    for (row, flag) in matrix.rows().into_iter().zip(flags.iter_mut()) {
        if row.iter().any(|x| !x.is_finite()) {
            flag.insert(QualityFlags::NAN);
        }
    }
    for (p, mut column) in matrix.axis_iter_mut(Axis(1)).enumerate() {
        if column.iter().all(|x| x.is_finite()) {
            continue;
        }
        let mut values = column.to_vec();
        interpolate_non_finite(time, &mut values).ok_or(DataError::NoFinitePixel(p))?;
        column.assign(&Array1::from(values));
    }
    Ok(())
}

impl LightCurve {
    pub fn new(bundle: &ObservationBundle, boundary_pad: usize) -> Result<Self, DataError> {
        let len = bundle.len();
        if len == 0 {
            return Err(DataError::Empty);
        }
        for (i, (&a, &b)) in bundle.time.iter().tuple_windows().enumerate() {
            if !a.is_finite() || !b.is_finite() || b <= a {
                return Err(DataError::UnsortedTime(i + 1));
            }
        }
        if !bundle.time[0].is_finite() {
            return Err(DataError::UnsortedTime(0));
        }

        let mut fpix = to_matrix(&bundle.fpix, "fpix", len, None)?;
        let mut fpix_err = to_matrix(&bundle.fpix_err, "fpix_err", len, Some(fpix.ncols()))?;

        let mut flags = vec![QualityFlags::GOOD; len];
        if !bundle.quality.is_empty() {
            if bundle.quality.len() != len {
                return Err(DataError::LengthMismatch {
                    name: "quality",
                    actual: bundle.quality.len(),
                    expected: len,
                });
            }
            for (flag, &q) in flags.iter_mut().zip(&bundle.quality) {
                flag.set(QualityFlags::BAD, q != 0);
            }
        }

        fill_non_finite(&mut fpix, &bundle.time, &mut flags)?;
        fill_non_finite(&mut fpix_err, &bundle.time, &mut flags)?;

        let neighbors = match &bundle.neighbors {
            Some(rows) => {
                let mut neighbors = to_matrix(rows, "neighbors", len, None)?;
                fill_non_finite(&mut neighbors, &bundle.time, &mut flags)?;
                Some(neighbors)
            }
            None => None,
        };

        let fraw = fpix.sum_axis(Axis(1));
        let fraw_err = fpix_err.mapv(|x| x * x).sum_axis(Axis(1)).mapv(f64::sqrt);
        let segments = Segments::new(&bundle.breakpoints, len, boundary_pad)?;

        Ok(Self {
            time: Array1::from(bundle.time.clone()),
            fpix,
            fraw,
            fraw_err,
            neighbors,
            flags,
            segments,
        })
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn npix(&self) -> usize {
        self.fpix.ncols()
    }

    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.time.view()
    }

    /// Per-pixel fluxes, one row per cadence
    pub fn fpix(&self) -> &Array2<f64> {
        &self.fpix
    }

    /// Summed flux
    pub fn fraw(&self) -> ArrayView1<'_, f64> {
        self.fraw.view()
    }

    /// Root-sum-square of the per-pixel errors
    pub fn fraw_err(&self) -> ArrayView1<'_, f64> {
        self.fraw_err.view()
    }

    pub fn neighbors(&self) -> Option<&Array2<f64>> {
        self.neighbors.as_ref()
    }

    pub fn segments(&self) -> &Segments {
        &self.segments
    }

    pub fn flags(&self) -> &[QualityFlags] {
        &self.flags
    }

    pub fn is_masked(&self, i: usize) -> bool {
        !self.flags[i].is_good()
    }

    /// Unmasked cadences within `range`, the set regressions are fit over
    pub fn unmasked_in(&self, range: Range<usize>) -> Vec<usize> {
        range.filter(|&i| !self.is_masked(i)).collect()
    }

    pub fn unmasked(&self) -> Vec<usize> {
        self.unmasked_in(0..self.len())
    }

    pub fn indices_with(&self, flag: QualityFlags) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| self.flags[i].intersects(flag))
            .collect()
    }

    pub fn outliers(&self) -> Vec<usize> {
        self.indices_with(QualityFlags::OUTLIER)
    }

    /// Replace the outlier mask
    pub fn set_outliers(&mut self, outliers: &[usize]) {
        for flag in self.flags.iter_mut() {
            flag.remove(QualityFlags::OUTLIER);
        }
        for &i in outliers {
            self.flags[i].insert(QualityFlags::OUTLIER);
        }
    }

    /// Mask every cadence within `duration / 2` of a transit epoch `t0 + k * period`
    ///
    /// Returns the number of newly masked cadences.
    pub fn mask_transits(&mut self, t0: f64, period: f64, duration: f64) -> usize {
        let half_period = 0.5 * period;
        let mut count = 0;
        for (flag, &t) in self.flags.iter_mut().zip(self.time.iter()) {
            let phase = (t - t0 + half_period).rem_euclid(period) - half_period;
            if phase.abs() < 0.5 * duration && !flag.contains(QualityFlags::TRANSIT) {
                flag.insert(QualityFlags::TRANSIT);
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;

    fn bundle() -> ObservationBundle {
        ObservationBundle::new(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![
                vec![1.0, 2.0],
                vec![f64::NAN, 2.0],
                vec![3.0, 2.0],
                vec![4.0, 2.0],
            ],
            vec![vec![3.0, 4.0]; 4],
        )
    }

    #[test]
    fn nan_pixel_is_interpolated_and_flagged() {
        let lc = LightCurve::new(&bundle(), 0).unwrap();
        assert_eq!(lc.fpix()[[1, 0]], 2.0);
        assert_abs_diff_eq!(lc.fraw()[1], 4.0);
        assert_abs_diff_eq!(lc.fraw_err()[0], 5.0);
        assert_eq!(lc.indices_with(QualityFlags::NAN), vec![1]);
        assert_eq!(lc.unmasked(), vec![0, 2, 3]);
    }

    #[test]
    fn leading_nan_takes_nearest_value() {
        let mut values = vec![f64::NAN, f64::NAN, 5.0, 7.0, f64::NAN];
        interpolate_non_finite(&[0.0, 1.0, 2.0, 3.0, 4.0], &mut values).unwrap();
        assert_eq!(values, vec![5.0, 5.0, 5.0, 7.0, 7.0]);
    }

    #[test]
    fn all_nan_pixel_is_rejected() {
        let mut b = bundle();
        for row in b.fpix.iter_mut() {
            row[1] = f64::NAN;
        }
        assert_eq!(
            LightCurve::new(&b, 0).unwrap_err(),
            DataError::NoFinitePixel(1)
        );
    }

    #[test]
    fn unsorted_time_is_rejected() {
        let mut b = bundle();
        b.time[2] = 0.5;
        assert_eq!(
            LightCurve::new(&b, 0).unwrap_err(),
            DataError::UnsortedTime(2)
        );
    }

    #[test]
    fn ragged_pixels_are_rejected() {
        let mut b = bundle();
        b.fpix[2].push(1.0);
        assert_eq!(
            LightCurve::new(&b, 0).unwrap_err(),
            DataError::PixelCountMismatch {
                index: 2,
                actual: 3,
                expected: 2
            }
        );
    }

    #[test]
    fn quality_marks_bad() {
        let b = bundle().with_quality(vec![0, 0, 0, 16]);
        let lc = LightCurve::new(&b, 0).unwrap();
        assert_eq!(lc.indices_with(QualityFlags::BAD), vec![3]);
        assert_eq!(lc.unmasked(), vec![0, 2]);
    }

    #[test]
    fn outliers_are_replaced() {
        let mut lc = LightCurve::new(&bundle(), 0).unwrap();
        lc.set_outliers(&[0, 2]);
        lc.set_outliers(&[3]);
        assert_eq!(lc.outliers(), vec![3]);
    }

    #[test]
    fn transit_mask() {
        let time: Vec<_> = (0..20).map(|i| i as f64 * 0.5).collect();
        let b = ObservationBundle::new(time, vec![vec![1.0, 1.0]; 20], vec![vec![0.1, 0.1]; 20]);
        let mut lc = LightCurve::new(&b, 0).unwrap();
        // Epochs at 1.0, 4.0, 7.0, half-width 0.3 catches a single cadence per epoch
        assert_eq!(lc.mask_transits(1.0, 3.0, 0.6), 3);
        assert_eq!(lc.indices_with(QualityFlags::TRANSIT), vec![2, 8, 14]);
        assert_eq!(lc.mask_transits(1.0, 3.0, 0.6), 0);
    }
}
