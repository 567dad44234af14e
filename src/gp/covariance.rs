use crate::error::{DataError, DetrendError};
use crate::gp::kernel::KernelParams;
use crate::linalg::{CholeskyFactor, from_dvector, to_dvector};

use ndarray::{Array1, Array2, ArrayView1};

/// Red-noise kernel matrix between two sets of timestamps
pub fn cross_covariance(
    params: &KernelParams,
    t1: ArrayView1<f64>,
    t2: ArrayView1<f64>,
) -> Array2<f64> {
    Array2::from_shape_fn((t1.len(), t2.len()), |(i, j)| params.red(t1[i] - t2[j]))
}

/// Regression noise covariance `diag(errors²) + amp² Matern32(|Δt| / tau)`
///
/// The white-noise amplitude of `params` is not included: the measurement errors stand for the
/// white component of the regression covariance.
pub fn covariance(
    params: &KernelParams,
    time: ArrayView1<f64>,
    errors: ArrayView1<f64>,
) -> Array2<f64> {
    let mut k = cross_covariance(params, time, time);
    k.diag_mut()
        .iter_mut()
        .zip(errors.iter())
        .for_each(|(d, e)| *d += e * e);
    k
}

/// Gaussian process conditioned on a set of timestamps and measurement errors
#[derive(Clone, Debug)]
pub struct ConditionedGp {
    params: KernelParams,
    time: Array1<f64>,
    factor: CholeskyFactor,
}

impl ConditionedGp {
    pub fn new(
        params: KernelParams,
        time: ArrayView1<f64>,
        errors: ArrayView1<f64>,
    ) -> Result<Self, DetrendError> {
        check_len("errors", errors.len(), time.len())?;
        let k = covariance(&params, time, errors);
        let factor = CholeskyFactor::from_array(k.view(), "GP covariance")?;
        Ok(Self {
            params,
            time: time.to_owned(),
            factor,
        })
    }

    /// Predictive mean of the red-noise process at `t_star` given observations `y`
    pub fn predict(
        &self,
        y: ArrayView1<f64>,
        t_star: ArrayView1<f64>,
    ) -> Result<Array1<f64>, DetrendError> {
        check_len("y", y.len(), self.time.len())?;
        let alpha = from_dvector(&self.factor.solve(&to_dvector(y)));
        Ok(cross_covariance(&self.params, t_star, self.time.view()).dot(&alpha))
    }
}

pub(super) fn check_len(
    name: &'static str,
    actual: usize,
    expected: usize,
) -> Result<(), DataError> {
    if actual == expected {
        Ok(())
    } else {
        Err(DataError::LengthMismatch {
            name,
            actual,
            expected,
        })
    }
}
