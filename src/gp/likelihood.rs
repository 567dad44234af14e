use crate::error::{DataError, DetrendError};
use crate::gp::covariance::check_len;
use crate::gp::kernel::{KernelParams, SQRT_3, matern32};
use crate::linalg::CholeskyFactor;

use nalgebra::{DMatrix, DVector};
use ndarray::ArrayView1;
use std::f64::consts::PI;

/// Gaussian-process marginal likelihood of a light curve
///
/// The process covariance is `white² I + diag(errors²) + amp² Matern32(|Δt| / tau)`.
#[derive(Clone, Debug)]
pub struct GpLikelihood {
    time: Vec<f64>,
    y: DVector<f64>,
    err2: Vec<f64>,
}

impl GpLikelihood {
    /// `y` is expected to have zero mean
    pub fn new(
        time: ArrayView1<f64>,
        y: ArrayView1<f64>,
        errors: ArrayView1<f64>,
    ) -> Result<Self, DataError> {
        check_len("y", y.len(), time.len())?;
        check_len("errors", errors.len(), time.len())?;
        Ok(Self {
            time: time.to_vec(),
            y: DVector::from_iterator(y.len(), y.iter().copied()),
            err2: errors.iter().map(|e| e * e).collect(),
        })
    }

    fn len(&self) -> usize {
        self.time.len()
    }

    fn matrix(&self, params: &KernelParams) -> DMatrix<f64> {
        let n = self.len();
        let white2 = params.white.powi(2);
        DMatrix::from_fn(n, n, |i, j| {
            let red = params.red(self.time[i] - self.time[j]);
            if i == j {
                red + white2 + self.err2[i]
            } else {
                red
            }
        })
    }

    pub fn ln_likelihood(&self, params: &KernelParams) -> Result<f64, DetrendError> {
        let factor = CholeskyFactor::new(self.matrix(params), "GP likelihood")?;
        let alpha = factor.solve(&self.y);
        Ok(-0.5 * self.y.dot(&alpha)
            - 0.5 * factor.ln_det()
            - 0.5 * self.len() as f64 * f64::ln(2.0 * PI))
    }

    /// Log-likelihood and its gradient over `(white, amp, tau)`
    ///
    /// `∂ln L/∂θ = ½ tr((α αᵀ - K⁻¹) ∂K/∂θ)` with `α = K⁻¹ y`.
    pub fn ln_likelihood_with_gradient(
        &self,
        params: &KernelParams,
    ) -> Result<(f64, [f64; 3]), DetrendError> {
        let n = self.len();
        let factor = CholeskyFactor::new(self.matrix(params), "GP likelihood")?;
        let alpha = factor.solve(&self.y);
        let k_inv = factor.inverse();
        let ln_l = -0.5 * self.y.dot(&alpha)
            - 0.5 * factor.ln_det()
            - 0.5 * n as f64 * f64::ln(2.0 * PI);

        let amp2 = params.amp.powi(2);
        let mut grad = [0.0; 3];
        for j in 0..n {
            for i in 0..n {
                let w = alpha[i] * alpha[j] - k_inv[(i, j)];
                let r = f64::abs(self.time[i] - self.time[j]) / params.tau;
                let m = matern32(r);
                if i == j {
                    grad[0] += w * 2.0 * params.white;
                }
                grad[1] += w * 2.0 * params.amp * m;
                grad[2] += w * 3.0 * amp2 * r * r * f64::exp(-SQRT_3 * r) / params.tau;
            }
        }
        for g in grad.iter_mut() {
            *g *= 0.5;
        }
        Ok((ln_l, grad))
    }
}
