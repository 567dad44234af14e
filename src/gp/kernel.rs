use crate::detrender::DetrendResult;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub(crate) const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Matérn-3/2 correlation of a scaled distance `r = |Δt| / τ`
#[inline]
pub fn matern32(r: f64) -> f64 {
    let x = SQRT_3 * r;
    (1.0 + x) * f64::exp(-x)
}

/// Gaussian-process noise hyperparameters
///
/// `white` is the white-noise amplitude, `amp` and `tau` are the amplitude and the timescale of
/// the Matérn-3/2 red-noise kernel. Amplitudes are in flux units, the timescale is in time
/// units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KernelParams {
    pub white: f64,
    pub amp: f64,
    pub tau: f64,
}

impl KernelParams {
    pub fn new(white: f64, amp: f64, tau: f64) -> Self {
        Self { white, amp, tau }
    }

    #[inline]
    pub fn default_tau() -> f64 {
        30.0
    }

    /// Red-noise covariance between points separated by `dt`
    #[inline]
    pub fn red(&self, dt: f64) -> f64 {
        self.amp.powi(2) * matern32(dt.abs() / self.tau)
    }

    pub fn is_valid(&self) -> bool {
        [self.white, self.amp, self.tau]
            .iter()
            .all(|x| x.is_finite() && *x > 0.0)
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.white, self.amp, self.tau]
    }

    pub fn from_array([white, amp, tau]: [f64; 3]) -> Self {
        Self { white, amp, tau }
    }

    /// Kernel of a completed parent model
    ///
    /// Short-cadence data of a target are detrended with the noise model found for its
    /// long-cadence light curve, see [crate::DetrendConfig::for_short_cadence].
    pub fn from_parent(parent: &DetrendResult) -> Self {
        parent.kernel
    }
}
