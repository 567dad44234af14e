//! Photometric precision estimates of detrended light curves

use crate::array_stats::{chunks, median, robust_sigma, std};
use crate::savgol::flatten;

use macro_const::macro_const;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_const! {
    const NOISE_DOC: &str = r"
Noise metric of a light curve, in parts per million

Both metrics are computed on the flux flattened with a quadratic Savitzky-Golay filter and
normalized by its median, so that stellar variability longer than the filter window does not
contribute.

- `Scatter`: standard deviation of the flattened flux after removing $5\sigma$ outliers, where
  $\sigma$ is the robust standard deviation $1.4826\,\mathrm{MAD}$.
- `Cdpp`: the combined differential photometric precision over `window` cadences, the median over
  consecutive chunks of `window` cadences of the chunk standard deviation divided by
  $\sqrt{\mathrm{window}}$. Thirteen long cadences make six and a half hours.
";
}

const CLIP_SIGMA: f64 = 5.0;

#[doc = NOISE_DOC!()]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NoiseMetric {
    #[default]
    Scatter,
    Cdpp { window: usize },
}

impl NoiseMetric {
    /// Six-and-a-half-hour precision of a long-cadence light curve
    pub const CDPP6_LONG: Self = Self::Cdpp { window: 13 };
    /// Six-and-a-half-hour precision of a short-cadence light curve
    pub const CDPP6_SHORT: Self = Self::Cdpp { window: 390 };

    pub const fn doc() -> &'static str {
        NOISE_DOC
    }

    /// Metric of `flux`, NaN when there are too few points
    ///
    /// `savgol_window` is the flattening filter window.
    pub fn compute(&self, flux: &[f64], savgol_window: usize) -> f64 {
        let flux: Vec<f64> = flux.iter().copied().filter(|x| x.is_finite()).collect();
        if flux.len() < 2 {
            return f64::NAN;
        }
        let flat = flatten(&flux, savgol_window);
        let med = median(&flat);
        let normalized: Vec<f64> = flat.iter().map(|&x| x / med).collect();
        match *self {
            Self::Scatter => {
                let centre = median(&normalized);
                let sigma = robust_sigma(&normalized);
                let kept: Vec<f64> = normalized
                    .into_iter()
                    .filter(|x| f64::abs(x - centre) <= CLIP_SIGMA * sigma)
                    .collect();
                1e6 * std(&kept)
            }
            Self::Cdpp { window } => {
                let stds: Vec<f64> = chunks(normalized.len(), window)
                    .filter(|chunk| chunk.len() == window)
                    .map(|chunk| std(&normalized[chunk]))
                    .collect();
                if stds.is_empty() {
                    return f64::NAN;
                }
                1e6 * median(&stds) / (window as f64).sqrt()
            }
        }
    }
}
