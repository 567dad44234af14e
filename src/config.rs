use crate::detrender::DetrendResult;
use crate::error::ConfigError;
use crate::gp::KernelParams;
use crate::lambda::{default_grid, normalize_grid};
use crate::noise::NoiseMetric;
use crate::savgol::{LONG_CADENCE_WINDOW, SHORT_CADENCE_WINDOW};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Sampling of the light curve
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Cadence {
    /// Thirty-minute cadence
    #[default]
    Long,
    /// One-minute cadence, detrended with the noise model of the long-cadence light curve
    Short,
}

impl Cadence {
    /// Savitzky-Golay window used to flatten light curves of this cadence
    pub fn savgol_window(self) -> usize {
        match self {
            Self::Long => LONG_CADENCE_WINDOW,
            Self::Short => SHORT_CADENCE_WINDOW,
        }
    }
}

/// Parameters of a [crate::Detrender] run
///
/// Missing fields take their default values on deserialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetrendConfig {
    /// Highest PLD order, the model is built recursively from order one to this one
    #[serde(default = "DetrendConfig::default_pld_order")]
    pub pld_order: usize,
    /// Regularization strengths to cross-validate, zero is prepended when absent
    #[serde(default = "DetrendConfig::default_lambda_grid")]
    pub lambda_grid: Vec<f64>,
    /// Fractional tolerance of the validation scatter within which stronger regularization is
    /// preferred
    #[serde(default = "DetrendConfig::default_leps")]
    pub leps: f64,
    /// Outlier threshold in robust standard deviations
    #[serde(default = "DetrendConfig::default_osigma")]
    pub osigma: f64,
    /// Maximum number of outlier iterations per order
    #[serde(default = "DetrendConfig::default_oiter")]
    pub oiter: usize,
    /// Number of cross-validation folds
    #[serde(default = "DetrendConfig::default_cdivs")]
    pub cdivs: usize,
    /// Number of randomized restarts of the GP optimization
    #[serde(default = "DetrendConfig::default_giter")]
    pub giter: usize,
    /// Normalize pixel fluxes by the current detrended flux instead of the raw flux
    #[serde(default = "DetrendConfig::default_recursive")]
    pub recursive: bool,
    /// Cadences the segments are padded with on both sides
    #[serde(default = "DetrendConfig::default_boundary_pad")]
    pub boundary_pad: usize,
    /// Re-optimize the GP kernel after the first order
    #[serde(default = "DetrendConfig::default_optimize_gp")]
    pub optimize_gp: bool,
    /// Initial GP kernel, estimated from the data when absent
    #[serde(default)]
    pub kernel_params: Option<KernelParams>,
    /// Ratio of the initial red-noise amplitude to the residual standard deviation
    #[serde(default = "DetrendConfig::default_gp_factor")]
    pub gp_factor: f64,
    /// Iteration budget of every GP optimization attempt
    #[serde(default = "DetrendConfig::default_gp_max_iters")]
    pub gp_max_iters: u64,
    #[serde(default)]
    pub cadence: Cadence,
    #[serde(default)]
    pub noise_metric: NoiseMetric,
    /// Seed of the GP restarts, entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl DetrendConfig {
    #[inline]
    pub fn default_pld_order() -> usize {
        3
    }

    #[inline]
    pub fn default_lambda_grid() -> Vec<f64> {
        default_grid()
    }

    #[inline]
    pub fn default_leps() -> f64 {
        0.05
    }

    #[inline]
    pub fn default_osigma() -> f64 {
        5.0
    }

    #[inline]
    pub fn default_oiter() -> usize {
        10
    }

    #[inline]
    pub fn default_cdivs() -> usize {
        3
    }

    #[inline]
    pub fn default_giter() -> usize {
        3
    }

    #[inline]
    pub fn default_recursive() -> bool {
        true
    }

    #[inline]
    pub fn default_boundary_pad() -> usize {
        100
    }

    #[inline]
    pub fn default_optimize_gp() -> bool {
        true
    }

    #[inline]
    pub fn default_gp_factor() -> f64 {
        100.0
    }

    #[inline]
    pub fn default_gp_max_iters() -> u64 {
        200
    }

    /// Check the parameters and return the normalized regularization grid
    pub fn validate(&self) -> Result<Vec<f64>, ConfigError> {
        if self.pld_order == 0 {
            return Err(ConfigError::NonPositivePldOrder(self.pld_order));
        }
        if self.cdivs == 0 {
            return Err(ConfigError::NoFolds(self.cdivs));
        }
        if self.giter == 0 {
            return Err(ConfigError::NoRestarts(self.giter));
        }
        check_range("leps", "non-negative", self.leps, |x| x >= 0.0)?;
        check_range("osigma", "positive", self.osigma, |x| x > 0.0)?;
        check_range("gp_factor", "positive", self.gp_factor, |x| x > 0.0)?;
        if let Some(kernel) = &self.kernel_params {
            for (name, value) in [
                ("kernel white", kernel.white),
                ("kernel amp", kernel.amp),
                ("kernel tau", kernel.tau),
            ] {
                check_range(name, "positive", value, |x| x > 0.0)?;
            }
        }
        if let NoiseMetric::Cdpp { window } = self.noise_metric {
            check_range("noise_metric window", "positive", window as f64, |x| x > 0.0)?;
        }
        if self.cadence == Cadence::Short && self.kernel_params.is_none() {
            return Err(ConfigError::ShortCadenceWithoutKernel);
        }
        normalize_grid(&self.lambda_grid)
    }

    /// Configuration of the short-cadence run of a target detrended at long cadence
    ///
    /// The kernel of the parent model is fixed, the other parameters are kept.
    pub fn for_short_cadence(self, parent: &DetrendResult) -> Self {
        Self {
            cadence: Cadence::Short,
            kernel_params: Some(KernelParams::from_parent(parent)),
            optimize_gp: false,
            ..self
        }
    }

    /// Savitzky-Golay window of the configured cadence
    pub fn savgol_window(&self) -> usize {
        self.cadence.savgol_window()
    }
}

fn check_range(
    name: &'static str,
    requirement: &'static str,
    value: f64,
    ok: impl Fn(f64) -> bool,
) -> Result<(), ConfigError> {
    if value.is_finite() && ok(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            requirement,
            value,
        })
    }
}

impl Default for DetrendConfig {
    fn default() -> Self {
        Self {
            pld_order: Self::default_pld_order(),
            lambda_grid: Self::default_lambda_grid(),
            leps: Self::default_leps(),
            osigma: Self::default_osigma(),
            oiter: Self::default_oiter(),
            cdivs: Self::default_cdivs(),
            giter: Self::default_giter(),
            recursive: Self::default_recursive(),
            boundary_pad: Self::default_boundary_pad(),
            optimize_gp: Self::default_optimize_gp(),
            kernel_params: None,
            gp_factor: Self::default_gp_factor(),
            gp_max_iters: Self::default_gp_max_iters(),
            cadence: Cadence::default(),
            noise_metric: NoiseMetric::default(),
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let grid = DetrendConfig::default().validate().unwrap();
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid.len(), 38);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: DetrendConfig = serde_json::from_str(r#"{"pld_order": 2, "seed": 1}"#).unwrap();
        assert_eq!(
            config,
            DetrendConfig {
                pld_order: 2,
                seed: Some(1),
                ..DetrendConfig::default()
            }
        );
    }

    #[test]
    fn json_roundtrip() {
        let config = DetrendConfig {
            lambda_grid: vec![1.0, 10.0, 100.0],
            kernel_params: Some(KernelParams::new(1.0, 2.0, 3.0)),
            noise_metric: NoiseMetric::CDPP6_LONG,
            ..DetrendConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: DetrendConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn invalid_values() {
        let check = |config: DetrendConfig, error: ConfigError| {
            assert_eq!(config.validate(), Err(error));
        };
        check(
            DetrendConfig {
                pld_order: 0,
                ..DetrendConfig::default()
            },
            ConfigError::NonPositivePldOrder(0),
        );
        check(
            DetrendConfig {
                cdivs: 0,
                ..DetrendConfig::default()
            },
            ConfigError::NoFolds(0),
        );
        check(
            DetrendConfig {
                giter: 0,
                ..DetrendConfig::default()
            },
            ConfigError::NoRestarts(0),
        );
        check(
            DetrendConfig {
                leps: -0.1,
                ..DetrendConfig::default()
            },
            ConfigError::OutOfRange {
                name: "leps",
                requirement: "non-negative",
                value: -0.1,
            },
        );
        check(
            DetrendConfig {
                noise_metric: NoiseMetric::Cdpp { window: 0 },
                ..DetrendConfig::default()
            },
            ConfigError::OutOfRange {
                name: "noise_metric window",
                requirement: "positive",
                value: 0.0,
            },
        );
        check(
            DetrendConfig {
                lambda_grid: vec![10.0, 1.0],
                ..DetrendConfig::default()
            },
            ConfigError::InvalidLambdaGrid(vec![10.0, 1.0]),
        );
        check(
            DetrendConfig {
                cadence: Cadence::Short,
                ..DetrendConfig::default()
            },
            ConfigError::ShortCadenceWithoutKernel,
        );
    }

    #[test]
    fn nan_is_out_of_range() {
        let config = DetrendConfig {
            osigma: f64::NAN,
            ..DetrendConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "osigma", .. })
        ));
    }

    #[test]
    fn short_cadence_window() {
        assert_eq!(Cadence::Long.savgol_window(), 49);
        assert_eq!(Cadence::Short.savgol_window(), 1471);
    }
}
