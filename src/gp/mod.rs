//! Gaussian-process noise model of the light curve

mod covariance;
pub use covariance::{ConditionedGp, covariance, cross_covariance};

mod kernel;
pub use kernel::{KernelParams, matern32};

mod likelihood;
pub use likelihood::GpLikelihood;

mod optimizer;
pub use optimizer::{KernelOptimizer, WHITE_NOISE_CHUNK, kernel_bounds};
