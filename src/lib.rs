#![doc = include_str!("../README.md")]

#[cfg(test)]
mod tests;

mod array_stats;

mod config;
pub use config::{Cadence, DetrendConfig};

pub mod cross_validation;
pub use cross_validation::{CrossValidator, CvCurves, SegmentCv};

mod data;
pub use data::{END_OF_SERIES, LightCurve, ObservationBundle, QualityFlags, Segments};

mod detrender;
pub use detrender::{
    DetrendFailure, DetrendResult, Detrender, Metrics, SegmentMetrics, detrend_batch,
};

mod error;
pub use error::{ConfigError, DataError, DetrendError};

pub mod gp;
pub use gp::{KernelOptimizer, KernelParams};

pub mod lambda;
pub use lambda::{Lambda, LambdaSelector, LambdaTable};

mod linalg;

mod noise;
pub use noise::NoiseMetric;

pub mod outliers;
pub use outliers::{OutlierFilter, OutlierReport, OutlierTermination};

pub mod pld;
pub use pld::{DesignMatrixTrait, NeighborPld, PldBasis, RegularPld};

pub mod regression;
pub use regression::{ModelContext, RegressionSystem, SegmentDesign};

#[doc(hidden)]
pub mod savgol;

mod sorted_array;

pub use ndarray;
