use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input observations of a single target
///
/// `fpix` and `fpix_err` hold one row of per-pixel values per cadence. `quality` is the
/// instrument quality word of every cadence, non-zero values mark the cadence as bad; an empty
/// vector means all cadences are good. `breakpoints` are the last indices of the segments, see
/// [crate::Segments]. `neighbors` optionally holds per-cadence PLD regressors of neighboring
/// stars used by [crate::NeighborPld].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObservationBundle {
    pub time: Vec<f64>,
    pub fpix: Vec<Vec<f64>>,
    pub fpix_err: Vec<Vec<f64>>,
    #[serde(default)]
    pub quality: Vec<u32>,
    #[serde(default)]
    pub breakpoints: Vec<usize>,
    #[serde(default)]
    pub neighbors: Option<Vec<Vec<f64>>>,
}

impl ObservationBundle {
    pub fn new(time: Vec<f64>, fpix: Vec<Vec<f64>>, fpix_err: Vec<Vec<f64>>) -> Self {
        Self {
            time,
            fpix,
            fpix_err,
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, quality: Vec<u32>) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_breakpoints(mut self, breakpoints: Vec<usize>) -> Self {
        self.breakpoints = breakpoints;
        self
    }

    pub fn with_neighbors(mut self, neighbors: Vec<Vec<f64>>) -> Self {
        self.neighbors = Some(neighbors);
        self
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}
