//! Regularization strengths and their cross-order selection rule

use crate::array_stats::nanargmin;
use crate::error::ConfigError;

use ndarray::ArrayView1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Regularization of the first order before the first cross-validation, so that the first
/// outlier pass has a model to work with
pub const INITIAL_LAMBDA: f64 = 1e5;

/// A cell of the regularization table
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum Lambda {
    /// Not cross-validated yet, the order does not contribute to the model
    Pending,
    /// Prior variance weight of the order's regressors
    Value(f64),
    /// Not enough data to cross-validate: the order's regressors are discarded
    Discarded,
}

impl Lambda {
    /// Weight the order contributes with, `None` for pending and discarded cells
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Value(x) => Some(x),
            Self::Pending | Self::Discarded => None,
        }
    }
}

/// Regularization strengths indexed by `[segment][PLD order]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct LambdaTable(Vec<Vec<Lambda>>);

impl LambdaTable {
    pub fn new(n_segments: usize, pld_order: usize) -> Self {
        let mut row = vec![Lambda::Pending; pld_order];
        if let Some(first) = row.first_mut() {
            *first = Lambda::Value(INITIAL_LAMBDA);
        }
        Self(vec![row; n_segments])
    }

    pub fn n_segments(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, segment: usize, order: usize) -> Lambda {
        self.0[segment][order]
    }

    pub fn set(&mut self, segment: usize, order: usize, lambda: Lambda) {
        self.0[segment][order] = lambda;
    }

    /// Cells of a segment, one per PLD order
    pub fn segment(&self, segment: usize) -> &[Lambda] {
        &self.0[segment]
    }

    /// Replace the cell of `order` for a single segment, returning a modified copy of its row
    pub fn segment_with(&self, segment: usize, order: usize, lambda: Lambda) -> Vec<Lambda> {
        let mut row = self.0[segment].clone();
        row[order] = lambda;
        row
    }
}

/// Validate the grid of regularization strengths and prepend zero if it is absent
pub fn normalize_grid(grid: &[f64]) -> Result<Vec<f64>, ConfigError> {
    let invalid = || ConfigError::InvalidLambdaGrid(grid.to_vec());
    let positive = match grid.first() {
        Some(&x) if x == 0.0 => &grid[1..],
        _ => grid,
    };
    if positive.is_empty() {
        return Err(invalid());
    }
    if positive.iter().any(|&x| !x.is_finite() || x <= 0.0) {
        return Err(invalid());
    }
    if positive.windows(2).any(|w| w[1] <= w[0]) {
        return Err(invalid());
    }
    let mut normalized = Vec::with_capacity(positive.len() + 1);
    normalized.push(0.0);
    normalized.extend_from_slice(positive);
    Ok(normalized)
}

/// Default grid `10^0, 10^0.5, ..., 10^18`
pub fn default_grid() -> Vec<f64> {
    (0..=36).map(|i| 10f64.powf(0.5 * i as f64)).collect()
}

/// Running state of the conservative regularization choice of one segment
///
/// For every PLD order `m` is the grid index of the minimum validation scatter and `r` is the
/// largest index whose scatter is within the fractional tolerance `leps` of that minimum. The
/// selected index is `min(max m, min r)` over the orders processed so far, and it never
/// decreases from one order to the next.
#[derive(Clone, Debug, PartialEq)]
pub struct LambdaSelector {
    leps: f64,
    max_m: usize,
    min_r: usize,
    last: Option<usize>,
}

impl LambdaSelector {
    pub fn new(leps: f64, grid_len: usize) -> Self {
        Self {
            leps,
            max_m: 0,
            min_r: grid_len,
            last: None,
        }
    }

    /// Choose the grid index for the next order from its mean validation scatter curve
    pub fn select(&mut self, validation: ArrayView1<f64>) -> usize {
        let floor = self.last.unwrap_or(0);
        let Some(m) = nanargmin(validation) else {
            self.last = Some(floor);
            return floor;
        };
        let v_min = validation[m];
        let r = validation
            .iter()
            .rposition(|&v| (v - v_min) / v_min <= self.leps)
            .unwrap_or(m);
        self.max_m = self.max_m.max(m);
        self.min_r = self.min_r.min(r);
        let selected = usize::min(self.max_m, self.min_r).max(floor);
        self.last = Some(selected);
        selected
    }
}
