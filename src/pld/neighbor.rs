use crate::pld::design::{DesignMatrixTrait, pixel_products};

use ndarray::{Array2, ArrayView2};
use serde::Serialize;

/// Neighbor PLD: the target's own pixel products followed by the PLD regressors of neighboring
/// stars
///
/// Neighbor regressors enter linearly at the first order and are raised to the power `n` at
/// order `n`, so they carry the common-mode systematics the target's own pixels are too faint to
/// constrain.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NeighborPld {
    neighbors: Array2<f64>,
}

impl NeighborPld {
    /// `neighbors` holds one row of regressors per cadence
    pub fn new(neighbors: Array2<f64>) -> Self {
        Self { neighbors }
    }

    pub fn n_neighbors(&self) -> usize {
        self.neighbors.ncols()
    }
}

impl DesignMatrixTrait for NeighborPld {
    fn name(&self) -> &'static str {
        "nPLD"
    }

    fn design_matrix(&self, fractions: ArrayView2<f64>, n: usize, rows: &[usize]) -> Array2<f64> {
        let own = pixel_products(fractions, n + 1, rows);
        let power = (n + 1) as i32;
        let n_own = own.ncols();
        Array2::from_shape_fn((rows.len(), n_own + self.n_neighbors()), |(i, k)| {
            if k < n_own {
                own[[i, k]]
            } else {
                self.neighbors[[rows[i], k - n_own]].powi(power)
            }
        })
    }
}
