use crate::pld::design::{DesignMatrixTrait, pixel_products};

use ndarray::{Array2, ArrayView2};
use serde::Serialize;

/// Regular PLD: products of the target's own pixel fractions only
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RegularPld;

impl DesignMatrixTrait for RegularPld {
    fn name(&self) -> &'static str {
        "rPLD"
    }

    fn design_matrix(&self, fractions: ArrayView2<f64>, n: usize, rows: &[usize]) -> Array2<f64> {
        pixel_products(fractions, n + 1, rows)
    }
}
