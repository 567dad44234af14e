use crate::pld::neighbor::NeighborPld;
use crate::pld::regular::RegularPld;

use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use macro_const::macro_const;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::Serialize;
use std::fmt::Debug;

macro_const! {
    const PLD_DOC: &str = r"
Pixel-level decorrelation (PLD) regressors

Let $p\_{ij}$ be the flux of pixel $j$ at cadence $i$ and $F\_i$ the normalizer, the summed flux
or, for recursive PLD, the current detrended flux. The first-order regressors are
the pixel fractions
$$
x\_{ij} = \frac{p\_{ij}}{F\_i},
$$
the order-$n$ regressors are the products $\prod\_{k=1}^{n} x\_{i j\_k}$ over all multisets
$\\{j\_1, \ldots, j\_n\\}$ of pixels, i.e. the distinct entries of the $n$-fold outer product of
$x\_i$ with itself. Design matrices are computed per segment, one row per requested cadence.

Luger et al. 2016 [DOI:10.3847/0004-6256/152/4/100](https://doi.org/10.3847/0004-6256/152/4/100)
";
}

/// Pixel fractions `fpix / norm`, one row per cadence
pub fn pixel_fractions(fpix: &Array2<f64>, norm: ArrayView1<f64>) -> Array2<f64> {
    fpix / &norm.insert_axis(Axis(1))
}

/// Column indices of the order-`order` products, `order` starting at 1
pub fn multisets(npix: usize, order: usize) -> Vec<Vec<usize>> {
    (0..npix).combinations_with_replacement(order).collect()
}

/// Products of pixel fractions over all multisets of size `order` for every row in `rows`
pub fn pixel_products(fractions: ArrayView2<f64>, order: usize, rows: &[usize]) -> Array2<f64> {
    let sets = multisets(fractions.ncols(), order);
    Array2::from_shape_fn((rows.len(), sets.len()), |(i, k)| {
        let row = fractions.row(rows[i]);
        sets[k].iter().map(|&j| row[j]).product()
    })
}

#[doc = PLD_DOC!()]
#[enum_dispatch]
pub trait DesignMatrixTrait: Clone + Debug {
    /// Short model name
    fn name(&self) -> &'static str;

    /// Design matrix for the PLD order with 0-based index `n`, one row per cadence in `rows`
    fn design_matrix(&self, fractions: ArrayView2<f64>, n: usize, rows: &[usize]) -> Array2<f64>;
}

#[doc = PLD_DOC!()]
#[enum_dispatch(DesignMatrixTrait)]
#[derive(Clone, Debug, Serialize)]
#[non_exhaustive]
pub enum PldBasis {
    Regular(RegularPld),
    Neighbor(NeighborPld),
}

impl PldBasis {
    pub fn regular() -> Self {
        Self::Regular(RegularPld)
    }

    /// `neighbors` holds one row of neighbor regressors per cadence
    pub fn neighbor(neighbors: Array2<f64>) -> Self {
        Self::Neighbor(NeighborPld::new(neighbors))
    }

    pub const fn doc() -> &'static str {
        PLD_DOC
    }
}

impl Default for PldBasis {
    fn default() -> Self {
        Self::regular()
    }
}

#[cfg(test)]
pub(super) fn fractions_fixture() -> Array2<f64> {
    let fpix = ndarray::array![[1.0, 3.0], [2.0, 2.0], [4.0, 0.0]];
    let norm = fpix.sum_axis(Axis(1));
    pixel_fractions(&fpix, norm.view())
}
