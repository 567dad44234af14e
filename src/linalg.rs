use crate::error::DetrendError;

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

pub fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    let (nrows, ncols) = a.dim();
    DMatrix::from_row_iterator(nrows, ncols, a.iter().copied())
}

pub fn to_dvector(a: ArrayView1<f64>) -> DVector<f64> {
    DVector::from_iterator(a.len(), a.iter().copied())
}

pub fn from_dvector(v: &DVector<f64>) -> Array1<f64> {
    v.iter().copied().collect()
}

/// Solve the general square system `a x = b` with LU decomposition
pub fn lu_solve(
    a: ArrayView2<f64>,
    b: ArrayView1<f64>,
    name: &'static str,
) -> Result<Array1<f64>, DetrendError> {
    let x = to_dmatrix(a)
        .lu()
        .solve(&to_dvector(b))
        .ok_or(DetrendError::Singular(name))?;
    if x.iter().all(|v| v.is_finite()) {
        Ok(from_dvector(&x))
    } else {
        Err(DetrendError::Singular(name))
    }
}

/// Cholesky factorization of a symmetric positive-definite matrix
#[derive(Clone, Debug)]
pub struct CholeskyFactor(Cholesky<f64, Dyn>);

impl CholeskyFactor {
    pub fn new(a: DMatrix<f64>, name: &'static str) -> Result<Self, DetrendError> {
        Cholesky::new(a)
            .map(Self)
            .ok_or(DetrendError::Singular(name))
    }

    pub fn from_array(a: ArrayView2<f64>, name: &'static str) -> Result<Self, DetrendError> {
        Self::new(to_dmatrix(a), name)
    }

    pub fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        self.0.solve(b)
    }

    /// `ln det A = 2 Σ ln L_ii`
    pub fn ln_det(&self) -> f64 {
        2.0 * self.0.l_dirty().diagonal().iter().map(|x| x.ln()).sum::<f64>()
    }

    pub fn inverse(&self) -> DMatrix<f64> {
        self.0.inverse()
    }
}

/// Ordinary least squares coefficients of `y ≈ X β` via the normal equations
pub fn least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<Array1<f64>, DetrendError> {
    let xtx: Array2<f64> = x.t().dot(&x);
    let xty = x.t().dot(&y);
    lu_solve(xtx.view(), xty.view(), "normal equations")
}
