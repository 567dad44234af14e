//! Regularized PLD regression of a single segment
//!
//! With the prior `w ~ N(0, λ_n)` on the weights of the order-`n` regressors and the GP noise
//! covariance `K`, the posterior mean systematics model at the cadences `rows` given the fit
//! cadences is
//! ```text
//! model = (Σ_n λ_n X_n(rows) X_n(fit)ᵀ) (K + Σ_n λ_n X_n(fit) X_n(fit)ᵀ)⁻¹ (f - median f)
//! ```
//! Only orders with a [Lambda::Value] cell contribute.

use crate::array_stats::median;
use crate::data::LightCurve;
use crate::error::DetrendError;
use crate::gp::{KernelParams, covariance};
use crate::lambda::Lambda;
use crate::linalg::lu_solve;
use crate::pld::{DesignMatrixTrait, PldBasis};

use ndarray::{Array1, Array2, ArrayView2, Axis};

/// Design matrices, covariance and target of a segment, computed once per PLD order
#[derive(Clone, Debug)]
pub struct SegmentDesign {
    rows: Vec<usize>,
    /// One design matrix over `rows` per active order
    x: Vec<Array2<f64>>,
    /// Positions of the fit cadences within `rows`
    fit: Vec<usize>,
    k_fit: Array2<f64>,
    flux_fit: Array1<f64>,
    med: f64,
}

impl SegmentDesign {
    /// `rows` are the cadences the model is evaluated at, `fit` holds the positions within
    /// `rows` of the cadences the model is fit to. Orders `0..n_orders` are included.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        basis: &PldBasis,
        fractions: ArrayView2<f64>,
        n_orders: usize,
        rows: &[usize],
        fit: Vec<usize>,
        lc: &LightCurve,
        kernel: &KernelParams,
    ) -> Self {
        let x = (0..n_orders)
            .map(|n| basis.design_matrix(fractions, n, rows))
            .collect();
        let fit_cadences: Vec<usize> = fit.iter().map(|&p| rows[p]).collect();
        let time = lc.time().select(Axis(0), &fit_cadences);
        let errors = lc.fraw_err().select(Axis(0), &fit_cadences);
        let flux_fit = lc.fraw().select(Axis(0), &fit_cadences);
        let k_fit = covariance(kernel, time.view(), errors.view());
        let med = median(&flux_fit.to_vec());
        Self {
            rows: rows.to_vec(),
            x,
            fit,
            k_fit,
            flux_fit,
            med,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_fit(&self) -> usize {
        self.fit.len()
    }

    /// Median raw flux over the fit cadences
    pub fn median_flux(&self) -> f64 {
        self.med
    }

    /// Regression system fit to all fit cadences except the positions `exclude` of the fit set
    pub fn system(&self, exclude: &[usize]) -> RegressionSystem {
        let mut keep = vec![true; self.fit.len()];
        for &i in exclude {
            keep[i] = false;
        }
        let kept: Vec<usize> = (0..self.fit.len()).filter(|&i| keep[i]).collect();
        let kept_rows: Vec<usize> = kept.iter().map(|&i| self.fit[i]).collect();

        let mut a = Vec::with_capacity(self.x.len());
        let mut b = Vec::with_capacity(self.x.len());
        for x in self.x.iter() {
            let x_fit = x.select(Axis(0), &kept_rows);
            a.push(x_fit.dot(&x_fit.t()));
            b.push(x.dot(&x_fit.t()));
        }
        let k = self
            .k_fit
            .select(Axis(0), &kept)
            .select(Axis(1), &kept);
        let f = self.flux_fit.select(Axis(0), &kept) - self.med;
        RegressionSystem {
            n_rows: self.rows.len(),
            a,
            b,
            k,
            f,
        }
    }
}

/// Everything a segment regression depends on besides the regularization table
#[derive(Clone, Copy, Debug)]
pub struct ModelContext<'a> {
    pub lc: &'a LightCurve,
    pub basis: &'a PldBasis,
    /// Pixel fractions of the whole series
    pub fractions: ArrayView2<'a, f64>,
    pub kernel: &'a KernelParams,
}

impl ModelContext<'_> {
    /// Unmasked cadences of the padded segment `b`
    pub fn masked_chunk(&self, b: usize) -> Vec<usize> {
        self.lc.unmasked_in(self.lc.segments().padded(b))
    }

    /// Design evaluated over the whole padded segment and fit to its unmasked cadences
    pub fn production_design(&self, b: usize, n_orders: usize) -> SegmentDesign {
        let rows: Vec<usize> = self.lc.segments().padded(b).collect();
        let fit = rows
            .iter()
            .enumerate()
            .filter(|&(_, &i)| !self.lc.is_masked(i))
            .map(|(p, _)| p)
            .collect();
        SegmentDesign::new(
            self.basis,
            self.fractions,
            n_orders,
            &rows,
            fit,
            self.lc,
            self.kernel,
        )
    }

    /// Design evaluated and fit over the unmasked cadences of the padded segment
    pub fn validation_design(&self, b: usize, n_orders: usize) -> SegmentDesign {
        let rows = self.masked_chunk(b);
        let fit = (0..rows.len()).collect();
        SegmentDesign::new(
            self.basis,
            self.fractions,
            n_orders,
            &rows,
            fit,
            self.lc,
            self.kernel,
        )
    }
}

/// Precomputed normal equations of a segment regression
#[derive(Clone, Debug)]
pub struct RegressionSystem {
    n_rows: usize,
    a: Vec<Array2<f64>>,
    b: Vec<Array2<f64>>,
    k: Array2<f64>,
    f: Array1<f64>,
}

impl RegressionSystem {
    /// Systematics model over the segment rows for the regularization `lambdas`, one per order
    ///
    /// The model is median-subtracted. Orders beyond the precomputed ones are ignored.
    pub fn compute(&self, lambdas: &[Lambda]) -> Result<Array1<f64>, DetrendError> {
        let n_rows = self.n_rows;
        let mut a_total = self.k.clone();
        let mut b_total = Array2::zeros((n_rows, self.f.len()));
        let mut active = false;
        for ((a, b), lambda) in self.a.iter().zip(&self.b).zip(lambdas) {
            if let Some(lambda) = lambda.value() {
                a_total.scaled_add(lambda, a);
                b_total.scaled_add(lambda, b);
                active = true;
            }
        }
        if !active {
            return Ok(Array1::zeros(n_rows));
        }
        let w = lu_solve(a_total.view(), self.f.view(), "regression")?;
        let mut model = b_total.dot(&w);
        let med = median(&model.to_vec());
        model -= med;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::data::ObservationBundle;
    use crate::pld::pixel_fractions;
    use crate::tests::*;

    use approx::assert_abs_diff_eq;

    fn segment(lc: &LightCurve) -> SegmentDesign {
        let fractions = pixel_fractions(lc.fpix(), lc.fraw());
        let rows: Vec<usize> = (0..lc.len()).collect();
        SegmentDesign::new(
            &PldBasis::regular(),
            fractions.view(),
            2,
            &rows,
            lc.unmasked(),
            lc,
            &KernelParams::new(1.0, 1.0, 30.0),
        )
    }

    #[test]
    fn same_inputs_same_model() {
        let lc = jittery_light_curve(200, 0);
        let design = segment(&lc);
        let lambdas = [Lambda::Value(1e5), Lambda::Value(1e3)];
        let a = design.system(&[]).compute(&lambdas).unwrap();
        let b = design.system(&[]).compute(&lambdas).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn model_is_median_subtracted() {
        let lc = jittery_light_curve(200, 1);
        let model = segment(&lc)
            .system(&[])
            .compute(&[Lambda::Value(1e8), Lambda::Pending])
            .unwrap();
        assert_abs_diff_eq!(median(&model.to_vec()), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn pending_orders_give_zero_model() {
        let lc = jittery_light_curve(100, 2);
        let model = segment(&lc)
            .system(&[])
            .compute(&[Lambda::Pending, Lambda::Discarded])
            .unwrap();
        assert_eq!(model, Array1::<f64>::zeros(100));
    }

    #[test]
    fn strong_regularization_removes_systematics() {
        let lc = jittery_light_curve(300, 3);
        let model = segment(&lc)
            .system(&[])
            .compute(&[Lambda::Value(1e10), Lambda::Pending])
            .unwrap();
        let raw = lc.fraw().to_vec();
        let detrended: Vec<_> = raw.iter().zip(&model).map(|(f, m)| f - m).collect();
        assert!(crate::array_stats::std(&detrended) < 0.2 * crate::array_stats::std(&raw));
    }

    #[test]
    fn excluded_cadences_are_predicted() {
        let lc = jittery_light_curve(200, 4);
        let design = segment(&lc);
        let fold: Vec<usize> = (50..100).collect();
        let model = design
            .system(&fold)
            .compute(&[Lambda::Value(1e10), Lambda::Pending])
            .unwrap();
        assert_eq!(model.len(), design.n_rows());
        assert_eq!(design.n_fit(), 200);
    }

    #[test]
    fn evaluated_over_masked_rows() {
        let quality = (0..100).map(|i| u32::from(i % 10 == 0)).collect();
        let bundle: ObservationBundle = pixel_bundle(&lc_builder(100, 5).build()).with_quality(quality);
        let masked = LightCurve::new(&bundle, 0).unwrap();
        let design = segment(&masked);
        assert_eq!(design.n_rows(), 100);
        assert_eq!(design.n_fit(), 90);
        let model = design
            .system(&[])
            .compute(&[Lambda::Value(1e10), Lambda::Pending])
            .unwrap();
        assert_eq!(model.len(), 100);
    }
}
