//! k-fold cross-validation of the regularization strength of a PLD order

use crate::array_stats::{mean, robust_sigma};
use crate::error::DetrendError;
use crate::gp::ConditionedGp;
use crate::lambda::{Lambda, LambdaSelector, LambdaTable};
use crate::regression::{ModelContext, SegmentDesign};

use ndarray::{Array1, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Scatter curves of a cross-validated segment, indexed by the grid of regularization strengths
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CvCurves {
    pub segment: usize,
    /// 0-based PLD order the curves were computed for
    pub order: usize,
    /// Mean training-set scatter over folds, ppm
    pub training: Vec<f64>,
    /// Mean validation-set scatter over folds, ppm
    pub validation: Vec<f64>,
    /// Validation-set scatter of every fold, `folds[fold][lambda]`
    pub folds: Vec<Vec<f64>>,
}

/// Outcome of cross-validating one segment for one order
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentCv {
    pub lambda: Lambda,
    /// Validation to training scatter ratio at the chosen strength, NaN when the order was
    /// discarded
    pub ratio: f64,
    pub curves: Option<CvCurves>,
}

/// Contiguous folds of `n` cadences, the last fold absorbs the remainder
pub fn folds(n: usize, cdivs: usize) -> Vec<Range<usize>> {
    let size = n / cdivs;
    (0..cdivs)
        .map(|i| {
            let end = if i + 1 == cdivs { n } else { (i + 1) * size };
            i * size..end
        })
        .collect()
}

/// Cross-validator over a grid of regularization strengths
#[derive(Clone, Debug)]
pub struct CrossValidator<'a> {
    grid: &'a [f64],
    cdivs: usize,
}

/// Data of the cadences a segment is validated on
struct ValidationSet<'a> {
    design: &'a SegmentDesign,
    gp: &'a ConditionedGp,
    time: Array1<f64>,
    flux: Array1<f64>,
}

impl ValidationSet<'_> {
    /// Robust scatter of the detrended, GP-corrected flux over a fold, in ppm per
    /// `sqrt(fold size)`
    fn scatter(&self, model: &Array1<f64>, fold: &Range<usize>) -> Result<f64, DetrendError> {
        let med = self.design.median_flux();
        let residual = &self.flux - model - med;
        let gp_mean = self
            .gp
            .predict(residual.view(), self.time.slice(ndarray::s![fold.clone()]))?;
        let detrended: Vec<f64> = fold
            .clone()
            .zip(gp_mean.iter())
            .map(|(i, g)| (self.flux[i] - model[i] - g) / med)
            .collect();
        Ok(1e6 * robust_sigma(&detrended) / (fold.len() as f64).sqrt())
    }
}

impl<'a> CrossValidator<'a> {
    /// `grid` must start with zero, see [crate::lambda::normalize_grid]
    pub fn new(grid: &'a [f64], cdivs: usize) -> Self {
        Self { grid, cdivs }
    }

    /// Choose the regularization of `order` for segment `b`
    ///
    /// Segments with fewer than `3 cdivs` unmasked cadences are not validated, the order is
    /// discarded for them.
    pub fn validate(
        &self,
        ctx: &ModelContext<'_>,
        table: &LambdaTable,
        b: usize,
        order: usize,
        selector: &mut LambdaSelector,
    ) -> Result<SegmentCv, DetrendError> {
        let n_segments = table.n_segments();
        log::info!("Cross-validating chunk {}/{}...", b + 1, n_segments);
        let chunk = ctx.masked_chunk(b);
        if chunk.len() < 3 * self.cdivs {
            log::info!("Insufficient data to run cross-validation on this chunk.");
            return Ok(SegmentCv {
                lambda: Lambda::Discarded,
                ratio: f64::NAN,
                curves: None,
            });
        }

        let design = ctx.validation_design(b, order + 1);
        let time = ctx.lc.time().select(Axis(0), &chunk);
        let errors = ctx.lc.fraw_err().select(Axis(0), &chunk);
        let gp = ConditionedGp::new(*ctx.kernel, time.view(), errors.view())?;
        let set = ValidationSet {
            design: &design,
            gp: &gp,
            flux: ctx.lc.fraw().select(Axis(0), &chunk),
            time,
        };
        let rows: Vec<Vec<Lambda>> = self
            .grid
            .iter()
            .map(|&lambda| table.segment_with(b, order, Lambda::Value(lambda)))
            .collect();

        // The training view does not depend on the fold
        let training_system = design.system(&[]);
        let training_models = rows
            .iter()
            .map(|row| training_system.compute(row))
            .collect::<Result<Vec<_>, _>>()?;

        let folds = folds(chunk.len(), self.cdivs);
        let mut training = vec![Vec::with_capacity(folds.len()); self.grid.len()];
        let mut validation = vec![Vec::with_capacity(folds.len()); self.grid.len()];
        for (i, fold) in folds.iter().enumerate() {
            log::debug!("Section {}/{}...", i + 1, folds.len());
            let excluded: Vec<usize> = fold.clone().collect();
            let validation_system = design.system(&excluded);
            for (k, row) in rows.iter().enumerate() {
                training[k].push(set.scatter(&training_models[k], fold)?);
                let model = validation_system.compute(row)?;
                validation[k].push(set.scatter(&model, fold)?);
            }
        }

        let mean_training: Vec<f64> = training.iter().map(|v| mean(v)).collect();
        let mean_validation: Vec<f64> = validation.iter().map(|v| mean(v)).collect();
        let best = selector.select(ArrayView1::from(&mean_validation));
        let ratio = mean_validation[best] / mean_training[best];
        log::info!(
            "Found optimum solution at log(lambda) = {:.1}.",
            self.grid[best].log10()
        );

        let fold_curves = (0..folds.len())
            .map(|i| validation.iter().map(|v| v[i]).collect())
            .collect();
        Ok(SegmentCv {
            lambda: Lambda::Value(self.grid[best]),
            ratio,
            curves: Some(CvCurves {
                segment: b,
                order,
                training: mean_training,
                validation: mean_validation,
                folds: fold_curves,
            }),
        })
    }
}
