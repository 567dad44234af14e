//! Recursive PLD detrending of a single target

use crate::array_stats::{median, median_chunk_std, std, weighted_mean};
use crate::config::{Cadence, DetrendConfig};
use crate::cross_validation::{CrossValidator, CvCurves, SegmentCv};
use crate::data::{LightCurve, ObservationBundle, QualityFlags};
use crate::error::DetrendError;
use crate::gp::{ConditionedGp, KernelOptimizer, KernelParams, WHITE_NOISE_CHUNK};
use crate::lambda::{LambdaSelector, LambdaTable};
use crate::linalg::least_squares;
use crate::outliers::{OutlierFilter, OutlierReport, sigma_clip};
use crate::pld::{DesignMatrixTrait, PldBasis, pixel_fractions};
use crate::regression::ModelContext;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;

/// Noise metric of every segment, ppm
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetrics {
    /// Raw flux
    pub raw: Array1<f64>,
    /// Detrended flux
    pub detrended: Array1<f64>,
    /// Detrended metric scaled by the validation to training scatter ratio of the last
    /// cross-validation, NaN for segments that were not validated
    pub validation: Array1<f64>,
}

/// Noise metrics of the whole light curve, ppm
///
/// Segment values are averaged with weights equal to the number of unmasked cadences.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub raw: f64,
    pub detrended: f64,
    pub validation: f64,
    /// Detrended flux with the GP mean subtracted, NaN for short cadence
    pub gp_detrended: f64,
}

/// Output of a [Detrender] run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetrendResult {
    /// Name of the PLD variant
    pub model_name: String,
    pub time: Array1<f64>,
    /// Detrended flux, `fraw - model`
    pub flux: Array1<f64>,
    /// Median-subtracted systematics model
    pub model: Array1<f64>,
    pub fraw: Array1<f64>,
    pub fraw_err: Array1<f64>,
    pub lambda: LambdaTable,
    pub kernel: KernelParams,
    pub segment_metrics: SegmentMetrics,
    pub metrics: Metrics,
    /// Cross-validation curves of every validated segment and order
    pub cv_curves: Vec<CvCurves>,
    pub outliers: Vec<usize>,
    pub bad: Vec<usize>,
    pub nan: Vec<usize>,
    pub transits: Vec<usize>,
    pub quality: Vec<QualityFlags>,
    /// Outlier loop summary of every order
    pub outlier_reports: Vec<OutlierReport>,
}

/// PLD detrender of a single target
///
/// The model is built order by order. For every order the outliers are clipped against the
/// current model, the GP kernel is re-optimized (from the second order on), the regularization
/// of the new order is cross-validated for every segment and the model is refit.
#[derive(Clone, Debug)]
pub struct Detrender {
    config: DetrendConfig,
    grid: Vec<f64>,
    lc: LightCurve,
    basis: PldBasis,
}

impl Detrender {
    /// Validate `config`, load `bundle` and choose the PLD variant
    ///
    /// Neighbor PLD is used when the bundle holds neighbor regressors.
    pub fn new(config: DetrendConfig, bundle: &ObservationBundle) -> Result<Self, DetrendError> {
        let grid = config.validate()?;
        let lc = LightCurve::new(bundle, config.boundary_pad)?;
        let basis = match lc.neighbors() {
            Some(neighbors) => PldBasis::neighbor(neighbors.clone()),
            None => PldBasis::regular(),
        };
        Ok(Self {
            config,
            grid,
            lc,
            basis,
        })
    }

    pub fn config(&self) -> &DetrendConfig {
        &self.config
    }

    pub fn light_curve(&self) -> &LightCurve {
        &self.lc
    }

    pub fn basis(&self) -> &PldBasis {
        &self.basis
    }

    /// Exclude transits from fitting, see [LightCurve::mask_transits]
    pub fn mask_transits(&mut self, t0: f64, period: f64, duration: f64) -> usize {
        self.lc.mask_transits(t0, period, duration)
    }

    pub fn run(self) -> Result<DetrendResult, DetrendError> {
        self.run_with_finalize(|_, _| Ok(()))
    }

    /// Run the detrending, calling `finalize` after the last order
    ///
    /// `finalize` receives the light curve and the detrended flux, it may change the masks. The
    /// model is recomputed afterwards.
    pub fn run_with_finalize<F>(self, finalize: F) -> Result<DetrendResult, DetrendError>
    where
        F: FnOnce(&mut LightCurve, ArrayView1<f64>) -> Result<(), DetrendError>,
    {
        let Self {
            config,
            grid,
            lc,
            basis,
        } = self;
        log::info!("Initializing {} model...", basis.name());
        let kernel = match config.kernel_params {
            Some(kernel) => kernel,
            None => init_kernel(&lc, config.gp_factor)?,
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let n_segments = lc.segments().count();
        let fractions = pixel_fractions(lc.fpix(), lc.fraw());
        let fit = Fit {
            table: LambdaTable::new(n_segments, config.pld_order),
            selectors: vec![LambdaSelector::new(config.leps, grid.len()); n_segments],
            model: Array1::zeros(lc.len()),
            order: 0,
            config,
            grid,
            lc,
            basis,
            kernel,
            fractions,
            rng,
        };
        fit.run(finalize)
    }
}

/// Initial kernel from the residuals of an ordinary least-squares first-order PLD fit
fn init_kernel(lc: &LightCurve, gp_factor: f64) -> Result<KernelParams, DetrendError> {
    let idx = lc.unmasked();
    let x = pixel_fractions(lc.fpix(), lc.fraw()).select(Axis(0), &idx);
    let y = lc.fraw().select(Axis(0), &idx);
    let beta = least_squares(x.view(), y.view())?;
    let residual = (&y - &x.dot(&beta)).to_vec();
    Ok(KernelParams::new(
        median_chunk_std(&residual, WHITE_NOISE_CHUNK),
        gp_factor * std(&residual),
        KernelParams::default_tau(),
    ))
}

/// Mutable state of a run
struct Fit {
    config: DetrendConfig,
    grid: Vec<f64>,
    lc: LightCurve,
    basis: PldBasis,
    kernel: KernelParams,
    table: LambdaTable,
    selectors: Vec<LambdaSelector>,
    /// 0-based index of the highest order in the model
    order: usize,
    /// Pixel fractions for the current order
    fractions: Array2<f64>,
    model: Array1<f64>,
    rng: StdRng,
}

impl Fit {
    fn context(&self) -> ModelContext<'_> {
        ModelContext {
            lc: &self.lc,
            basis: &self.basis,
            fractions: self.fractions.view(),
            kernel: &self.kernel,
        }
    }

    fn detrended(&self) -> Array1<f64> {
        &self.lc.fraw() - &self.model
    }

    fn refresh_normalizer(&mut self) {
        if self.config.recursive {
            self.fractions = pixel_fractions(self.lc.fpix(), self.detrended().view());
        }
    }

    /// Fit every segment and stitch the segment models together
    ///
    /// A segment model is shifted to match the previous segment at the last unmasked cadence
    /// they share, the stitched model is median-subtracted. Segments without unmasked cadences
    /// keep a zero model.
    fn compute(&mut self) -> Result<(), DetrendError> {
        let ctx = self.context();
        let segments = self.lc.segments();
        let mut model = Array1::zeros(self.lc.len());
        for b in 0..segments.count() {
            let design = ctx.production_design(b, self.order + 1);
            if design.n_fit() == 0 {
                log::warn!("Chunk {}/{} is fully masked, skipping.", b + 1, segments.count());
                continue;
            }
            let segment_model = design.system(&[]).compute(self.table.segment(b))?;
            let start = segments.padded(b).start;
            let core = segments.core(b);
            let offset = (start..core.start)
                .rev()
                .find(|&i| !self.lc.is_masked(i))
                .map_or(0.0, |i| model[i] - segment_model[i - start]);
            for i in core {
                model[i] = segment_model[i - start] + offset;
            }
        }
        let unmasked: Vec<f64> = self.lc.unmasked().iter().map(|&i| model[i]).collect();
        model -= median(&unmasked);
        self.model = model;
        Ok(())
    }

    /// Outliers of the current detrended flux, NaN and bad cadences are ignored
    fn find_outliers(&self) -> Vec<usize> {
        let flux = self.detrended().to_vec();
        let excluded: Vec<bool> = self
            .lc
            .flags()
            .iter()
            .map(|flag| flag.intersects(QualityFlags::NAN | QualityFlags::BAD))
            .collect();
        sigma_clip(
            &flux,
            &excluded,
            self.config.osigma,
            self.config.savgol_window(),
        )
    }

    fn clip_outliers(&mut self) -> Result<OutlierReport, DetrendError> {
        let filter = OutlierFilter {
            osigma: self.config.osigma,
            oiter: self.config.oiter,
        };
        let report = filter.run(self.lc.outliers(), |outliers| {
            self.lc.set_outliers(outliers);
            self.compute()?;
            Ok(self.find_outliers())
        })?;
        self.lc.set_outliers(&report.outliers);
        Ok(report)
    }

    fn update_gp(&mut self) {
        let optimizer = KernelOptimizer {
            restarts: self.config.giter,
            max_iters: self.config.gp_max_iters,
            savgol_window: self.config.savgol_window(),
        };
        let mask: Vec<usize> = (0..self.lc.len())
            .filter(|&i| self.lc.is_masked(i))
            .collect();
        let flux = self.detrended();
        self.kernel = optimizer.optimize(
            self.lc.time(),
            flux.view(),
            self.lc.fraw_err(),
            &mask,
            Some(self.kernel),
            &mut self.rng,
        );
    }

    /// Choose the regularization of the current order for every segment
    fn cross_validate(&mut self) -> Result<Vec<SegmentCv>, DetrendError> {
        let validator = CrossValidator::new(&self.grid, self.config.cdivs);
        let ctx = ModelContext {
            lc: &self.lc,
            basis: &self.basis,
            fractions: self.fractions.view(),
            kernel: &self.kernel,
        };
        let results = self
            .selectors
            .iter_mut()
            .enumerate()
            .map(|(b, selector)| validator.validate(&ctx, &self.table, b, self.order, selector))
            .collect::<Result<Vec<_>, _>>()?;
        for (b, cv) in results.iter().enumerate() {
            self.table.set(b, self.order, cv.lambda);
        }
        Ok(results)
    }

    fn segment_metrics(&self, flux: ArrayView1<f64>) -> Array1<f64> {
        let window = self.config.savgol_window();
        self.lc
            .segments()
            .iter_core()
            .map(|core| {
                let values: Vec<f64> = self.lc.unmasked_in(core).iter().map(|&i| flux[i]).collect();
                self.config.noise_metric.compute(&values, window)
            })
            .collect()
    }

    fn global_metric(&self, values: &Array1<f64>) -> f64 {
        let weights: Array1<f64> = self
            .lc
            .segments()
            .iter_core()
            .map(|core| self.lc.unmasked_in(core).len() as f64)
            .collect();
        weighted_mean(values.view(), weights.view()).unwrap_or(f64::NAN)
    }

    /// Metric of the detrended flux with the GP mean of the unmasked cadences subtracted
    fn gp_detrended_metric(&self) -> Result<f64, DetrendError> {
        if self.config.cadence == Cadence::Short {
            return Ok(f64::NAN);
        }
        let idx = self.lc.unmasked();
        let time = self.lc.time().select(Axis(0), &idx);
        let errors = self.lc.fraw_err().select(Axis(0), &idx);
        let flux = self.detrended().select(Axis(0), &idx);
        let med = median(&flux.to_vec());
        let gp = ConditionedGp::new(self.kernel, time.view(), errors.view())?;
        let gp_mean = gp.predict((&flux - med).view(), time.view())?;
        let residual = (&flux - &gp_mean).to_vec();
        Ok(self
            .config
            .noise_metric
            .compute(&residual, self.config.savgol_window()))
    }

    fn run<F>(mut self, finalize: F) -> Result<DetrendResult, DetrendError>
    where
        F: FnOnce(&mut LightCurve, ArrayView1<f64>) -> Result<(), DetrendError>,
    {
        let name = self.basis.name();
        let raw = self.segment_metrics(self.lc.fraw());
        log::info!("{} (raw): {:.2} ppm", name, self.global_metric(&raw));

        let pld_order = self.config.pld_order;
        let mut validation = raw.clone();
        let mut reports = Vec::with_capacity(pld_order);
        let mut cv_curves = vec![];
        for order in 0..pld_order {
            self.order = order;
            self.refresh_normalizer();
            reports.push(self.clip_outliers()?);
            if order > 0 && self.config.optimize_gp {
                self.update_gp();
            }
            let cvs = self.cross_validate()?;
            self.compute()?;

            let detrended = self.segment_metrics(self.detrended().view());
            let ratios: Array1<f64> = cvs.iter().map(|cv| cv.ratio).collect();
            validation = ratios * &detrended;
            cv_curves.extend(cvs.into_iter().filter_map(|cv| cv.curves));
            log::info!(
                "{} ({}/{}): {:.2} ppm, validation {:.2} ppm",
                name,
                order + 1,
                pld_order,
                self.global_metric(&detrended),
                self.global_metric(&validation),
            );
        }

        let flux = self.detrended();
        finalize(&mut self.lc, flux.view())?;
        self.compute()?;

        let flux = self.detrended();
        let detrended = self.segment_metrics(flux.view());
        let metrics = Metrics {
            raw: self.global_metric(&raw),
            detrended: self.global_metric(&detrended),
            validation: self.global_metric(&validation),
            gp_detrended: self.gp_detrended_metric()?,
        };
        log::info!("{} (final): {:.2} ppm", name, metrics.detrended);

        Ok(DetrendResult {
            model_name: name.to_string(),
            time: self.lc.time().to_owned(),
            fraw: self.lc.fraw().to_owned(),
            fraw_err: self.lc.fraw_err().to_owned(),
            flux,
            model: self.model,
            lambda: self.table,
            kernel: self.kernel,
            segment_metrics: SegmentMetrics {
                raw,
                detrended,
                validation,
            },
            metrics,
            cv_curves,
            outliers: self.lc.outliers(),
            bad: self.lc.indices_with(QualityFlags::BAD),
            nan: self.lc.indices_with(QualityFlags::NAN),
            transits: self.lc.indices_with(QualityFlags::TRANSIT),
            quality: self.lc.flags().to_vec(),
            outlier_reports: reports,
        })
    }
}

/// A target [detrend_batch] could not detrend
#[derive(Debug)]
pub struct DetrendFailure {
    pub target: String,
    pub error: DetrendError,
    pub backtrace: Backtrace,
}

impl DetrendFailure {
    /// Messages of the error and its sources, outermost first
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.error.to_string()];
        let mut source = std::error::Error::source(&self.error);
        while let Some(error) = source {
            messages.push(error.to_string());
            source = error.source();
        }
        messages
    }
}

/// Detrend several targets with the same configuration
///
/// A failed target is logged and recorded, the other targets are not affected. Results are in
/// the order of `targets`.
pub fn detrend_batch<I, S>(
    config: &DetrendConfig,
    targets: I,
) -> Vec<Result<DetrendResult, DetrendFailure>>
where
    I: IntoIterator<Item = (S, ObservationBundle)>,
    S: Into<String>,
{
    targets
        .into_iter()
        .map(|(target, bundle)| {
            let target = target.into();
            log::info!("Detrending {target}...");
            Detrender::new(config.clone(), &bundle)
                .and_then(Detrender::run)
                .map_err(|error| {
                    log::error!("Detrending {target} failed: {error}");
                    DetrendFailure {
                        target,
                        error,
                        backtrace: Backtrace::capture(),
                    }
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::lambda::Lambda;
    use crate::tests::*;

    use approx::assert_relative_eq;

    fn fast_config() -> DetrendConfig {
        DetrendConfig {
            pld_order: 1,
            lambda_grid: vec![1e2, 1e6, 1e10],
            boundary_pad: 0,
            optimize_gp: false,
            seed: Some(0),
            ..DetrendConfig::default()
        }
    }

    fn run(config: DetrendConfig, bundle: &ObservationBundle) -> DetrendResult {
        Detrender::new(config, bundle).unwrap().run().unwrap()
    }

    fn rows(plc: &PixelLightCurve, range: std::ops::Range<usize>) -> ObservationBundle {
        ObservationBundle::new(
            plc.time.slice(ndarray::s![range.clone()]).to_vec(),
            plc.fpix_rows()[range.clone()].to_vec(),
            plc.fpix_err_rows()[range].to_vec(),
        )
    }

    #[test]
    fn flat_light_curve_keeps_white_noise() {
        let plc = PixelLightCurveBuilder::new(1000).pixels(2).seed(0).build();
        let result = run(fast_config(), &pixel_bundle(&plc));
        assert_eq!(result.lambda.n_segments(), 1);
        assert_relative_eq!(result.metrics.detrended, 1e6 * plc.noise, max_relative = 0.1);
        assert!(result.metrics.gp_detrended.is_finite());
    }

    #[test]
    fn systematics_are_removed() {
        let plc = lc_builder(300, 0).build();
        let result = run(fast_config(), &pixel_bundle(&plc));
        assert!(result.metrics.detrended < 0.1 * result.metrics.raw);
        assert_eq!(result.flux, &result.fraw - &result.model);
    }

    #[test]
    fn spike_is_masked() {
        let plc = lc_builder(300, 1).spike(150, 50.0).build();
        let result = run(fast_config(), &pixel_bundle(&plc));
        assert!(result.outliers.contains(&150));
        assert!(result.quality[150].contains(QualityFlags::OUTLIER));
        assert!(result.outliers.len() < 10);
        assert_eq!(result.outlier_reports.len(), 1);
    }

    #[test]
    fn segments_are_validated_independently() {
        let plc = PixelLightCurveBuilder::new(400)
            .seed(3)
            .systematics(Systematics {
                cadences: 0..200,
                amplitude: 0.01,
                period: 1.5,
            })
            .breakpoint(199)
            .build();
        let config = DetrendConfig {
            osigma: 1e3,
            kernel_params: Some(KernelParams::new(10.0, 100.0, 30.0)),
            ..fast_config()
        };
        let both = run(config.clone(), &pixel_bundle(&plc));
        assert_eq!(both.lambda.n_segments(), 2);
        for (segment, range) in [(0, 0..200), (1, 200..400)] {
            let alone = run(config.clone(), &rows(&plc, range));
            assert_eq!(both.lambda.get(segment, 0), alone.lambda.get(0, 0));
            assert_eq!(
                both.cv_curves[segment].validation,
                alone.cv_curves[0].validation
            );
        }
    }

    #[test]
    fn short_segment_is_discarded() {
        let plc = PixelLightCurveBuilder::new(200).breakpoint(194).build();
        let result = run(fast_config(), &pixel_bundle(&plc));
        assert_eq!(result.lambda.get(1, 0), Lambda::Discarded);
        assert!(matches!(result.lambda.get(0, 0), Lambda::Value(_)));
        assert!(result.segment_metrics.validation[1].is_nan());
        assert!(result.metrics.validation.is_finite());
        assert_eq!(result.cv_curves.len(), 1);
    }

    #[test]
    fn fully_masked_segment_keeps_zero_model() {
        let plc = lc_builder(300, 12).breakpoint(199).build();
        let quality = (0..300).map(|i| u32::from(i >= 200)).collect();
        let bundle = pixel_bundle(&plc).with_quality(quality);
        let result = run(fast_config(), &bundle);
        assert_eq!(result.lambda.get(1, 0), Lambda::Discarded);
        assert!(matches!(result.lambda.get(0, 0), Lambda::Value(_)));
        let offset = result.model[200];
        assert!(result.model.slice(ndarray::s![200..]).iter().all(|&m| m == offset));
        assert!(result.segment_metrics.detrended[1].is_nan());
        assert!(result.metrics.detrended.is_finite());
        assert!(result.metrics.detrended < 0.1 * result.metrics.raw);
    }

    #[test]
    fn padded_segments_are_stitched() {
        let plc = lc_builder(300, 2).breakpoint(149).build();
        let config = DetrendConfig {
            boundary_pad: 20,
            ..fast_config()
        };
        let result = run(config, &pixel_bundle(&plc));
        // No jump at the boundary beyond the noise
        let step = (result.flux[150] - result.flux[149]).abs();
        assert!(step < 10.0 * 1e5 * plc.noise);
        assert!(result.metrics.detrended < 0.1 * result.metrics.raw);
    }

    #[test]
    fn same_seed_same_result() {
        let bundle = pixel_bundle(&lc_builder(150, 4).build());
        let config = DetrendConfig {
            pld_order: 2,
            optimize_gp: true,
            giter: 1,
            gp_max_iters: 5,
            seed: Some(42),
            ..fast_config()
        };
        let a = run(config.clone(), &bundle);
        let b = run(config, &bundle);
        assert_eq!(a.lambda, b.lambda);
        assert_eq!(a.kernel, b.kernel);
        assert_eq!(a.outliers, b.outliers);
        assert_eq!(a.metrics.detrended, b.metrics.detrended);
        assert_eq!(a.outlier_reports.len(), 2);
    }

    #[test]
    fn neighbors_select_neighbor_pld() {
        let target = lc_builder(200, 5).build();
        let neighbor = lc_builder(200, 6).build();
        let norm = neighbor.raw_flux().insert_axis(Axis(1));
        let neighbors = (&neighbor.fpix / &norm)
            .outer_iter()
            .map(|row| row.to_vec())
            .collect();
        let bundle = pixel_bundle(&target).with_neighbors(neighbors);
        let config = DetrendConfig {
            pld_order: 2,
            ..fast_config()
        };
        let result = run(config, &bundle);
        assert_eq!(result.model_name, "nPLD");
        assert!(result.metrics.detrended < result.metrics.raw);
    }

    #[test]
    fn finalize_hook_masks_transits() {
        let plc = lc_builder(300, 7).build();
        let detrender = Detrender::new(fast_config(), &pixel_bundle(&plc)).unwrap();
        let result = detrender
            .run_with_finalize(|lc, flux| {
                assert_eq!(flux.len(), lc.len());
                lc.mask_transits(1.0, 2.0, 0.2);
                Ok(())
            })
            .unwrap();
        assert!(!result.transits.is_empty());
        for &i in &result.transits {
            assert!(!result.quality[i].is_good());
        }
    }

    #[test]
    fn finalize_error_propagates() {
        let plc = lc_builder(100, 8).build();
        let detrender = Detrender::new(fast_config(), &pixel_bundle(&plc)).unwrap();
        let result = detrender.run_with_finalize(|_, _| Err(DetrendError::Singular("hook")));
        assert_eq!(result.unwrap_err(), DetrendError::Singular("hook"));
    }

    #[test]
    fn short_cadence_inherits_kernel() {
        let parent = run(fast_config(), &pixel_bundle(&lc_builder(100, 9).build()));
        let config = fast_config().for_short_cadence(&parent);
        assert_eq!(config.kernel_params, Some(parent.kernel));
        assert_eq!(config.cadence, Cadence::Short);
        assert!(!config.optimize_gp);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn batch_continues_after_failure() {
        let good = pixel_bundle(&lc_builder(100, 10).build());
        let results = detrend_batch(&fast_config(), vec![
            ("empty", ObservationBundle::default()),
            ("good", good),
        ]);
        assert_eq!(results.len(), 2);
        let failure = results[0].as_ref().unwrap_err();
        assert_eq!(failure.target, "empty");
        assert_eq!(
            failure.error,
            DetrendError::Data(crate::error::DataError::Empty)
        );
        assert_eq!(failure.chain(), vec!["time series is empty".to_string()]);
        assert!(results[1].is_ok());
    }

    #[test]
    fn result_serializes() {
        let result = run(fast_config(), &pixel_bundle(&lc_builder(60, 11).build()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["model_name"], "rPLD");
        assert_eq!(json["lambda"].as_array().unwrap().len(), 1);
    }
}
