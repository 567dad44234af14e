use crate::data::{LightCurve, ObservationBundle};

pub use light_curve_detrend_test_util::{PixelLightCurve, PixelLightCurveBuilder, Systematics};
pub use ndarray::Array1;
pub use rand::prelude::*;
pub use rand_distr::StandardNormal;

pub fn uniform_array(rng: &mut StdRng, n: usize, lo: f64, hi: f64) -> Array1<f64> {
    (0..n).map(|_| rng.random_range(lo..hi)).collect()
}

pub fn sorted_uniform(rng: &mut StdRng, n: usize, lo: f64, hi: f64) -> Array1<f64> {
    let mut x = uniform_array(rng, n, lo, hi).to_vec();
    x.sort_unstable_by(|a, b| a.total_cmp(b));
    Array1::from(x)
}

pub fn normal_array(rng: &mut StdRng, n: usize, sigma: f64) -> Array1<f64> {
    (0..n)
        .map(|_| sigma * rng.sample::<f64, _>(StandardNormal))
        .collect()
}

/// Four-pixel light curve with pointing jitter over all cadences
pub fn lc_builder(n: usize, seed: u64) -> PixelLightCurveBuilder {
    PixelLightCurveBuilder::new(n)
        .seed(seed)
        .systematics(Systematics {
            cadences: 0..n,
            amplitude: 0.01,
            period: 1.5,
        })
}

pub fn pixel_bundle(plc: &PixelLightCurve) -> ObservationBundle {
    ObservationBundle::new(plc.time.to_vec(), plc.fpix_rows(), plc.fpix_err_rows())
        .with_breakpoints(plc.breakpoints.clone())
}

pub fn jittery_light_curve(n: usize, seed: u64) -> LightCurve {
    LightCurve::new(&pixel_bundle(&lc_builder(n, seed).build()), 0).unwrap()
}
