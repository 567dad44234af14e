use criterion::Criterion;
use light_curve_detrend::pld::pixel_fractions;
use light_curve_detrend::{
    KernelParams, Lambda, LightCurve, ModelContext, ObservationBundle, PldBasis,
};
use light_curve_detrend_test_util::PixelLightCurveBuilder;
use std::hint::black_box;

pub fn bench_regression(c: &mut Criterion) {
    const COUNTS: [usize; 3] = [100, 300, 1000];

    for &n in COUNTS.iter() {
        let plc = PixelLightCurveBuilder::new(n).pixels(9).build();
        let bundle =
            ObservationBundle::new(plc.time.to_vec(), plc.fpix_rows(), plc.fpix_err_rows());
        let lc = LightCurve::new(&bundle, 0).unwrap();
        let fractions = pixel_fractions(lc.fpix(), lc.fraw());
        let basis = PldBasis::regular();
        let kernel = KernelParams::new(10.0, 100.0, 30.0);
        let ctx = ModelContext {
            lc: &lc,
            basis: &basis,
            fractions: fractions.view(),
            kernel: &kernel,
        };
        let lambdas = [Lambda::Value(1e6), Lambda::Value(1e4)];

        c.bench_function(format!("Second order design, {n} cadences").as_str(), |b| {
            b.iter(|| ctx.production_design(0, black_box(2)))
        });
        let system = ctx.production_design(0, 2).system(&[]);
        c.bench_function(format!("Second order solve, {n} cadences").as_str(), |b| {
            b.iter(|| system.compute(black_box(&lambdas)).unwrap())
        });
    }
}
