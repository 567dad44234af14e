use criterion::Criterion;
use light_curve_detrend::{DetrendConfig, Detrender, NoiseMetric, ObservationBundle};
use light_curve_detrend_test_util::{PixelLightCurveBuilder, Systematics};
use std::hint::black_box;

fn bundle(n: usize) -> ObservationBundle {
    let plc = PixelLightCurveBuilder::new(n)
        .systematics(Systematics {
            cadences: 0..n,
            amplitude: 0.01,
            period: 1.5,
        })
        .build();
    ObservationBundle::new(plc.time.to_vec(), plc.fpix_rows(), plc.fpix_err_rows())
}

pub fn bench_detrend(c: &mut Criterion) {
    const COUNTS: [usize; 2] = [200, 500];

    for &n in COUNTS.iter() {
        let bundle = bundle(n);
        for pld_order in [1, 2] {
            let config = DetrendConfig {
                pld_order,
                lambda_grid: vec![1e2, 1e4, 1e6, 1e8, 1e10],
                giter: 1,
                gp_max_iters: 20,
                seed: Some(0),
                ..DetrendConfig::default()
            };
            c.bench_function(format!("rPLD order {pld_order}, {n} cadences").as_str(), |b| {
                b.iter(|| {
                    Detrender::new(black_box(config.clone()), black_box(&bundle))
                        .unwrap()
                        .run()
                        .unwrap()
                })
            });
        }
    }

    let flux = bundle(4000).time.iter().map(|t| 1.0 + 1e-4 * t.sin()).collect::<Vec<_>>();
    for metric in [NoiseMetric::Scatter, NoiseMetric::CDPP6_LONG] {
        c.bench_function(format!("{metric:?} of 4000 cadences").as_str(), |b| {
            b.iter(|| metric.compute(black_box(&flux), 49))
        });
    }
}
