use crate::pixel_data::PixelLightCurve;

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::f64::consts::PI;
use std::ops::Range;

/// Pointing-jitter systematics active over a range of cadences
///
/// The star drifts across the aperture: pixel fractions change linearly with the drift `x(t)`
/// and the summed flux is multiplied by `1 + amplitude * x(t)`, so first-order pixel
/// decorrelation can remove the signal completely.
#[derive(Clone, Debug)]
pub struct Systematics {
    pub cadences: Range<usize>,
    pub amplitude: f64,
    /// Main drift period in time units
    pub period: f64,
}

impl Systematics {
    fn drift(&self, t: f64) -> f64 {
        f64::sin(2.0 * PI * t / self.period) + 0.5 * f64::sin(2.0 * PI * 3.7 * t / self.period)
    }
}

/// Builder of synthetic pixel-level light curves
#[derive(Clone, Debug)]
pub struct PixelLightCurveBuilder {
    n: usize,
    npix: usize,
    cadence: f64,
    flux0: f64,
    noise: f64,
    seed: u64,
    systematics: Vec<Systematics>,
    spikes: Vec<(usize, f64)>,
    breakpoints: Vec<usize>,
}

impl Default for PixelLightCurveBuilder {
    fn default() -> Self {
        Self {
            n: 1000,
            npix: 4,
            // Thirty minutes in days
            cadence: 0.0204,
            flux0: 1e5,
            noise: 1e-4,
            seed: 0,
            systematics: vec![],
            spikes: vec![],
            breakpoints: vec![],
        }
    }
}

impl PixelLightCurveBuilder {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            ..Self::default()
        }
    }

    pub fn pixels(mut self, npix: usize) -> Self {
        assert!(npix >= 2, "at least two pixels are required");
        self.npix = npix;
        self
    }

    /// Relative Gaussian noise of the summed flux, e.g. `1e-4` for 100 ppm
    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn systematics(mut self, systematics: Systematics) -> Self {
        self.systematics.push(systematics);
        self
    }

    /// Add `n_sigma` noise standard deviations to the summed flux at cadence `i`
    pub fn spike(mut self, i: usize, n_sigma: f64) -> Self {
        self.spikes.push((i, n_sigma));
        self
    }

    pub fn breakpoint(mut self, i: usize) -> Self {
        self.breakpoints.push(i);
        self
    }

    fn base_fractions(&self) -> Vec<f64> {
        let raw: Vec<f64> = (0..self.npix).map(|i| 1.0 + 0.5 * (i % 3) as f64).collect();
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|x| x / total).collect()
    }

    /// Drift response of every pixel, orthogonal to the base fractions so that the fractions
    /// always sum to unity
    fn drift_pattern(&self, base: &[f64]) -> Vec<f64> {
        let signs: Vec<f64> = (0..self.npix)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let weighted: f64 = base.iter().zip(&signs).map(|(b, s)| b * s).sum();
        signs.iter().map(|s| s - weighted).collect()
    }

    pub fn build(self) -> PixelLightCurve {
        let mut rng = StdRng::seed_from_u64(self.seed);

        let base = self.base_fractions();
        let pattern = self.drift_pattern(&base);
        let pix_sigma = self.noise * self.flux0 / (self.npix as f64).sqrt();

        let time = Array1::from_shape_fn(self.n, |i| i as f64 * self.cadence);
        let mut fpix = Array2::zeros((self.n, self.npix));
        for (i, &t) in time.iter().enumerate() {
            let mut flux = self.flux0;
            let mut x = 0.0;
            for sys in self.systematics.iter() {
                if sys.cadences.contains(&i) {
                    let d = sys.drift(t);
                    flux *= 1.0 + sys.amplitude * d;
                    x += d;
                }
            }
            for &(j, n_sigma) in self.spikes.iter() {
                if j == i {
                    flux += n_sigma * self.noise * self.flux0;
                }
            }
            for p in 0..self.npix {
                let fraction = base[p] * (1.0 + 0.2 * pattern[p] * x);
                let eps: f64 = rng.sample(StandardNormal);
                fpix[[i, p]] = flux * fraction + pix_sigma * eps;
            }
        }
        let fpix_err = Array2::from_elem((self.n, self.npix), pix_sigma);

        PixelLightCurve {
            time,
            fpix,
            fpix_err,
            breakpoints: self.breakpoints,
            flux0: self.flux0,
            noise: self.noise,
        }
    }
}
