use crate::array_stats::{median, median_chunk_std, robust_sigma, std};
use crate::gp::kernel::KernelParams;
use crate::gp::likelihood::GpLikelihood;
use crate::savgol::flatten;

use argmin::core::{CostFunction, Error as ArgminError, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use ndarray::{Array1, ArrayView1};
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::cell::RefCell;

type Param = Vec<f64>;
type LineSearch = MoreThuenteLineSearch<Param, Param, f64>;
type Lbfgs = LBFGS<LineSearch, Param, Param, f64>;

const LBFGS_MEMORY: usize = 7;
/// Chunk size of the white-noise estimate
pub const WHITE_NOISE_CHUNK: usize = 13;
const CLIP_SIGMA: f64 = 5.0;
const JITTER_TRIES: usize = 100;

/// Box constraints of `(white, amp, tau)` around a guess
pub fn kernel_bounds(guess: &KernelParams) -> [(f64, f64); 3] {
    [
        (0.1 * guess.white, 10.0 * guess.white),
        (1.0, f64::max(10_000.0 * guess.amp, 1.0)),
        (0.5, 100.0),
    ]
}

fn sigmoid(u: f64) -> f64 {
    1.0 / (1.0 + f64::exp(-u))
}

/// Lowest cost evaluated by a solver run, kept when the run fails
type BestSeen = RefCell<Option<(KernelParams, f64)>>;

/// Maps the unconstrained `u ∈ ℝ³` of the quasi-Newton solver into the bounds box
#[derive(Clone, Debug)]
struct BoundedLikelihood<'a> {
    likelihood: &'a GpLikelihood,
    bounds: [(f64, f64); 3],
    best_seen: Option<&'a BestSeen>,
}

impl BoundedLikelihood<'_> {
    fn to_params(&self, u: &[f64]) -> KernelParams {
        let mut x = [0.0; 3];
        for ((x, &u), &(lo, hi)) in x.iter_mut().zip(u).zip(&self.bounds) {
            *x = lo + (hi - lo) * sigmoid(u);
        }
        KernelParams::from_array(x)
    }

    fn to_unbounded(&self, params: &KernelParams) -> Param {
        params
            .to_array()
            .iter()
            .zip(&self.bounds)
            .map(|(&x, &(lo, hi))| {
                let p = ((x - lo) / (hi - lo)).clamp(1e-6, 1.0 - 1e-6);
                f64::ln(p / (1.0 - p))
            })
            .collect()
    }
}

impl CostFunction for BoundedLikelihood<'_> {
    type Param = Param;
    type Output = f64;

    fn cost(&self, u: &Self::Param) -> Result<Self::Output, ArgminError> {
        let params = self.to_params(u);
        let cost = -self.likelihood.ln_likelihood(&params)?;
        if let Some(best_seen) = self.best_seen {
            let mut best = best_seen.borrow_mut();
            match *best {
                Some((_, c)) if c <= cost => {}
                _ if cost.is_finite() => *best = Some((params, cost)),
                _ => {}
            }
        }
        Ok(cost)
    }
}

impl Gradient for BoundedLikelihood<'_> {
    type Param = Param;
    type Gradient = Param;

    fn gradient(&self, u: &Self::Param) -> Result<Self::Gradient, ArgminError> {
        let (_, grad) = self
            .likelihood
            .ln_likelihood_with_gradient(&self.to_params(u))?;
        Ok(grad
            .iter()
            .zip(u)
            .zip(&self.bounds)
            .map(|((&g, &u), &(lo, hi))| {
                let s = sigmoid(u);
                -g * (hi - lo) * s * (1.0 - s)
            })
            .collect())
    }
}

/// Maximum-likelihood fit of the GP noise hyperparameters with randomized restarts
#[derive(Clone, Debug)]
pub struct KernelOptimizer {
    pub restarts: usize,
    pub max_iters: u64,
    pub savgol_window: usize,
}

/// Light curve prepared for the kernel fit
#[derive(Clone, Debug)]
struct KernelData {
    time: Array1<f64>,
    flux: Array1<f64>,
    errors: Array1<f64>,
}

impl KernelOptimizer {
    /// Drop masked cadences and 5-sigma outliers of the flattened light curve
    fn prepare(
        &self,
        time: ArrayView1<f64>,
        flux: ArrayView1<f64>,
        errors: ArrayView1<f64>,
        mask: &[usize],
    ) -> KernelData {
        let mut keep = vec![true; time.len()];
        for &i in mask {
            keep[i] = false;
        }
        let idx: Vec<usize> = (0..time.len()).filter(|&i| keep[i]).collect();
        let kept_flux: Vec<f64> = idx.iter().map(|&i| flux[i]).collect();

        let flat = flatten(&kept_flux, self.savgol_window);
        let med = median(&flat);
        let sigma = robust_sigma(&flat);
        let idx: Vec<usize> = if sigma.is_finite() && sigma > 0.0 {
            idx.into_iter()
                .zip(&flat)
                .filter(|&(_, &f)| f64::abs(f - med) <= CLIP_SIGMA * sigma)
                .map(|(i, _)| i)
                .collect()
        } else {
            idx
        };

        KernelData {
            time: idx.iter().map(|&i| time[i]).collect(),
            flux: idx.iter().map(|&i| flux[i]).collect(),
            errors: idx.iter().map(|&i| errors[i]).collect(),
        }
    }

    /// Perturb every parameter by a Gaussian 50% jitter, staying within the bounds
    fn jitter(guess: &KernelParams, bounds: &[(f64, f64); 3], rng: &mut StdRng) -> KernelParams {
        let mut x = guess.to_array();
        for (x, &(lo, hi)) in x.iter_mut().zip(bounds) {
            let g = *x;
            let draw = (0..JITTER_TRIES)
                .map(|_| (1.0 + 0.5 * rng.sample::<f64, _>(StandardNormal)) * g)
                .find(|v| (lo..=hi).contains(v));
            *x = draw.unwrap_or_else(|| lo + rng.random::<f64>() * (hi - lo));
        }
        KernelParams::from_array(x)
    }

    /// Single L-BFGS run from `start`, returns the best point and its log-likelihood
    ///
    /// A run failing midway falls back to the best point it evaluated.
    fn run_attempt(
        &self,
        likelihood: &GpLikelihood,
        bounds: [(f64, f64); 3],
        start: &KernelParams,
    ) -> Result<(KernelParams, f64), ArgminError> {
        let best_seen = BestSeen::default();
        let problem = BoundedLikelihood {
            likelihood,
            bounds,
            best_seen: Some(&best_seen),
        };
        let u0 = problem.to_unbounded(start);
        let bounded = problem.clone();
        let solver: Lbfgs = LBFGS::new(MoreThuenteLineSearch::new(), LBFGS_MEMORY);
        match Executor::new(problem, solver)
            .configure(|state| state.param(u0).max_iters(self.max_iters))
            .run()
        {
            Ok(result) => {
                let state = result.state();
                let best = state
                    .get_best_param()
                    .ok_or_else(|| ArgminError::msg("optimizer returned no parameters"))?;
                Ok((bounded.to_params(best), -state.get_best_cost()))
            }
            Err(error) => match best_seen.take() {
                Some((params, cost)) => {
                    log::warn!(
                        "GP optimization stopped early: {error}, keeping ln L = {:.3e}",
                        -cost
                    );
                    Ok((params, -cost))
                }
                None => Err(error),
            },
        }
    }

    /// Fit `(white, amp, tau)` to the light curve
    ///
    /// `mask` holds the cadences to ignore. Without a `guess`, the initial point is estimated from
    /// the data: the median of the 13-cadence chunk standard deviations, the standard deviation
    /// and a 30 time units timescale. Never fails: the best point seen is returned, the guess
    /// itself when no attempt succeeded.
    pub fn optimize(
        &self,
        time: ArrayView1<f64>,
        flux: ArrayView1<f64>,
        errors: ArrayView1<f64>,
        mask: &[usize],
        guess: Option<KernelParams>,
        rng: &mut StdRng,
    ) -> KernelParams {
        log::info!("Optimizing the GP...");
        let data = self.prepare(time, flux, errors, mask);
        let flux_slice = data.flux.to_vec();
        let guess = guess.unwrap_or_else(|| {
            KernelParams::new(
                median_chunk_std(&flux_slice, WHITE_NOISE_CHUNK),
                std(&flux_slice),
                KernelParams::default_tau(),
            )
        });
        if data.flux.len() < 2 || !guess.is_valid() {
            log::warn!("Cannot optimize the GP on this data, keeping {guess:?}");
            return guess;
        }

        let y = &data.flux - median(&flux_slice);
        let likelihood = match GpLikelihood::new(data.time.view(), y.view(), data.errors.view()) {
            Ok(likelihood) => likelihood,
            Err(error) => {
                log::warn!("Cannot optimize the GP: {error}, keeping {guess:?}");
                return guess;
            }
        };
        let bounds = kernel_bounds(&guess);

        let mut best = (guess, likelihood.ln_likelihood(&guess).unwrap_or(f64::NEG_INFINITY));
        for attempt in 0..self.restarts {
            let start = Self::jitter(&guess, &bounds, rng);
            match self.run_attempt(&likelihood, bounds, &start) {
                Ok((params, ln_l)) => {
                    log::info!(
                        "GP attempt {}/{}: ln L = {:.3e}, white = {:.3e}, amp = {:.3e}, tau = {:.2}",
                        attempt + 1,
                        self.restarts,
                        ln_l,
                        params.white,
                        params.amp,
                        params.tau,
                    );
                    if ln_l > best.1 {
                        best = (params, ln_l);
                    }
                }
                Err(error) => {
                    log::warn!("GP attempt {}/{} failed: {error}", attempt + 1, self.restarts);
                }
            }
        }
        best.0
    }
}
