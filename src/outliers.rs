//! Iterative sigma clipping interleaved with model refits

use crate::array_stats::{median, robust_sigma};
use crate::error::DetrendError;
use crate::savgol::flatten;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How the outlier loop stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum OutlierTermination {
    /// The outlier set did not change
    Converged,
    /// Iteration limit reached
    IterationCap,
    /// The outlier set returned to an earlier state
    Cycle,
}

/// Summary of an outlier loop
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutlierReport {
    /// Number of model refits performed
    pub iterations: usize,
    pub termination: OutlierTermination,
    /// Final outlier set, sorted cadence indices
    pub outliers: Vec<usize>,
}

/// Cadences beyond `osigma` robust standard deviations of the flattened flux
///
/// `excluded` cadences take no part in the statistics and are never flagged. Nothing is flagged
/// when the robust standard deviation vanishes.
pub fn sigma_clip(flux: &[f64], excluded: &[bool], osigma: f64, window: usize) -> Vec<usize> {
    let idx: Vec<usize> = (0..flux.len()).filter(|&i| !excluded[i]).collect();
    let kept: Vec<f64> = idx.iter().map(|&i| flux[i]).collect();
    let f = flatten(&kept, window);
    let med = median(&f);
    let sigma = robust_sigma(&f);
    if !(sigma.is_finite() && sigma > 0.0) {
        return vec![];
    }
    idx.into_iter()
        .zip(f)
        .filter(|&(_, value)| f64::abs(value - med) > osigma * sigma)
        .map(|(i, _)| i)
        .collect()
}

/// Fixed-point iteration of the outlier set
#[derive(Clone, Debug)]
pub struct OutlierFilter {
    pub osigma: f64,
    pub oiter: usize,
}

impl OutlierFilter {
    /// Iterate `step` from `initial` until the outlier set stops changing
    ///
    /// `step` receives the current outlier set, refits the model with it masked and returns the
    /// new set. The loop also stops, with a warning, when more than `oiter` sets were seen or when
    /// a set repeats an earlier one. Only errors of `step` are propagated.
    pub fn run<F>(&self, initial: Vec<usize>, mut step: F) -> Result<OutlierReport, DetrendError>
    where
        F: FnMut(&[usize]) -> Result<Vec<usize>, DetrendError>,
    {
        log::info!("Clipping outliers...");
        log::info!("Iter {}/{}: {} outliers", 0, self.oiter, initial.len());
        let mut history = vec![initial];
        let termination = loop {
            let n = history.len();
            let current = &history[n - 1];
            if n >= 2 && history[n - 2] == *current {
                break OutlierTermination::Converged;
            }
            if n > self.oiter {
                log::warn!("Maximum number of outlier iterations exceeded. Skipping...");
                break OutlierTermination::IterationCap;
            }
            if history[..n - 1].contains(current) {
                log::warn!("Outlier clipping is going in circles. Skipping...");
                break OutlierTermination::Cycle;
            }
            let next = step(current)?;
            log::info!("Iter {}/{}: {} outliers", n, self.oiter, next.len());
            history.push(next);
        };
        let iterations = history.len() - 1;
        let outliers = history.pop().unwrap_or_default();
        Ok(OutlierReport {
            iterations,
            termination,
            outliers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tests::*;

    fn filter(oiter: usize) -> OutlierFilter {
        OutlierFilter { osigma: 5.0, oiter }
    }

    #[test]
    fn spike_is_clipped() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut flux = (normal_array(&mut rng, 300, 1.0) + 100.0).to_vec();
        flux[120] += 20.0;
        flux[7] = 1e6;
        let mut excluded = vec![false; 300];
        excluded[7] = true;
        assert_eq!(sigma_clip(&flux, &excluded, 5.0, 49), vec![120]);
    }

    #[test]
    fn constant_flux_has_no_outliers() {
        let flux = vec![3.0; 100];
        assert!(sigma_clip(&flux, &[false; 100], 5.0, 49).is_empty());
    }

    #[test]
    fn converges_to_fixed_point() {
        let report = filter(10)
            .run(vec![], |current| Ok(if current.is_empty() { vec![3] } else { vec![3, 5] }))
            .unwrap();
        // [] -> [3] -> [3, 5] -> [3, 5]
        assert_eq!(report.termination, OutlierTermination::Converged);
        assert_eq!(report.outliers, vec![3, 5]);
        assert_eq!(report.iterations, 3);
    }

    #[test]
    fn fixed_point_is_idempotent() {
        let step = |current: &[usize]| -> Result<Vec<usize>, DetrendError> {
            let mut next: Vec<usize> = current.iter().copied().filter(|&i| i < 4).collect();
            next.extend([1, 2]);
            next.sort_unstable();
            next.dedup();
            Ok(next)
        };
        let first = filter(10).run(vec![0, 7], step).unwrap();
        let second = filter(10).run(first.outliers.clone(), step).unwrap();
        assert_eq!(second.outliers, first.outliers);
        assert_eq!(second.iterations, 1);
        assert_eq!(second.termination, OutlierTermination::Converged);
    }

    #[test]
    fn cycle_is_detected() {
        let report = filter(10)
            .run(vec![1], |current| {
                Ok(if current == [1] { vec![2] } else { vec![1] })
            })
            .unwrap();
        // [1] -> [2] -> [1]
        assert_eq!(report.termination, OutlierTermination::Cycle);
        assert_eq!(report.iterations, 2);
    }

    #[test]
    fn iteration_cap() {
        let report = filter(3)
            .run(vec![0], |current| Ok(vec![current[0] + 1]))
            .unwrap();
        assert_eq!(report.termination, OutlierTermination::IterationCap);
        assert_eq!(report.outliers, vec![3]);
    }

    #[test]
    fn step_error_propagates() {
        let result = filter(3).run(vec![], |_| Err(DetrendError::Singular("test")));
        assert_eq!(result, Err(DetrendError::Singular("test")));
    }
}
