use ndarray::Array1;
use std::ops::Deref;

/// Ascending copy of the finite values of a sample
///
/// NaN values are dropped on construction, so every statistic here is "NaN-skipping".
// Underlying array is guaranteed to be sorted and contiguous
#[derive(Clone, Debug, PartialEq)]
pub struct SortedArray(Array1<f64>);

impl SortedArray {
    pub fn median(&self) -> f64 {
        if self.is_empty() {
            return f64::NAN;
        }
        let i = (self.len() - 1) / 2;
        if self.len() % 2 == 0 {
            0.5 * (self[i] + self[i + 1])
        } else {
            self[i]
        }
    }
}

impl From<Vec<f64>> for SortedArray {
    fn from(mut v: Vec<f64>) -> Self {
        v.retain(|x| !x.is_nan());
        v.sort_unstable_by(f64::total_cmp);
        Self(Array1::from_vec(v))
    }
}

impl From<&[f64]> for SortedArray {
    fn from(s: &[f64]) -> Self {
        s.to_vec().into()
    }
}

impl Deref for SortedArray {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        self.0.as_slice().unwrap()
    }
}
