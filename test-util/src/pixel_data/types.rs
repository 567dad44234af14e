use ndarray::{Array1, Array2, Axis};

// We cannot return `ObservationBundle`, because it would cause cyclic crate dependencies
#[derive(Clone, Debug)]
pub struct PixelLightCurve {
    pub time: Array1<f64>,
    /// Shape is `(cadences, pixels)`
    pub fpix: Array2<f64>,
    pub fpix_err: Array2<f64>,
    /// Last index of every segment but the final one
    pub breakpoints: Vec<usize>,
    /// Noise-free flux level
    pub flux0: f64,
    /// Injected relative noise level
    pub noise: f64,
}

impl PixelLightCurve {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn raw_flux(&self) -> Array1<f64> {
        self.fpix.sum_axis(Axis(1))
    }

    pub fn fpix_rows(&self) -> Vec<Vec<f64>> {
        self.fpix.outer_iter().map(|row| row.to_vec()).collect()
    }

    pub fn fpix_err_rows(&self) -> Vec<Vec<f64>> {
        self.fpix_err.outer_iter().map(|row| row.to_vec()).collect()
    }
}
