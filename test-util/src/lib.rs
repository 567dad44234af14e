pub use pixel_data::{PixelLightCurve, PixelLightCurveBuilder, Systematics};

mod pixel_data;
