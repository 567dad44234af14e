mod builder;
pub use builder::{PixelLightCurveBuilder, Systematics};

mod types;
pub use types::PixelLightCurve;
