mod bundle;
pub use bundle::ObservationBundle;

mod light_curve;
pub use light_curve::LightCurve;

mod quality;
pub use quality::QualityFlags;

mod segments;
pub use segments::{END_OF_SERIES, Segments};
