use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-cadence quality flags, a set of the reasons the cadence is excluded from fitting
    ///
    /// Serialized as the flag names in human-readable formats and as raw bits otherwise.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct QualityFlags: u8 {
        /// Non-finite pixel value, the pixel values were interpolated
        const NAN = 1;
        /// Flagged by the instrument
        const BAD = 1 << 1;
        /// Statistical outlier of the current model
        const OUTLIER = 1 << 2;
        /// Manually masked, usually an in-transit cadence
        const TRANSIT = 1 << 3;
    }
}

impl QualityFlags {
    pub const GOOD: Self = Self::empty();

    pub const fn is_good(self) -> bool {
        self.is_empty()
    }
}

impl Default for QualityFlags {
    fn default() -> Self {
        Self::GOOD
    }
}
