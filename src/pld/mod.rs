//! Pixel-level decorrelation design matrices

mod design;
pub use design::{DesignMatrixTrait, PldBasis, multisets, pixel_fractions, pixel_products};

mod neighbor;
pub use neighbor::NeighborPld;

mod regular;
pub use regular::RegularPld;
