pub mod cache;
pub mod config;
pub mod contour;
pub mod cutout;
pub mod error;
pub mod layers;
pub mod loader;
pub mod mask;
pub mod noise_field;
pub mod papercut;
pub mod rand;
pub mod raster;
pub mod smooth;

pub use error::{PapercutError, Result};
