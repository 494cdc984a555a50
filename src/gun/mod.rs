mod caliber;
mod cartridge;
mod feature;
mod magazine;


pub use caliber::{Caliber, Scalar};
pub use cartridge::{Cartridge, DEFAULT_SUCCESS_CODES, Method};
pub use feature::Feature;
pub use magazine::Magazine;
