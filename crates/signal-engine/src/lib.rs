pub mod generator;
pub mod indicators;


pub use generator::*;
pub use indicators::*;
