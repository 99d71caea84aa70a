//! Post-processing effects

mod tonemapping;

pub use tonemapping::{TonemapOperator, TonemapParams, TonemappingPass};
