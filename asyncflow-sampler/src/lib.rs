#![forbid(unsafe_code)]

//! Stochastic sampler layer: scalar distributions and the compound
//! inter-arrival process that drives request generation.

pub mod arrivals;
pub mod distributions;
pub mod errors;

pub use arrivals::InterArrivalProcess;
pub use errors::{Result, SamplerError};
