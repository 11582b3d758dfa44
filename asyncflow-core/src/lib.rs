#![forbid(unsafe_code)]

//! Data model, scenario schema, and validation for AsyncFlow.
//!
//! This crate is intentionally inert: it holds no clock, no RNG, no I/O. It
//! describes the shape of a scenario (`schema`), the validated form engines
//! consume (`model`), and the pass between them (`validate`). Everything that
//! actually runs a simulation lives in `asyncflow-engine`.

pub mod error;
pub mod model;
pub mod schema;
pub mod validate;

pub use error::{Error, Result, ValidationError};
pub use validate::validate;
