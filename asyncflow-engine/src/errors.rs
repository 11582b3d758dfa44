//! Error types for the simulation engine.
use thiserror::Error;

pub type Result<T, E = EngineError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] asyncflow_core::error::Error),
    /// A scheduling invariant was violated (e.g. a `Container` overflowed its
    /// capacity). `debug_assert!` catches these in debug builds; this variant
    /// is what a release build surfaces to the caller instead of aborting.
    #[error("scheduling invariant violated: {0}")]
    Invariant(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }
}
