//! Error types for the sampler layer.
use thiserror::Error;

pub type Result<T, E = SamplerError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("invalid distribution parameters: {0}")]
    InvalidParameters(String),
}

impl SamplerError {
    pub fn invalid_parameters(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }
}
