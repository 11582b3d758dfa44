use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A single validation failure, anchored to the dotted field path that produced it.
///
/// Field paths mirror the shape of the scenario payload, e.g.
/// `topology_graph.edges[2].latency.mean`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("parsing scenario: {0}")]
    Parse(String),
    #[error("{} validation error(s)", .0.len())]
    Validation(Vec<ValidationError>),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(errors: Vec<ValidationError>) -> Self {
        Self::Validation(errors)
    }

    /// The individual field-level failures, when this is a `Validation` error.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}
