//! Error types shared by the lifecycle engine, scheduler and result pipeline.

use std::fmt;

use crate::model::VersionStatus;

/// Errors surfaced by core operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreError {
    /// The project, version or artifact does not exist.
    NotFound(String),

    /// Malformed identifiers, settings or configuration.
    Validation(String),

    /// The version's current status does not allow starting a run.
    NotRunnable(VersionStatus),

    /// The scheduler's pending queue is at capacity.
    QueueFull,

    /// The stored setup could not be converted into execution inputs.
    Conversion(String),

    /// Raw simulation output could not be parsed into a structured result.
    Parse(String),

    /// The document store failed.
    Persistence(String),

    /// Internal error occurred.
    Internal(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "Not found: {}", what),
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
            Self::NotRunnable(VersionStatus::Running) => {
                write!(f, "The simulation is running already")
            }
            Self::NotRunnable(status) => write!(
                f,
                "Can not run simulation due to bad version state: {}",
                status
            ),
            Self::QueueFull => write!(f, "Too many jobs pending"),
            Self::Conversion(msg) => write!(f, "Model conversion failed: {}", msg),
            Self::Parse(msg) => write!(f, "Result parsing failed: {}", msg),
            Self::Persistence(msg) => write!(f, "Database error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<surrealdb::Error> for CoreError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl CoreError {
    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
