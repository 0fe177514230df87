use thiserror::Error;

use crate::validation::ValidationResult;

/// Semantic validation failed with at least one ERROR-severity issue.
///
/// Carries the full result so callers can log every issue, not just the first.
#[derive(Debug, Clone, Error)]
#[error(
    "Workflow validation failed for pattern '{pattern}' with agents {agents:?}: {}",
    .result.errors().join("; ")
)]
pub struct ValidationError {
    pub pattern: String,
    pub agents: Vec<String>,
    pub result: ValidationResult,
}

impl ValidationError {
    pub fn new(pattern: impl Into<String>, agents: Vec<String>, result: ValidationResult) -> Self {
        Self {
            pattern: pattern.into(),
            agents,
            result,
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphBuildError {
    #[error("Unknown graph pattern '{pattern}' (available: {})", .available.join(", "))]
    PatternNotFound {
        pattern: String,
        available: Vec<String>,
    },

    #[error("Unknown agent: {agent}")]
    UnknownAgent { agent: String },

    #[error("Graph invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Graph compilation failed: {0}")]
    Compilation(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl GraphBuildError {
    /// The validation result, when this is a validation failure.
    pub fn validation_result(&self) -> Option<&ValidationResult> {
        match self {
            GraphBuildError::Validation(e) => Some(&e.result),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum TrellisError {
    // Build errors
    #[error(transparent)]
    Build(#[from] GraphBuildError),

    // Execution errors
    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Graph exceeded recursion limit ({0} supersteps)")]
    RecursionLimit(usize),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;
