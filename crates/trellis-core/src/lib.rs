pub mod config;
pub mod error;
pub mod state;
pub mod traits;
pub mod types;
pub mod validation;

pub use config::TrellisConfig;
pub use error::{GraphBuildError, Result, TrellisError, ValidationError};
pub use state::{ExecutionState, QueryProfile};
pub use types::*;
pub use validation::{ValidationIssue, ValidationResult, ValidationSeverity};
