//! Semantic workflow validation.
//!
//! Validators are independent rule engines. They see agent names and a
//! pattern name only, never the pattern objects themselves.

pub mod conditional;
pub mod domain;
pub mod validator;

pub use conditional::ConditionalPatternValidator;
pub use domain::DomainWorkflowValidator;
pub use validator::{
    base_checks, BasicWorkflowValidator, RoutingConstraints, ValidationContext, WorkflowValidator,
};
