//! Reusable workflow templates and their expansion into composite step
//! sequences.

pub mod registry;
pub mod resolver;
pub mod types;
pub mod validate;

pub use registry::{default_global_fields, WorkflowRegistry, AUTH_WORKFLOW_ID};
pub use resolver::{substitute, WorkflowResolver};
pub use types::{
    DependencyQuestion, EnhancedWorkflow, FieldDef, FieldType, FieldValidation, StepTemplate,
    WorkflowSummary, WorkflowTemplate,
};
pub use validate::validate_field;
