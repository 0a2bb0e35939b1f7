//! Error taxonomy shared by the pool, executor, control plane and resolver.

use thiserror::Error;

/// Failures raised by the browser resource pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Browser pool initialization failed: {0}")]
    Initialization(String),

    #[error("Failed to create browser session: {0}")]
    Session(String),

    #[error("Browser pool has been shut down")]
    ShutDown,
}

impl PoolError {
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::Initialization(_) => "pool_initialization",
            PoolError::Session(_) => "session_creation",
            PoolError::ShutDown => "pool_shut_down",
        }
    }
}

/// Failure of a single step attempt.
///
/// `ElementNotFound` means no locator resolved at all, while
/// `ActionTimeout` means an element was found but could not be acted on.
/// The healer picks different remedies for the two.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    #[error("Element not found: {target}")]
    ElementNotFound { target: String, tried: Vec<String> },

    #[error("Timed out acting on '{locator}': {detail}")]
    ActionTimeout { locator: String, detail: String },

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("{0}")]
    Driver(String),
}

impl StepError {
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::ElementNotFound { .. } => "element_not_found",
            StepError::ActionTimeout { .. } => "action_timeout",
            StepError::VerificationFailed(_) => "verification_failed",
            StepError::Navigation(_) => "navigation",
            StepError::InvalidStep(_) => "invalid_step",
            StepError::Driver(_) => "driver",
        }
    }

    /// Malformed steps are a producer bug, never something to heal.
    pub fn is_healable(&self) -> bool {
        !matches!(self, StepError::InvalidStep(_))
    }

    /// Classify a raw driver failure for a located element.
    pub fn from_driver(locator: &str, err: anyhow::Error) -> Self {
        let detail = format!("{:#}", err);
        let lower = detail.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            StepError::ActionTimeout {
                locator: locator.to_string(),
                detail,
            }
        } else {
            StepError::Driver(detail)
        }
    }
}

/// Conditions that terminate a whole run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Session requires re-authentication (redirected to {url})")]
    AuthenticationRequired { step_id: u32, url: String },

    #[error("Execution stopped by user")]
    UserCancelled,

    #[error("Critical step {step_id} failed: {error}")]
    CriticalStepFailed { step_id: u32, error: String },
}

impl RunError {
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Pool(e) => e.kind(),
            RunError::AuthenticationRequired { .. } => "authentication_required",
            RunError::UserCancelled => "user_cancelled",
            RunError::CriticalStepFailed { .. } => "critical_step_failed",
        }
    }

    pub fn step_id(&self) -> Option<u32> {
        match self {
            RunError::AuthenticationRequired { step_id, .. }
            | RunError::CriticalStepFailed { step_id, .. } => Some(*step_id),
            _ => None,
        }
    }
}

/// Rejections from the run control surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("Run {active_run} is already active for session '{session_key}'")]
    Conflict {
        session_key: String,
        active_run: String,
    },

    #[error("Duplicate start request for session '{session_key}' ignored")]
    Debounced { session_key: String },

    #[error("Run not found: {0}")]
    NotFound(String),

    #[error("Control plane is shut down")]
    ShutDown,
}

impl ControlError {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::Conflict { .. } => "conflict",
            ControlError::Debounced { .. } => "debounced",
            ControlError::NotFound(_) => "not_found",
            ControlError::ShutDown => "shut_down",
        }
    }
}

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub workflow_id: String,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.workflow_id, self.field, self.message)
    }
}

/// Failures raised while expanding a composite workflow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Workflow '{workflow}' requires unknown prerequisite '{prerequisite}'")]
    UnknownPrerequisite {
        workflow: String,
        prerequisite: String,
    },

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Field validation failed: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),
}

impl ResolveError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::UnknownWorkflow(_) => "unknown_workflow",
            ResolveError::UnknownPrerequisite { .. } => "unknown_prerequisite",
            ResolveError::Cycle(_) => "dependency_cycle",
            ResolveError::Validation(_) => "validation",
        }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_timeout_is_classified_as_action_timeout() {
        let err = StepError::from_driver("#save", anyhow::anyhow!("Timeout 180000ms exceeded"));
        assert_eq!(err.kind(), "action_timeout");
        assert!(err.to_string().contains("#save"));

        let other = StepError::from_driver("#save", anyhow::anyhow!("Element is detached"));
        assert_eq!(other.kind(), "driver");
    }

    #[test]
    fn test_element_not_found_message_omits_tried_locators() {
        let err = StepError::ElementNotFound {
            target: "username field".into(),
            tried: vec![".modal-username".into()],
        };
        assert_eq!(err.to_string(), "Element not found: username field");
    }

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = ResolveError::Validation(vec![
            FieldError {
                workflow_id: "create_vm".into(),
                field: "cpu".into(),
                message: "CPU must be at least 1".into(),
            },
            FieldError {
                workflow_id: "global".into(),
                field: "target_url".into(),
                message: "Target URL is required".into(),
            },
        ]);
        let text = err.to_string();
        assert!(text.contains("create_vm.cpu"));
        assert!(text.contains("global.target_url"));
        assert_eq!(err.kind(), "validation");
    }
}
