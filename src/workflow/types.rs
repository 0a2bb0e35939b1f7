use crate::parser::types::{ActionKind, Step, TestScript};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Boolean,
    Dropdown,
    Url,
    Password,
    Email,
    Ip,
}

/// Declared constraints on a field value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldValidation {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pattern: Option<String>,
}

/// A user-supplied input of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(alias = "id")]
    pub field_id: String,

    #[serde(default)]
    pub label: String,

    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default_value: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub validation: FieldValidation,

    #[serde(default)]
    pub options: Vec<String>,
}

impl FieldDef {
    pub fn new(field_id: &str, label: &str, field_type: FieldType) -> Self {
        Self {
            field_id: field_id.to_string(),
            label: label.to_string(),
            field_type,
            required: false,
            default_value: None,
            description: String::new(),
            validation: FieldValidation::default(),
            options: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Label for messages, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.field_id
        } else {
            &self.label
        }
    }
}

/// Yes/no question that decides whether a prerequisite is included.
///
/// `if_true` / `if_false` hold actions of the form `include_<workflow_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyQuestion {
    pub field: String,

    #[serde(default)]
    pub question: String,

    #[serde(default)]
    pub default: bool,

    #[serde(default)]
    pub if_true: Option<String>,

    #[serde(default)]
    pub if_false: Option<String>,
}

impl DependencyQuestion {
    /// Workflow included by the given answer, if any
    pub fn included_for(&self, answer: bool) -> Option<&str> {
        let action = if answer {
            self.if_true.as_deref()
        } else {
            self.if_false.as_deref()
        };
        action.and_then(|a| a.strip_prefix("include_"))
    }

    /// Every workflow this question can possibly include
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        [self.if_true.as_deref(), self.if_false.as_deref()]
            .into_iter()
            .flatten()
            .filter_map(|a| a.strip_prefix("include_"))
    }
}

/// A step before placeholder substitution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub action: ActionKind,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub target: String,

    #[serde(default, alias = "primary_selector", alias = "primary_locator")]
    pub selector: Option<String>,

    #[serde(default, alias = "fallback_locators")]
    pub fallback_selectors: Vec<String>,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub verification: Option<String>,

    #[serde(default)]
    pub critical: bool,

    #[serde(default)]
    pub screenshot_after: bool,

    /// Milliseconds; the per-action default applies when absent
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl StepTemplate {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            description: String::new(),
            target: String::new(),
            selector: None,
            fallback_selectors: Vec::new(),
            value: None,
            verification: None,
            critical: false,
            screenshot_after: false,
            timeout: None,
        }
    }
}

fn default_category() -> String {
    "general".to_string()
}

fn default_duration() -> u64 {
    300
}

/// Reusable workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub workflow_id: String,

    #[serde(default)]
    pub workflow_name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_category")]
    pub category: String,

    /// Seconds
    #[serde(default = "default_duration")]
    pub estimated_duration: u64,

    /// Prerequisite workflow ids, in execution order
    #[serde(default, alias = "prerequisites")]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub fields: Vec<FieldDef>,

    #[serde(default, alias = "validation_questions")]
    pub dependency_questions: Vec<DependencyQuestion>,

    #[serde(default)]
    pub steps: Vec<StepTemplate>,

    /// Logs the user in; always scheduled first
    #[serde(default)]
    pub provides_authentication: bool,
}

impl WorkflowTemplate {
    pub fn new(workflow_id: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            workflow_name: workflow_id.to_string(),
            description: String::new(),
            category: default_category(),
            estimated_duration: default_duration(),
            dependencies: Vec::new(),
            fields: Vec::new(),
            dependency_questions: Vec::new(),
            steps: Vec::new(),
            provides_authentication: false,
        }
    }
}

/// Listing entry for a workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub workflow_name: String,
    pub description: String,
    pub category: String,
    pub estimated_duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl From<&WorkflowTemplate> for WorkflowSummary {
    fn from(t: &WorkflowTemplate) -> Self {
        Self {
            workflow_id: t.workflow_id.clone(),
            workflow_name: if t.workflow_name.is_empty() {
                t.workflow_id.clone()
            } else {
                t.workflow_name.clone()
            },
            description: t.description.clone(),
            category: t.category.clone(),
            estimated_duration: t.estimated_duration,
            relevance_score: None,
        }
    }
}

/// A fully expanded composite workflow, ready to run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnhancedWorkflow {
    pub main_workflow: String,
    /// Execution order, main workflow last
    pub included_workflows: Vec<String>,
    pub user_values: BTreeMap<String, String>,
    pub resolved_dependencies: BTreeMap<String, bool>,
    pub steps: Vec<Step>,
    /// Seconds
    pub estimated_total_duration: u64,
}

impl EnhancedWorkflow {
    pub fn to_script(&self) -> TestScript {
        TestScript {
            test_name: self.main_workflow.clone(),
            steps: self.steps.clone(),
            estimated_duration: self.estimated_total_duration,
        }
    }
}
