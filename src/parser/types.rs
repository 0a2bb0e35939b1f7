use serde::{Deserialize, Serialize};
use std::fmt;

/// Default per-step timeout when the producer omits one (ms)
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

/// Kind of browser action a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Wait,
    Verify,
    Screenshot,
    Select,
    Scroll,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::Navigate,
        ActionKind::Click,
        ActionKind::Type,
        ActionKind::Wait,
        ActionKind::Verify,
        ActionKind::Screenshot,
        ActionKind::Select,
        ActionKind::Scroll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Wait => "wait",
            ActionKind::Verify => "verify",
            ActionKind::Screenshot => "screenshot",
            ActionKind::Select => "select",
            ActionKind::Scroll => "scroll",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic instruction produced upstream.
///
/// Steps are immutable once built; the executor only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(alias = "step_id")]
    pub id: u32,

    pub action: ActionKind,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub target: String,

    #[serde(default, alias = "primary_selector")]
    pub primary_locator: Option<String>,

    #[serde(default, alias = "fallback_selectors")]
    pub fallback_locators: Vec<String>,

    #[serde(default = "default_timeout", alias = "timeout")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub verification: Option<String>,

    #[serde(default)]
    pub critical: bool,

    #[serde(default)]
    pub screenshot_after: bool,

    /// Originating workflow, set only for resolved composites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_workflow: Option<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

impl Step {
    pub fn new(id: u32, action: ActionKind) -> Self {
        Self {
            id,
            action,
            description: String::new(),
            target: String::new(),
            primary_locator: None,
            fallback_locators: Vec::new(),
            timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            value: None,
            verification: None,
            critical: false,
            screenshot_after: false,
            source_workflow: None,
        }
    }

    /// Primary locator followed by fallbacks, blanks removed
    pub fn locators(&self) -> Vec<String> {
        self.primary_locator
            .iter()
            .chain(self.fallback_locators.iter())
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect()
    }

    /// Short label for logs and progress output
    pub fn label(&self) -> String {
        if self.description.is_empty() {
            format!("{} {}", self.action, self.target)
        } else {
            self.description.clone()
        }
    }
}

/// A generated test script: named, ordered steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestScript {
    #[serde(default, alias = "name")]
    pub test_name: String,

    #[serde(alias = "test_steps")]
    pub steps: Vec<Step>,

    /// Estimated duration in seconds
    #[serde(default)]
    pub estimated_duration: u64,
}
