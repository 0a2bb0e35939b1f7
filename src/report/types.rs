use crate::runner::state::RunState;
use serde::{Deserialize, Serialize};

/// Exported run snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub generated_at: String,
    pub runs: Vec<RunState>,
}

impl RunReport {
    pub fn new(runs: Vec<RunState>) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            runs,
        }
    }
}
