pub mod json;
pub mod types;

use crate::runner::state::RunState;
use anyhow::Result;
use std::path::{Path, PathBuf};

pub use types::RunReport;

/// Write one finished run to `<output_dir>/run_<run_id>.json`
pub async fn write_run_report(state: &RunState, output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(format!("run_{}.json", state.run_id));
    json::generate(&RunReport::new(vec![state.clone()]), Some(&path)).await?;
    Ok(path)
}

/// Export every retained run into a single report
pub async fn export_runs(runs: Vec<RunState>, output: Option<&Path>) -> Result<()> {
    json::generate(&RunReport::new(runs), output).await
}
