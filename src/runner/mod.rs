pub mod actions;
pub mod context;
pub mod control;
pub mod events;
pub mod executor;
pub mod locator;
pub mod registry;
pub mod state;

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::driver::web::PlaywrightLauncher;
use crate::healing::{AdvisoryService, ChatCompletionAdvisor, SelfHealer};
use crate::parser::types::Step;
use crate::pool::BrowserPool;
use crate::utils::config::EngineConfig;

pub use events::*;
pub use executor::{ExecutionReport, StepExecutor};
pub use registry::{ControlAction, ControlPlane};
pub use state::*;

/// Control plane wired to a real Playwright browser
pub fn build_control_plane(config: EngineConfig) -> ControlPlane {
    let advisor = ChatCompletionAdvisor::from_config(&config.advisory)
        .map(|a| Arc::new(a) as Arc<dyn AdvisoryService>);
    if advisor.is_some() {
        log::info!("Advisory healing enabled");
    }
    let healer = SelfHealer::new(config.healing.clone(), advisor);
    let pool = Arc::new(BrowserPool::new(
        Arc::new(PlaywrightLauncher),
        config.clone(),
    ));
    ControlPlane::new(pool, config, healer)
}

/// Run steps to completion with console progress and Ctrl+C handling.
///
/// Returns the final run state and the path of its JSON report.
pub async fn run_steps(
    plane: Arc<ControlPlane>,
    session_key: &str,
    steps: Vec<Step>,
    output_dir: PathBuf,
) -> Result<(RunState, PathBuf)> {
    let listener = tokio::spawn(ConsoleEventListener::listen(plane.subscribe()));

    let run_id = plane.start(session_key, steps)?;

    let handle = tokio::runtime::Handle::current();
    let stopper = plane.clone();
    let stop_id = run_id.clone();
    ctrlc::set_handler(move || {
        println!("\n{} Stopping after the current step...", "■".yellow());
        let plane = stopper.clone();
        let run_id = stop_id.clone();
        handle.spawn(async move {
            if let Err(e) = plane.control(&run_id, ControlAction::Stop) {
                log::warn!("Failed to stop run {}: {}", run_id, e);
            }
        });
    })
    .context("Failed to install Ctrl+C handler")?;

    let state = plane.wait(&run_id).await?;
    plane.shutdown().await;

    // Let the console drain the final events
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    listener.abort();

    let path = crate::report::write_run_report(&state, &output_dir).await?;
    println!("\n{} Report saved to: {}", "📄".to_string(), path.display());
    Ok((state, path))
}
