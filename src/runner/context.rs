use super::actions::ActionRegistry;
use super::control::RunControl;
use super::events::EventEmitter;
use super::state::RunState;
use crate::healing::SelfHealer;
use crate::utils::config::EngineConfig;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything one run shares with the task driving it
#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub config: Arc<EngineConfig>,
    pub control: Arc<RunControl>,
    pub emitter: Arc<EventEmitter>,
    /// Live state, readable by status queries while the run progresses
    pub state: Arc<Mutex<RunState>>,
    pub healer: Arc<SelfHealer>,
    pub actions: Arc<ActionRegistry>,
}

impl RunContext {
    pub fn new(
        run_id: &str,
        session_key: &str,
        total_steps: usize,
        config: Arc<EngineConfig>,
        emitter: Arc<EventEmitter>,
        healer: Arc<SelfHealer>,
        actions: Arc<ActionRegistry>,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            config,
            control: Arc::new(RunControl::new()),
            emitter,
            state: Arc::new(Mutex::new(RunState::new(run_id, session_key, total_steps))),
            healer,
            actions,
        }
    }

    /// Context with the standard handlers and a healer without advisory
    pub fn standalone(run_id: &str, total_steps: usize, config: EngineConfig) -> Self {
        let healer = SelfHealer::new(config.healing.clone(), None);
        Self::new(
            run_id,
            "default",
            total_steps,
            Arc::new(config),
            Arc::new(EventEmitter::default()),
            Arc::new(healer),
            Arc::new(ActionRegistry::standard()),
        )
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.config.screenshot_dir()
    }

    pub fn snapshot(&self) -> RunState {
        self.state.lock().clone()
    }
}
