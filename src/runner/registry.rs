//! Execution control plane.
//!
//! Owns the run registry and the browser pool. At most one run per session
//! key is non-terminal at any time, and a start arriving within the debounce
//! window of the previous start for that key is dropped.

use super::actions::ActionRegistry;
use super::context::RunContext;
use super::control::RunControl;
use super::events::{EventEmitter, ObserverBridge, RunEvent};
use super::executor::{ExecutionReport, StepExecutor};
use super::state::{RunState, RunStatus};
use crate::error::{ControlError, RunError};
use crate::healing::SelfHealer;
use crate::parser::types::Step;
use crate::pool::{BrowserPool, SessionStatus};
use crate::utils::config::EngineConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};

/// Control request for a running execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Resume,
    Stop,
}

impl std::str::FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pause" => Ok(ControlAction::Pause),
            "resume" => Ok(ControlAction::Resume),
            "stop" => Ok(ControlAction::Stop),
            other => Err(format!("unknown control action: {}", other)),
        }
    }
}

struct RunEntry {
    state: Arc<Mutex<RunState>>,
    control: Arc<RunControl>,
    done: watch::Receiver<bool>,
}

/// Every run started by this control plane, retained after completion
#[derive(Default)]
pub struct RunRegistry {
    runs: HashMap<String, RunEntry>,
    order: Vec<String>,
    /// Session key -> most recent run id
    latest: HashMap<String, String>,
    last_start: HashMap<String, Instant>,
}

impl RunRegistry {
    fn active_run(&self, session_key: &str) -> Option<&str> {
        let run_id = self.latest.get(session_key)?;
        let entry = self.runs.get(run_id)?;
        let terminal = entry.state.lock().status.is_terminal();
        (!terminal).then_some(run_id.as_str())
    }

    fn entry(&self, run_id: &str) -> Result<&RunEntry, ControlError> {
        self.runs
            .get(run_id)
            .ok_or_else(|| ControlError::NotFound(run_id.to_string()))
    }
}

pub struct ControlPlane {
    pool: Arc<BrowserPool>,
    config: Arc<EngineConfig>,
    healer: Arc<SelfHealer>,
    actions: Arc<ActionRegistry>,
    emitter: Arc<EventEmitter>,
    registry: Mutex<RunRegistry>,
    shut_down: AtomicBool,
}

impl ControlPlane {
    pub fn new(pool: Arc<BrowserPool>, config: EngineConfig, healer: SelfHealer) -> Self {
        let (emitter, _) = EventEmitter::new(config.control.event_capacity);
        Self {
            pool,
            config: Arc::new(config),
            healer: Arc::new(healer),
            actions: Arc::new(ActionRegistry::standard()),
            emitter: Arc::new(emitter),
            registry: Mutex::new(RunRegistry::default()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.emitter.subscribe()
    }

    /// Push JSON progress messages to an external observer
    pub fn attach_observer(&self, sink: mpsc::Sender<String>) -> tokio::task::JoinHandle<()> {
        ObserverBridge::spawn(self.emitter.subscribe(), sink)
    }

    /// Start a run in the background and return its id
    pub fn start(&self, session_key: &str, steps: Vec<Step>) -> Result<String, ControlError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ControlError::ShutDown);
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let ctx = {
            let mut registry = self.registry.lock();

            let debounce = Duration::from_millis(self.config.control.debounce_ms);
            if let Some(last) = registry.last_start.get(session_key) {
                if last.elapsed() < debounce {
                    return Err(ControlError::Debounced {
                        session_key: session_key.to_string(),
                    });
                }
            }
            if let Some(active) = registry.active_run(session_key) {
                return Err(ControlError::Conflict {
                    session_key: session_key.to_string(),
                    active_run: active.to_string(),
                });
            }

            let ctx = RunContext::new(
                &run_id,
                session_key,
                steps.len(),
                self.config.clone(),
                self.emitter.clone(),
                self.healer.clone(),
                self.actions.clone(),
            );
            let (done_tx, done_rx) = watch::channel(false);
            registry.runs.insert(
                run_id.clone(),
                RunEntry {
                    state: ctx.state.clone(),
                    control: ctx.control.clone(),
                    done: done_rx,
                },
            );
            registry.order.push(run_id.clone());
            registry
                .latest
                .insert(session_key.to_string(), run_id.clone());
            registry
                .last_start
                .insert(session_key.to_string(), Instant::now());

            tokio::spawn(drive(self.pool.clone(), ctx.clone(), steps, done_tx));
            ctx
        };

        log::info!("Started run {} for session '{}'", ctx.run_id, session_key);
        Ok(run_id)
    }

    /// Apply pause/resume/stop. Terminal runs report their status unchanged.
    pub fn control(&self, run_id: &str, action: ControlAction) -> Result<RunStatus, ControlError> {
        let registry = self.registry.lock();
        let entry = registry.entry(run_id)?;
        let mut state = entry.state.lock();
        if state.status.is_terminal() {
            return Ok(state.status);
        }

        let event = match action {
            ControlAction::Pause => {
                entry.control.pause();
                state.paused = true;
                state.status = RunStatus::Paused;
                Some(RunEvent::Paused {
                    run_id: run_id.to_string(),
                })
            }
            ControlAction::Resume => {
                entry.control.resume();
                let was_paused = state.paused;
                state.paused = false;
                if state.status == RunStatus::Paused {
                    state.status = RunStatus::Running;
                }
                was_paused.then(|| RunEvent::Resumed {
                    run_id: run_id.to_string(),
                })
            }
            ControlAction::Stop => {
                entry.control.stop();
                state.stop_requested = true;
                state.status = RunStatus::Stopping;
                None
            }
        };
        let status = state.status;
        drop(state);

        if let Some(event) = event {
            self.emitter.emit(event);
        }
        log::info!("Run {} -> {}", run_id, status.as_str());
        Ok(status)
    }

    pub fn status(&self, run_id: &str) -> Result<RunState, ControlError> {
        let registry = self.registry.lock();
        let entry = registry.entry(run_id)?;
        let snapshot = entry.state.lock().clone();
        Ok(snapshot)
    }

    /// Snapshots of all retained runs, oldest first
    pub fn list(&self) -> Vec<RunState> {
        let registry = self.registry.lock();
        registry
            .order
            .iter()
            .filter_map(|id| registry.runs.get(id))
            .map(|entry| entry.state.lock().clone())
            .collect()
    }

    /// Resolve once the run has reached a terminal state
    pub async fn wait(&self, run_id: &str) -> Result<RunState, ControlError> {
        let (mut done, state) = {
            let registry = self.registry.lock();
            let entry = registry.entry(run_id)?;
            (entry.done.clone(), entry.state.clone())
        };
        // A dropped sender means the task is gone; the state is final either way
        let _ = done.wait_for(|finished| *finished).await;
        let snapshot = state.lock().clone();
        Ok(snapshot)
    }

    pub async fn session_status(&self) -> SessionStatus {
        self.pool.status().await
    }

    pub async fn end_session(&self) {
        self.pool.end_session().await;
    }

    /// Stop every active run, wait for them, then release the browser
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let pending: Vec<(Arc<RunControl>, watch::Receiver<bool>)> = {
            let registry = self.registry.lock();
            registry
                .runs
                .values()
                .filter(|entry| !entry.state.lock().status.is_terminal())
                .map(|entry| (entry.control.clone(), entry.done.clone()))
                .collect()
        };
        for (control, _) in &pending {
            control.stop();
        }
        for (_, mut done) in pending {
            let _ = done.wait_for(|finished| *finished).await;
        }

        self.pool.shutdown().await;
        log::info!("Control plane shut down");
    }
}

/// Body of a run task: acquire the session, execute, publish the outcome
async fn drive(
    pool: Arc<BrowserPool>,
    ctx: RunContext,
    steps: Vec<Step>,
    done: watch::Sender<bool>,
) {
    ctx.emitter.emit(RunEvent::RunStarted {
        run_id: ctx.run_id.clone(),
        total_steps: steps.len(),
    });

    match pool.acquire().await {
        Ok(session) => {
            {
                let mut state = ctx.state.lock();
                if state.status == RunStatus::Initializing {
                    state.status = RunStatus::Running;
                }
            }
            let executor = StepExecutor::new(ctx.clone());
            let report = executor.run(&steps, &session).await;
            pool.release(&session);
            publish(&ctx, report);
        }
        Err(e) => {
            let err = RunError::from(e);
            log::error!("Run {} could not start: {}", ctx.run_id, err);
            ctx.state
                .lock()
                .fail_with(RunStatus::Error, err.to_string(), err.kind(), None);
            ctx.emitter.emit(RunEvent::Failed {
                run_id: ctx.run_id.clone(),
                error: err.to_string(),
                step_id: None,
            });
        }
    }

    done.send_replace(true);
}

fn publish(ctx: &RunContext, report: ExecutionReport) {
    let run_id = ctx.run_id.clone();
    let summary = report.summary.clone();

    match report.halt {
        Some(RunError::UserCancelled) => {
            ctx.state.lock().finish(RunStatus::Stopped);
            log::info!("Run {} stopped by user", run_id);
            ctx.emitter.emit(RunEvent::Stopped { run_id, summary });
            return;
        }
        Some(err) => {
            ctx.state
                .lock()
                .fail_with(RunStatus::Failed, err.to_string(), err.kind(), err.step_id());
            ctx.emitter.emit(RunEvent::Failed {
                run_id: run_id.clone(),
                error: err.to_string(),
                step_id: err.step_id(),
            });
        }
        None => {
            let first_failure = report.results.iter().find(|r| !r.passed());
            let mut state = ctx.state.lock();
            match first_failure {
                None => state.finish(RunStatus::Completed),
                Some(failed) => state.fail_with(
                    RunStatus::Failed,
                    failed.error.clone().unwrap_or_default(),
                    failed.error_kind.as_deref().unwrap_or("step_failed"),
                    Some(failed.step_id),
                ),
            }
        }
    }

    let status = ctx.state.lock().status;
    log::info!(
        "Run {} finished: {} ({}/{} passed)",
        run_id,
        status.as_str(),
        summary.passed,
        summary.total
    );
    ctx.emitter.emit(RunEvent::Completed {
        run_id,
        status,
        results: report.results,
        summary,
    });
}
