use super::state::{ExecutionSummary, RunStatus, StepResult};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

/// Run lifecycle events, emitted in the order transitions happen
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        total_steps: usize,
    },
    StepStarted {
        run_id: String,
        step_id: u32,
        index: usize,
        description: String,
        progress: f64,
    },
    StepHealing {
        run_id: String,
        step_id: u32,
        error: String,
    },
    StepFinished {
        run_id: String,
        result: StepResult,
        progress: f64,
    },
    Paused {
        run_id: String,
    },
    Resumed {
        run_id: String,
    },
    Stopped {
        run_id: String,
        summary: ExecutionSummary,
    },
    Completed {
        run_id: String,
        status: RunStatus,
        results: Vec<StepResult>,
        summary: ExecutionSummary,
    },
    Failed {
        run_id: String,
        error: String,
        step_id: Option<u32>,
    },
}

/// JSON payload pushed to external observers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverMessage {
    ProgressUpdate {
        execution_id: String,
        step: u32,
        progress: f64,
    },
    StatusUpdate {
        execution_id: String,
        status: RunStatus,
    },
    ExecutionComplete {
        execution_id: String,
        results: Vec<StepResult>,
        summary: ExecutionSummary,
    },
    ExecutionFailed {
        execution_id: String,
        error: String,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::StepStarted { run_id, .. }
            | RunEvent::StepHealing { run_id, .. }
            | RunEvent::StepFinished { run_id, .. }
            | RunEvent::Paused { run_id }
            | RunEvent::Resumed { run_id }
            | RunEvent::Stopped { run_id, .. }
            | RunEvent::Completed { run_id, .. }
            | RunEvent::Failed { run_id, .. } => run_id,
        }
    }

    pub fn to_observer_message(&self) -> Option<ObserverMessage> {
        let execution_id = self.run_id().to_string();
        let message = match self {
            RunEvent::RunStarted { .. } => ObserverMessage::StatusUpdate {
                execution_id,
                status: RunStatus::Running,
            },
            RunEvent::StepStarted {
                step_id, progress, ..
            } => ObserverMessage::ProgressUpdate {
                execution_id,
                step: *step_id,
                progress: *progress,
            },
            RunEvent::StepFinished {
                result, progress, ..
            } => ObserverMessage::ProgressUpdate {
                execution_id,
                step: result.step_id,
                progress: *progress,
            },
            RunEvent::StepHealing { .. } => return None,
            RunEvent::Paused { .. } => ObserverMessage::StatusUpdate {
                execution_id,
                status: RunStatus::Paused,
            },
            RunEvent::Resumed { .. } => ObserverMessage::StatusUpdate {
                execution_id,
                status: RunStatus::Running,
            },
            RunEvent::Stopped { .. } => ObserverMessage::StatusUpdate {
                execution_id,
                status: RunStatus::Stopped,
            },
            RunEvent::Completed {
                results, summary, ..
            } => ObserverMessage::ExecutionComplete {
                execution_id,
                results: results.clone(),
                summary: summary.clone(),
            },
            RunEvent::Failed { error, .. } => ObserverMessage::ExecutionFailed {
                execution_id,
                error: error.clone(),
            },
        };
        Some(message)
    }
}

/// Event emitter for broadcasting run events
pub struct EventEmitter {
    sender: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<RunEvent>) {
        let (sender, receiver) = broadcast::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Never blocks; events are dropped when nobody listens
    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

/// Forwards events as JSON lines to an observer channel.
///
/// A full or closed channel drops messages instead of slowing the run.
pub struct ObserverBridge;

impl ObserverBridge {
    pub fn spawn(
        mut receiver: broadcast::Receiver<RunEvent>,
        sink: mpsc::Sender<String>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let event = match receiver.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!("Observer lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(message) = event.to_observer_message() else {
                    continue;
                };
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        log::warn!("Failed to serialize observer message: {}", e);
                        continue;
                    }
                };
                match sink.try_send(json) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        log::debug!("Observer channel full, dropping message");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        })
    }
}

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<RunEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        let is_tty = std::io::stdout().is_terminal();
        let draw_target = || {
            if is_tty {
                ProgressDrawTarget::stdout()
            } else {
                // Piped output gets no escape codes
                ProgressDrawTarget::hidden()
            }
        };

        let mut spinner: Option<ProgressBar> = None;
        let mut step_text = String::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                RunEvent::RunStarted {
                    run_id,
                    total_steps,
                } => {
                    println!(
                        "\n{} Run started: {} ({} steps)",
                        "▶".green().bold(),
                        run_id.cyan(),
                        total_steps
                    );
                }

                RunEvent::StepStarted {
                    step_id,
                    description,
                    ..
                } => {
                    let pb = ProgressBar::with_draw_target(None, draw_target());
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("    {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    step_text = format!("[{}] {}... ", step_id, description.dimmed());
                    pb.set_message(step_text.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                RunEvent::StepHealing { error, .. } => {
                    if let Some(pb) = &spinner {
                        pb.set_message(format!("{} {}", step_text, "↻ healing".yellow()));
                    }
                    log::debug!("Healing after: {}", error);
                }

                RunEvent::StepFinished { result, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let duration = result.duration_ms.unwrap_or(0);
                    if result.passed() {
                        let healed = if result.healing_applied {
                            format!(" {}", "(healed)".yellow())
                        } else {
                            String::new()
                        };
                        println!(
                            "    {} {}({}ms){}",
                            "✓".green(),
                            step_text,
                            duration,
                            healed
                        );
                    } else {
                        println!("    {} {}({}ms)", "✗".red(), step_text, duration);
                        if let Some(error) = result.error {
                            println!("        {}", error.red());
                        }
                    }
                }

                RunEvent::Paused { .. } => {
                    if let Some(pb) = &spinner {
                        pb.set_message(format!("{} {}", step_text, "⏸ paused".yellow()));
                    } else {
                        println!("    {}", "⏸ paused".yellow());
                    }
                }

                RunEvent::Resumed { .. } => {
                    println!("    {}", "▶ resumed".green());
                }

                RunEvent::Stopped { summary, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!(
                        "\n{} Run stopped by user after {} steps",
                        "■".yellow().bold(),
                        summary.total
                    );
                }

                RunEvent::Completed {
                    status, summary, ..
                } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    let status_str = match status {
                        RunStatus::Completed => "COMPLETED".green().bold(),
                        _ => status.as_str().to_uppercase().red().bold(),
                    };
                    println!("\n{} Run finished [{}]", "■".blue().bold(), status_str);
                    println!(
                        "  {} passed, {} failed, {} skipped, {} healed",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.skipped.to_string().yellow(),
                        summary.healed.to_string().cyan()
                    );
                    println!("  Success rate: {:.2}%", summary.success_rate);
                    println!("  Duration: {}ms", summary.total_duration_ms);
                }

                RunEvent::Failed { error, step_id, .. } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    match step_id {
                        Some(id) => println!(
                            "\n{} Run failed at step {}: {}",
                            "✗".red().bold(),
                            id,
                            error
                        ),
                        None => println!("\n{} Run failed: {}", "✗".red().bold(), error),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_messages_use_type_tag() {
        let event = RunEvent::StepStarted {
            run_id: "run-1".into(),
            step_id: 3,
            index: 2,
            description: "Click save".into(),
            progress: 50.0,
        };
        let json = serde_json::to_value(event.to_observer_message().unwrap()).unwrap();
        assert_eq!(json["type"], "progress_update");
        assert_eq!(json["execution_id"], "run-1");
        assert_eq!(json["step"], 3);
        assert_eq!(json["progress"], 50.0);

        let failed = RunEvent::Failed {
            run_id: "run-1".into(),
            error: "boom".into(),
            step_id: None,
        };
        let json = serde_json::to_value(failed.to_observer_message().unwrap()).unwrap();
        assert_eq!(json["type"], "execution_failed");
        assert_eq!(json["error"], "boom");
    }

    #[tokio::test]
    async fn test_full_observer_channel_does_not_block_emitter() {
        let (emitter, receiver) = EventEmitter::new(16);
        let (sink, mut observer) = mpsc::channel(1);
        let bridge = ObserverBridge::spawn(receiver, sink);

        for _ in 0..5 {
            emitter.emit(RunEvent::Paused {
                run_id: "run-1".into(),
            });
        }
        drop(emitter);
        bridge.await.unwrap();

        let first = observer.recv().await.unwrap();
        assert!(first.contains("\"status_update\""));
        assert!(first.contains("\"paused\""));
        assert!(observer.try_recv().is_err());
    }
}
