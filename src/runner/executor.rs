use super::actions::{capture_screenshot, ActionContext, ActionOutcome};
use super::context::RunContext;
use super::events::RunEvent;
use super::state::{ExecutionSummary, StepResult};
use crate::driver::common::{wait_until, PollConfig};
use crate::driver::traits::PageDriver;
use crate::error::{RunError, StepError};
use crate::healing::{login_redirect, HealingResult};
use crate::parser::types::Step;
use crate::pool::BrowserSession;
use std::time::Duration;

/// Outcome of one pass over a step list
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub results: Vec<StepResult>,
    pub summary: ExecutionSummary,
    /// Why the run ended before the last step, if it did
    pub halt: Option<RunError>,
}

/// Drives an ordered step list against one browser session
pub struct StepExecutor {
    ctx: RunContext,
}

impl StepExecutor {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub async fn run(&self, steps: &[Step], session: &BrowserSession) -> ExecutionReport {
        let page = session.page();
        let screenshot_dir = self.ctx.screenshot_dir();
        let action_ctx = ActionContext {
            page,
            timeouts: &self.ctx.config.timeouts,
            screenshot_dir: &screenshot_dir,
            run_id: &self.ctx.run_id,
        };

        let total = steps.len();
        let mut results = Vec::with_capacity(total);
        let mut halt = None;

        for (index, step) in steps.iter().enumerate() {
            if let Err(e) = self.ctx.control.checkpoint().await {
                halt = Some(e);
                break;
            }

            self.ctx.state.lock().current_step = Some(step.id);
            self.ctx.emitter.emit(RunEvent::StepStarted {
                run_id: self.ctx.run_id.clone(),
                step_id: step.id,
                index,
                description: step.label(),
                progress: index as f64 / total as f64 * 100.0,
            });
            log::info!("[{}/{}] {}", index + 1, total, step.label());

            self.wait_for_stability(page).await;

            let (result, run_error) = self.execute_step(step, &action_ctx).await;
            let failed = !result.passed();

            let progress = {
                let mut state = self.ctx.state.lock();
                state.record(result.clone());
                state.progress
            };
            self.ctx.emitter.emit(RunEvent::StepFinished {
                run_id: self.ctx.run_id.clone(),
                result: result.clone(),
                progress,
            });

            if failed {
                log::warn!(
                    "Step {} failed: {}",
                    step.id,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            let error_text = result.error.clone().unwrap_or_default();
            results.push(result);

            if let Some(e) = run_error {
                halt = Some(e);
                break;
            }
            if failed && step.critical {
                halt = Some(RunError::CriticalStepFailed {
                    step_id: step.id,
                    error: error_text,
                });
                break;
            }

            if index + 1 < total {
                let delay = Duration::from_millis(self.ctx.config.timeouts.inter_step_delay_ms);
                if let Err(e) = self.ctx.control.sleep(delay).await {
                    halt = Some(e);
                    break;
                }
            }
        }

        // Stop requested during the final step still ends the run as stopped
        if halt.is_none() && self.ctx.control.is_stopped() {
            halt = Some(RunError::UserCancelled);
        }

        let summary = ExecutionSummary::from_results(&results, total);
        ExecutionReport {
            results,
            summary,
            halt,
        }
    }

    /// Bounded wait for the injected readiness helpers; never fails the step
    async fn wait_for_stability(&self, page: &dyn PageDriver) {
        let timeouts = &self.ctx.config.timeouts;
        let stable = wait_until(
            move || async move { page.is_ready().await.unwrap_or(false) },
            PollConfig::fixed(timeouts.stability_timeout_ms, timeouts.poll_interval_ms),
        )
        .await;
        if !stable {
            log::warn!(
                "Page not stable after {}ms, continuing",
                timeouts.stability_timeout_ms
            );
        }
    }

    /// Run one step with heal-and-retry. The second element is set when the
    /// failure must end the run regardless of the step's criticality.
    async fn execute_step(
        &self,
        step: &Step,
        action_ctx: &ActionContext<'_>,
    ) -> (StepResult, Option<RunError>) {
        let mut result = StepResult::new(step);
        result.start();

        let err = match self.ctx.actions.execute(step, action_ctx).await {
            Ok(outcome) => {
                apply_outcome(&mut result, outcome);
                result.complete();
                self.screenshot_after(step, action_ctx, &mut result).await;
                return (result, None);
            }
            Err(err) => err,
        };

        let mut run_error = None;
        let page = action_ctx.page;
        if self.ctx.healer.is_eligible(page, &err).await {
            self.ctx.emitter.emit(RunEvent::StepHealing {
                run_id: self.ctx.run_id.clone(),
                step_id: step.id,
                error: err.to_string(),
            });

            let healing = self.ctx.healer.heal(page, step, &err).await;
            if healing.requires_reauthentication {
                let url = healing.reauthenticate_at.clone().unwrap_or_default();
                run_error = Some(reauthentication_required(step, url, &mut result));
            } else if healing.success {
                if let Err(retry_err) = self
                    .retry_after_heal(step, action_ctx, &healing, &mut result)
                    .await
                {
                    // An earlier tier may have claimed a timeout that was really a login bounce
                    match login_redirect(page, step).await {
                        Some(url) => {
                            run_error = Some(reauthentication_required(step, url, &mut result));
                        }
                        None => result.fail(&retry_err),
                    }
                }
            } else {
                result.fail(&err);
            }
        } else {
            result.fail(&err);
        }

        self.screenshot_after(step, action_ctx, &mut result).await;
        (result, run_error)
    }

    /// A heal only counts once the step's own action passes again
    async fn retry_after_heal(
        &self,
        step: &Step,
        action_ctx: &ActionContext<'_>,
        healing: &HealingResult,
        result: &mut StepResult,
    ) -> Result<(), StepError> {
        result.retry_count += 1;
        result.healing_strategy = healing.label();

        let retry_step = match healing.replacement_locator {
            Some(ref replacement) => {
                let mut patched = step.clone();
                patched.fallback_locators = step.locators();
                patched.primary_locator = Some(replacement.clone());
                patched
            }
            None => step.clone(),
        };

        match self.ctx.actions.execute(&retry_step, action_ctx).await {
            Ok(outcome) => {
                apply_outcome(result, outcome);
                result.healing_applied = true;
                result.complete();
                Ok(())
            }
            Err(retry_err) => {
                log::warn!("Step {} failed again after healing: {}", step.id, retry_err);
                Err(retry_err)
            }
        }
    }

    async fn screenshot_after(
        &self,
        step: &Step,
        action_ctx: &ActionContext<'_>,
        result: &mut StepResult,
    ) {
        if !step.screenshot_after {
            return;
        }
        match capture_screenshot(action_ctx, step.id, "after").await {
            Ok(path) => {
                if result.screenshot_path.is_none() {
                    result.screenshot_path = Some(path.display().to_string());
                }
            }
            Err(e) => log::warn!("Screenshot after step {} failed: {}", step.id, e),
        }
    }
}

fn reauthentication_required(step: &Step, url: String, result: &mut StepResult) -> RunError {
    let run_err = RunError::AuthenticationRequired {
        step_id: step.id,
        url,
    };
    result.abort(run_err.to_string(), run_err.kind());
    run_err
}

fn apply_outcome(result: &mut StepResult, outcome: ActionOutcome) {
    if outcome.selector_used.is_some() {
        result.selector_used = outcome.selector_used;
    }
    if outcome.screenshot_path.is_some() {
        result.screenshot_path = outcome.screenshot_path;
    }
}
