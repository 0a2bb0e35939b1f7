//! One handler per action kind, looked up by the executor.

use super::locator;
use crate::driver::common::{wait_until, PollConfig};
use crate::driver::traits::PageDriver;
use crate::error::StepError;
use crate::parser::types::{ActionKind, Step};
use crate::utils::config::TimeoutConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What a handler needs from the running session
pub struct ActionContext<'a> {
    pub page: &'a dyn PageDriver,
    pub timeouts: &'a TimeoutConfig,
    pub screenshot_dir: &'a Path,
    pub run_id: &'a str,
}

/// Diagnostics a handler reports on success
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub selector_used: Option<String>,
    pub screenshot_path: Option<String>,
}

impl ActionOutcome {
    fn located(locator: String) -> Self {
        Self {
            selector_used: Some(locator),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, step: &Step, ctx: &ActionContext<'_>) -> Result<ActionOutcome, StepError>;
}

/// Save a screenshot under the run's screenshot directory
pub async fn capture_screenshot(
    ctx: &ActionContext<'_>,
    step_id: u32,
    suffix: &str,
) -> Result<PathBuf, StepError> {
    tokio::fs::create_dir_all(ctx.screenshot_dir)
        .await
        .map_err(|e| {
            StepError::Driver(format!(
                "Failed to create {}: {}",
                ctx.screenshot_dir.display(),
                e
            ))
        })?;
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
    let name = if suffix.is_empty() {
        format!("{}_step{}_{}.png", ctx.run_id, step_id, timestamp)
    } else {
        format!("{}_step{}_{}_{}.png", ctx.run_id, step_id, suffix, timestamp)
    };
    let path = ctx.screenshot_dir.join(name);
    ctx.page
        .screenshot(&path)
        .await
        .map_err(|e| StepError::Driver(format!("Screenshot failed: {:#}", e)))?;
    Ok(path)
}

fn required_value<'s>(step: &'s Step) -> Result<&'s str, StepError> {
    step.value
        .as_deref()
        .ok_or_else(|| StepError::InvalidStep(format!("{} step {} has no value", step.action, step.id)))
}

struct NavigateAction;

#[async_trait]
impl ActionHandler for NavigateAction {
    async fn execute(&self, step: &Step, ctx: &ActionContext<'_>) -> Result<ActionOutcome, StepError> {
        let url = step
            .value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .or(step.primary_locator.as_deref())
            .map(str::trim)
            .ok_or_else(|| StepError::InvalidStep(format!("navigate step {} has no URL", step.id)))?;

        let timeout = step.timeout_ms.max(ctx.timeouts.navigation_timeout_ms);
        log::info!("Navigating to {}", url);
        ctx.page
            .goto(url, timeout)
            .await
            .map_err(|e| StepError::Navigation(format!("{}: {:#}", url, e)))?;

        tokio::time::sleep(Duration::from_millis(ctx.timeouts.navigation_settle_ms)).await;

        let page = ctx.page;
        let ready = wait_until(
            move || async move { page.is_ready().await.unwrap_or(false) },
            PollConfig::fixed(ctx.timeouts.stability_timeout_ms, ctx.timeouts.poll_interval_ms),
        )
        .await;
        if !ready {
            log::warn!("Page not ready after navigating to {}", url);
        }
        Ok(ActionOutcome::default())
    }
}

struct ClickAction;

#[async_trait]
impl ActionHandler for ClickAction {
    async fn execute(&self, step: &Step, ctx: &ActionContext<'_>) -> Result<ActionOutcome, StepError> {
        let locator = locator::resolve(ctx.page, step, ctx.timeouts).await?;
        ctx.page
            .click(&locator, step.timeout_ms)
            .await
            .map_err(|e| StepError::from_driver(&locator, e))?;
        Ok(ActionOutcome::located(locator))
    }
}

struct TypeAction;

#[async_trait]
impl ActionHandler for TypeAction {
    async fn execute(&self, step: &Step, ctx: &ActionContext<'_>) -> Result<ActionOutcome, StepError> {
        let text = step.value.as_deref().unwrap_or_default();
        let locator = locator::resolve(ctx.page, step, ctx.timeouts).await?;
        ctx.page
            .fill(&locator, text, step.timeout_ms)
            .await
            .map_err(|e| StepError::from_driver(&locator, e))?;
        Ok(ActionOutcome::located(locator))
    }
}

struct SelectAction;

#[async_trait]
impl ActionHandler for SelectAction {
    async fn execute(&self, step: &Step, ctx: &ActionContext<'_>) -> Result<ActionOutcome, StepError> {
        let value = required_value(step)?;
        let locator = locator::resolve(ctx.page, step, ctx.timeouts).await?;
        ctx.page
            .select_option(&locator, value, step.timeout_ms)
            .await
            .map_err(|e| StepError::from_driver(&locator, e))?;
        Ok(ActionOutcome::located(locator))
    }
}

struct ScrollAction;

#[async_trait]
impl ActionHandler for ScrollAction {
    async fn execute(&self, step: &Step, ctx: &ActionContext<'_>) -> Result<ActionOutcome, StepError> {
        if step.locators().is_empty() {
            ctx.page
                .press_key("PageDown")
                .await
                .map_err(|e| StepError::Driver(format!("{:#}", e)))?;
            return Ok(ActionOutcome::default());
        }
        let locator = locator::resolve(ctx.page, step, ctx.timeouts).await?;
        ctx.page
            .scroll_into_view(&locator)
            .await
            .map_err(|e| StepError::from_driver(&locator, e))?;
        Ok(ActionOutcome::located(locator))
    }
}

struct WaitAction;

impl WaitAction {
    fn duration_ms(step: &Step, timeouts: &TimeoutConfig) -> u64 {
        let requested = step
            .value
            .as_deref()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        step.timeout_ms.max(requested).max(timeouts.wait_floor_ms)
    }
}

#[async_trait]
impl ActionHandler for WaitAction {
    async fn execute(&self, step: &Step, ctx: &ActionContext<'_>) -> Result<ActionOutcome, StepError> {
        let wait = Self::duration_ms(step, ctx.timeouts);
        log::debug!("Waiting {}ms", wait);
        tokio::time::sleep(Duration::from_millis(wait)).await;
        Ok(ActionOutcome::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Predicate {
    Text,
    Element,
    Url,
    Title,
}

impl Predicate {
    fn from_step(step: &Step) -> Self {
        let hint = step.verification.as_deref().unwrap_or_default().to_lowercase();
        if hint.contains("url") {
            Predicate::Url
        } else if hint.contains("title") {
            Predicate::Title
        } else if hint.contains("element") {
            Predicate::Element
        } else {
            Predicate::Text
        }
    }
}

struct VerifyAction;

#[async_trait]
impl ActionHandler for VerifyAction {
    async fn execute(&self, step: &Step, ctx: &ActionContext<'_>) -> Result<ActionOutcome, StepError> {
        let expected = step
            .value
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(step.target.as_str());
        let predicate = Predicate::from_step(step);
        if expected.is_empty() && predicate != Predicate::Element {
            return Err(StepError::InvalidStep(format!(
                "verify step {} has nothing to check",
                step.id
            )));
        }
        let driver_err = |e: anyhow::Error| StepError::Driver(format!("{:#}", e));

        match predicate {
            Predicate::Url => {
                let url = ctx.page.url().await.map_err(driver_err)?;
                if !url.contains(expected) {
                    return Err(StepError::VerificationFailed(format!(
                        "URL '{}' does not contain '{}'",
                        url, expected
                    )));
                }
            }
            Predicate::Title => {
                let title = ctx.page.title().await.map_err(driver_err)?;
                if !title.contains(expected) {
                    return Err(StepError::VerificationFailed(format!(
                        "Title '{}' does not contain '{}'",
                        title, expected
                    )));
                }
            }
            Predicate::Element => {
                if step.locators().is_empty() {
                    let present = ctx.page.is_visible(expected).await.unwrap_or(false);
                    if !present {
                        return Err(StepError::VerificationFailed(format!(
                            "Element '{}' is not present",
                            expected
                        )));
                    }
                    return Ok(ActionOutcome::located(expected.to_string()));
                }
                return match locator::resolve(ctx.page, step, ctx.timeouts).await {
                    Ok(locator) => Ok(ActionOutcome::located(locator)),
                    Err(StepError::ElementNotFound { target, .. }) => Err(
                        StepError::VerificationFailed(format!("Element '{}' is not present", target)),
                    ),
                    Err(e) => Err(e),
                };
            }
            Predicate::Text => {
                let text = ctx.page.text_content().await.map_err(driver_err)?;
                if !text.contains(expected) {
                    return Err(StepError::VerificationFailed(format!(
                        "Text '{}' not found on page",
                        expected
                    )));
                }
            }
        }
        Ok(ActionOutcome::default())
    }
}

struct ScreenshotAction;

#[async_trait]
impl ActionHandler for ScreenshotAction {
    async fn execute(&self, step: &Step, ctx: &ActionContext<'_>) -> Result<ActionOutcome, StepError> {
        let path = capture_screenshot(ctx, step.id, "").await?;
        Ok(ActionOutcome {
            selector_used: None,
            screenshot_path: Some(path.display().to_string()),
        })
    }
}

/// Action kind to handler lookup
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Box<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Built-in handlers for every action kind
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(ActionKind::Navigate, Box::new(NavigateAction));
        registry.register(ActionKind::Click, Box::new(ClickAction));
        registry.register(ActionKind::Type, Box::new(TypeAction));
        registry.register(ActionKind::Select, Box::new(SelectAction));
        registry.register(ActionKind::Scroll, Box::new(ScrollAction));
        registry.register(ActionKind::Wait, Box::new(WaitAction));
        registry.register(ActionKind::Verify, Box::new(VerifyAction));
        registry.register(ActionKind::Screenshot, Box::new(ScreenshotAction));
        registry
    }

    pub fn register(&mut self, kind: ActionKind, handler: Box<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub async fn execute(&self, step: &Step, ctx: &ActionContext<'_>) -> Result<ActionOutcome, StepError> {
        match self.handlers.get(&step.action) {
            Some(handler) => handler.execute(step, ctx).await,
            None => Err(StepError::InvalidStep(format!(
                "no handler registered for action {}",
                step.action
            ))),
        }
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
