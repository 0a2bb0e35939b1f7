use super::{HealContext, HealingStrategy, HealingTier, Remedy, TierOutcome, MODAL_CLOSE_SELECTORS};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorPattern {
    Timeout,
    Modal,
    OffScreen,
}

fn classify(error_text: &str) -> Option<ErrorPattern> {
    let lower = error_text.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        Some(ErrorPattern::Timeout)
    } else if ["dialog", "modal", "overlay", "intercepts pointer events"]
        .iter()
        .any(|k| lower.contains(k))
    {
        Some(ErrorPattern::Modal)
    } else if ["not visible", "outside of the viewport", "off-screen", "offscreen"]
        .iter()
        .any(|k| lower.contains(k))
    {
        Some(ErrorPattern::OffScreen)
    } else {
        None
    }
}

/// Canned remedies keyed on the error message
pub struct PatternTier;

#[async_trait]
impl HealingStrategy for PatternTier {
    fn tier(&self) -> HealingTier {
        HealingTier::Pattern
    }

    async fn attempt(&self, ctx: &HealContext<'_>) -> TierOutcome {
        match classify(&ctx.error_text) {
            Some(ErrorPattern::Timeout) => {
                let wait = ctx.config.extended_wait_ms;
                tokio::time::sleep(Duration::from_millis(wait)).await;
                TierOutcome::Resolved(Remedy::new(
                    "extended_wait",
                    format!("Waited an extra {}ms after timeout", wait),
                ))
            }
            Some(ErrorPattern::Modal) => {
                let mut dismissed = Vec::new();
                for selector in MODAL_CLOSE_SELECTORS {
                    if ctx.page.is_visible(selector).await.unwrap_or(false)
                        && ctx.page.click(selector, 5_000).await.is_ok()
                    {
                        dismissed.push(selector);
                    }
                }
                if dismissed.is_empty() {
                    TierOutcome::NoRemedy("no dismissible dialog found".to_string())
                } else {
                    TierOutcome::Resolved(Remedy::new(
                        "dismiss_modal",
                        format!("Dismissed dialog via {}", dismissed.join(", ")),
                    ))
                }
            }
            Some(ErrorPattern::OffScreen) => {
                for locator in ctx.step.locators() {
                    if !ctx.page.exists(&locator).await.unwrap_or(false) {
                        continue;
                    }
                    if ctx.page.scroll_into_view(&locator).await.is_ok() {
                        return TierOutcome::Resolved(Remedy::new(
                            "scroll_into_view",
                            format!("Scrolled {} into view", locator),
                        ));
                    }
                }
                TierOutcome::NoRemedy("no locator could be scrolled into view".to_string())
            }
            None => TierOutcome::NoRemedy("no known error pattern".to_string()),
        }
    }
}
