use super::{HealContext, HealingStrategy, HealingTier, Remedy, TierOutcome, MODAL_CLOSE_SELECTORS};
use crate::driver::common::{wait_until, PollConfig};
use crate::driver::traits::PageDriver;
use crate::parser::types::{ActionKind, Step};
use async_trait::async_trait;

pub const LOADING_SELECTORS: [&str; 5] = [
    ".loading",
    ".spinner",
    "[data-loading='true']",
    ".progress-bar",
    ".loading-overlay",
];

pub const OVERLAY_SELECTORS: [&str; 4] = [
    ".modal.show",
    "[role='dialog']",
    ".dialog-overlay",
    ".ui-widget-overlay",
];

const EXTRA_CLOSE_SELECTORS: [&str; 2] = [".modal.show .btn-close", "[aria-label='Close']"];

const LOGIN_URL_MARKERS: [&str; 4] = ["login", "signin", "sign-in", "logon"];

const LOGIN_STEP_MARKERS: [&str; 6] = [
    "login", "log in", "sign in", "username", "user name", "password",
];

const POLL_INTERVAL_MS: u64 = 200;

fn is_login_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    LOGIN_URL_MARKERS.iter().any(|m| lower.contains(m))
}

/// Steps that act on the login form itself are expected on a login page
fn targets_login_form(step: &Step) -> bool {
    let mut haystack = format!("{} {}", step.description, step.target);
    for locator in step.locators() {
        haystack.push(' ');
        haystack.push_str(&locator);
    }
    let lower = haystack.to_lowercase();
    LOGIN_STEP_MARKERS.iter().any(|m| lower.contains(m))
}

/// Login page the session was sent back to, if any. Steps that act on the
/// login form, and navigations, never count as redirected.
pub async fn login_redirect(page: &dyn PageDriver, step: &Step) -> Option<String> {
    if step.action == ActionKind::Navigate || targets_login_form(step) {
        return None;
    }
    let url = page.url().await.ok()?;
    is_login_url(&url).then_some(url)
}

/// Inspects live page signals to explain the failure
pub struct PageStateTier;

impl PageStateTier {
    async fn visible_of<'s>(page: &dyn PageDriver, selectors: &[&'s str]) -> Option<&'s str> {
        for selector in selectors {
            if page.is_visible(selector).await.unwrap_or(false) {
                return Some(*selector);
            }
        }
        None
    }

    async fn wait_for_removal(page: &dyn PageDriver, selector: &str, timeout_ms: u64) -> bool {
        wait_until(
            move || async move { !page.is_visible(selector).await.unwrap_or(false) },
            PollConfig::fixed(timeout_ms, POLL_INTERVAL_MS.min(timeout_ms.max(1))),
        )
        .await
    }

    async fn dismiss_overlay(page: &dyn PageDriver, overlay: &str, timeout_ms: u64) -> bool {
        let close_buttons = MODAL_CLOSE_SELECTORS
            .iter()
            .chain(EXTRA_CLOSE_SELECTORS.iter());
        for selector in close_buttons {
            if page.is_visible(selector).await.unwrap_or(false) {
                let _ = page.click(selector, 5_000).await;
                if !page.is_visible(overlay).await.unwrap_or(false) {
                    return true;
                }
            }
        }

        let _ = page.press_key("Escape").await;
        Self::wait_for_removal(page, overlay, timeout_ms).await
    }
}

#[async_trait]
impl HealingStrategy for PageStateTier {
    fn tier(&self) -> HealingTier {
        HealingTier::PageState
    }

    async fn attempt(&self, ctx: &HealContext<'_>) -> TierOutcome {
        let page = ctx.page;

        if let Some(url) = login_redirect(page, ctx.step).await {
            return TierOutcome::Unrecoverable {
                reason: format!("Session redirected to login page {}", url),
                reauthenticate_at: Some(url),
            };
        }

        if let Some(indicator) = Self::visible_of(page, &LOADING_SELECTORS).await {
            let wait = ctx.config.loading_wait_ms;
            return if Self::wait_for_removal(page, indicator, wait).await {
                TierOutcome::Resolved(Remedy::new(
                    "wait_for_loading",
                    format!("Waited for loading indicator {} to disappear", indicator),
                ))
            } else {
                TierOutcome::NoRemedy(format!(
                    "loading indicator {} still visible after {}ms",
                    indicator, wait
                ))
            };
        }

        if let Some(overlay) = Self::visible_of(page, &OVERLAY_SELECTORS).await {
            return if Self::dismiss_overlay(page, overlay, ctx.config.settle_wait_ms).await {
                TierOutcome::Resolved(Remedy::new(
                    "dismiss_overlay",
                    format!("Dismissed blocking overlay {}", overlay),
                ))
            } else {
                TierOutcome::NoRemedy(format!("overlay {} could not be dismissed", overlay))
            };
        }

        // Settling only counts when the page was actually unsettled
        if page.is_ready().await.unwrap_or(true) {
            return TierOutcome::NoRemedy("page already settled".to_string());
        }
        let settled = wait_until(
            move || async move { page.is_ready().await.unwrap_or(false) },
            PollConfig::fixed(ctx.config.settle_wait_ms, POLL_INTERVAL_MS),
        )
        .await;
        if settled {
            TierOutcome::Resolved(Remedy::new(
                "page_stabilization",
                "Waited for the page to settle",
            ))
        } else {
            TierOutcome::NoRemedy("page did not settle".to_string())
        }
    }
}
