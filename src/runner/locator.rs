use crate::driver::common::{wait_until, PollConfig};
use crate::driver::traits::PageDriver;
use crate::error::StepError;
use crate::parser::types::Step;
use crate::utils::config::TimeoutConfig;
use parking_lot::Mutex;

/// Resolve the step's element by ordered fallback.
///
/// Every round checks the primary locator first and then each fallback in
/// declaration order; the first visible match wins. Rounds repeat until the
/// resolution budget (the smaller of the step timeout and the element wait
/// ceiling) runs out.
pub async fn resolve(
    page: &dyn PageDriver,
    step: &Step,
    timeouts: &TimeoutConfig,
) -> Result<String, StepError> {
    let locators = step.locators();
    if locators.is_empty() {
        return Err(StepError::InvalidStep(format!(
            "step {} ({}) has no locator",
            step.id, step.action
        )));
    }

    let budget = step.timeout_ms.min(timeouts.element_wait_ms);
    let found: Mutex<Option<String>> = Mutex::new(None);
    let (locators_ref, found_ref) = (&locators, &found);

    let resolved = wait_until(
        move || async move {
            for locator in locators_ref {
                match page.is_visible(locator).await {
                    Ok(true) => {
                        *found_ref.lock() = Some(locator.clone());
                        return true;
                    }
                    Ok(false) => log::debug!("Locator {} not visible yet", locator),
                    Err(e) => log::debug!("Locator {} failed: {:#}", locator, e),
                }
            }
            false
        },
        PollConfig::fixed(budget, timeouts.poll_interval_ms),
    )
    .await;

    match found.into_inner() {
        Some(locator) if resolved => {
            if locators.first() != Some(&locator) {
                log::info!("Step {} resolved via fallback locator {}", step.id, locator);
            }
            Ok(locator)
        }
        _ => Err(StepError::ElementNotFound {
            target: if step.target.is_empty() {
                step.label()
            } else {
                step.target.clone()
            },
            tried: locators,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakePage;
    use crate::parser::types::ActionKind;
    use crate::utils::config::EngineConfig;

    fn step(primary: &str, fallbacks: &[&str]) -> Step {
        let mut step = Step::new(1, ActionKind::Click);
        step.target = "username field".into();
        step.primary_locator = Some(primary.into());
        step.fallback_locators = fallbacks.iter().map(|s| s.to_string()).collect();
        step
    }

    #[tokio::test]
    async fn test_primary_wins_when_visible() {
        let page = FakePage::new().with_visible(&["#user", "input[name=user]"]);
        let timeouts = EngineConfig::fast().timeouts;
        let locator = resolve(&page, &step("#user", &["input[name=user]"]), &timeouts)
            .await
            .unwrap();
        assert_eq!(locator, "#user");
    }

    #[tokio::test]
    async fn test_first_visible_fallback_in_order() {
        let page = FakePage::new()
            .with_hidden(&["#user"])
            .with_visible(&["input[name=user]", "text=Username"]);
        let timeouts = EngineConfig::fast().timeouts;
        let locator = resolve(
            &page,
            &step("#user", &["input[name=user]", "text=Username"]),
            &timeouts,
        )
        .await
        .unwrap();
        assert_eq!(locator, "input[name=user]");
    }

    #[tokio::test]
    async fn test_late_element_is_found_by_polling() {
        let page = std::sync::Arc::new(FakePage::new());
        let timeouts = EngineConfig::fast().timeouts;
        let delayed = page.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(15)).await;
            delayed.show("#late");
        });
        let locator = resolve(page.as_ref(), &step("#late", &[]), &timeouts)
            .await
            .unwrap();
        assert_eq!(locator, "#late");
    }

    #[tokio::test]
    async fn test_nothing_resolves_lists_tried_locators() {
        let page = FakePage::new();
        let timeouts = EngineConfig::fast().timeouts;
        let err = resolve(&page, &step("#a", &["  ", "#b"]), &timeouts)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StepError::ElementNotFound {
                target: "username field".into(),
                tried: vec!["#a".into(), "#b".into()],
            }
        );
    }

    #[tokio::test]
    async fn test_missing_locator_is_invalid_step() {
        let page = FakePage::new();
        let timeouts = EngineConfig::fast().timeouts;
        let err = resolve(&page, &Step::new(4, ActionKind::Type), &timeouts)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_step");
    }
}
