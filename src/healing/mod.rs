//! Tiered self-healing for failed steps.
//!
//! Tiers run in a fixed order (pattern, page state, advisory) and the
//! cascade stops at the first tier that resolves the failure or declares it
//! unrecoverable. The healer never re-runs the step itself.

pub mod advisory;
pub mod client;
pub mod page_state;
pub mod patterns;

use crate::driver::traits::PageDriver;
use crate::error::StepError;
use crate::parser::types::Step;
use crate::utils::config::HealingConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

pub use advisory::{AdvisoryRequest, AdvisoryResponse, AdvisoryService, AdvisoryTier, RecommendedAction};
pub use client::ChatCompletionAdvisor;
pub use page_state::{login_redirect, PageStateTier};
pub use patterns::PatternTier;

/// Known close buttons of modal dialogs
pub const MODAL_CLOSE_SELECTORS: [&str; 4] = [
    ".modal.show .close",
    ".modal.show [data-dismiss='modal']",
    ".dialog-overlay .close",
    "[role='dialog'] .close",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingTier {
    Pattern,
    PageState,
    Advisory,
}

impl HealingTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealingTier::Pattern => "pattern",
            HealingTier::PageState => "page_state",
            HealingTier::Advisory => "advisory",
        }
    }
}

/// A remedy a tier applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Remedy {
    pub strategy: String,
    pub description: String,
    pub replacement_locator: Option<String>,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
}

impl Remedy {
    pub fn new(strategy: &str, description: impl Into<String>) -> Self {
        Self {
            strategy: strategy.to_string(),
            description: description.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Resolved(Remedy),
    /// Stops the cascade; the run cannot continue without the user
    Unrecoverable {
        reason: String,
        reauthenticate_at: Option<String>,
    },
    NoRemedy(String),
}

/// Everything a tier may inspect about the failure
pub struct HealContext<'a> {
    pub page: &'a dyn PageDriver,
    pub step: &'a Step,
    pub error: &'a StepError,
    pub error_text: String,
    pub config: &'a HealingConfig,
}

#[async_trait]
pub trait HealingStrategy: Send + Sync {
    fn tier(&self) -> HealingTier;

    async fn attempt(&self, ctx: &HealContext<'_>) -> TierOutcome;
}

/// Outcome of one healing cascade
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealingResult {
    pub success: bool,
    pub tier: Option<HealingTier>,
    pub strategy_used: Option<String>,
    pub action_description: String,
    pub replacement_locator: Option<String>,
    pub requires_reauthentication: bool,
    pub reauthenticate_at: Option<String>,
    pub attempted_tiers: Vec<HealingTier>,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
    pub elapsed_ms: u64,
}

impl HealingResult {
    /// `tier:strategy` label stored on the step result
    pub fn label(&self) -> Option<String> {
        match (self.tier, &self.strategy_used) {
            (Some(tier), Some(strategy)) => Some(format!("{}:{}", tier.as_str(), strategy)),
            _ => None,
        }
    }
}

pub struct SelfHealer {
    tiers: Vec<Box<dyn HealingStrategy>>,
    config: HealingConfig,
}

impl SelfHealer {
    /// Standard cascade; the advisory tier is present only with a service
    pub fn new(config: HealingConfig, advisor: Option<Arc<dyn AdvisoryService>>) -> Self {
        let mut tiers: Vec<Box<dyn HealingStrategy>> =
            vec![Box::new(PatternTier), Box::new(PageStateTier)];
        if let Some(advisor) = advisor {
            tiers.push(Box::new(AdvisoryTier::new(advisor)));
        }
        Self { tiers, config }
    }

    pub fn with_tiers(config: HealingConfig, tiers: Vec<Box<dyn HealingStrategy>>) -> Self {
        Self { tiers, config }
    }

    /// Whether a failure should go through the cascade at all.
    ///
    /// A failed verification on a settled page is a real defect, not a
    /// transient condition.
    pub async fn is_eligible(&self, page: &dyn PageDriver, error: &StepError) -> bool {
        if !error.is_healable() {
            return false;
        }
        match error {
            StepError::VerificationFailed(_) => !page.is_ready().await.unwrap_or(true),
            _ => true,
        }
    }

    pub async fn heal(&self, page: &dyn PageDriver, step: &Step, error: &StepError) -> HealingResult {
        let started = Instant::now();
        let ctx = HealContext {
            page,
            step,
            error,
            error_text: error.to_string(),
            config: &self.config,
        };

        let mut result = HealingResult::default();
        for tier in &self.tiers {
            result.attempted_tiers.push(tier.tier());
            match tier.attempt(&ctx).await {
                TierOutcome::Resolved(remedy) => {
                    log::info!(
                        "Step {} healed by {} tier: {}",
                        step.id,
                        tier.tier().as_str(),
                        remedy.description
                    );
                    result.success = true;
                    result.tier = Some(tier.tier());
                    result.strategy_used = Some(remedy.strategy);
                    result.action_description = remedy.description;
                    result.replacement_locator = remedy.replacement_locator;
                    result.reasoning = remedy.reasoning;
                    result.confidence = remedy.confidence;
                    break;
                }
                TierOutcome::Unrecoverable {
                    reason,
                    reauthenticate_at,
                } => {
                    log::warn!("Step {} cannot be healed: {}", step.id, reason);
                    result.tier = Some(tier.tier());
                    result.requires_reauthentication = reauthenticate_at.is_some();
                    result.reauthenticate_at = reauthenticate_at;
                    result.action_description = reason;
                    break;
                }
                TierOutcome::NoRemedy(reason) => {
                    log::debug!(
                        "{} tier found no remedy for step {}: {}",
                        tier.tier().as_str(),
                        step.id,
                        reason
                    );
                    result.action_description = reason;
                }
            }
        }

        if !result.success && !result.requires_reauthentication {
            log::warn!("All healing tiers failed for step {}", step.id);
        }
        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakePage;
    use crate::parser::types::ActionKind;
    use parking_lot::Mutex;

    struct Recording {
        tier: HealingTier,
        outcome: TierOutcome,
        log: Arc<Mutex<Vec<HealingTier>>>,
    }

    #[async_trait]
    impl HealingStrategy for Recording {
        fn tier(&self) -> HealingTier {
            self.tier
        }

        async fn attempt(&self, _ctx: &HealContext<'_>) -> TierOutcome {
            self.log.lock().push(self.tier);
            self.outcome.clone()
        }
    }

    fn recording(
        tier: HealingTier,
        outcome: TierOutcome,
        log: &Arc<Mutex<Vec<HealingTier>>>,
    ) -> Box<dyn HealingStrategy> {
        Box::new(Recording {
            tier,
            outcome,
            log: log.clone(),
        })
    }

    fn timeout_error() -> StepError {
        StepError::ActionTimeout {
            locator: "#save".into(),
            detail: "Timeout 180000ms exceeded".into(),
        }
    }

    #[tokio::test]
    async fn test_cascade_runs_tiers_in_order_until_resolved() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let healer = SelfHealer::with_tiers(
            HealingConfig::default(),
            vec![
                recording(HealingTier::Pattern, TierOutcome::NoRemedy("no".into()), &log),
                recording(HealingTier::PageState, TierOutcome::NoRemedy("no".into()), &log),
                recording(
                    HealingTier::Advisory,
                    TierOutcome::Resolved(Remedy::new("ai_wait", "waited")),
                    &log,
                ),
            ],
        );

        let page = FakePage::new();
        let result = healer
            .heal(&page, &Step::new(1, ActionKind::Click), &timeout_error())
            .await;

        assert!(result.success);
        assert_eq!(
            *log.lock(),
            vec![HealingTier::Pattern, HealingTier::PageState, HealingTier::Advisory]
        );
        assert_eq!(result.attempted_tiers, *log.lock());
        assert_eq!(result.label().as_deref(), Some("advisory:ai_wait"));
    }

    #[tokio::test]
    async fn test_cascade_stops_at_first_resolution() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let healer = SelfHealer::with_tiers(
            HealingConfig::default(),
            vec![
                recording(
                    HealingTier::Pattern,
                    TierOutcome::Resolved(Remedy::new("extended_wait", "waited")),
                    &log,
                ),
                recording(HealingTier::PageState, TierOutcome::NoRemedy("no".into()), &log),
            ],
        );

        let page = FakePage::new();
        let result = healer
            .heal(&page, &Step::new(1, ActionKind::Click), &timeout_error())
            .await;

        assert!(result.success);
        assert_eq!(*log.lock(), vec![HealingTier::Pattern]);
    }

    #[tokio::test]
    async fn test_unrecoverable_stops_cascade() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let healer = SelfHealer::with_tiers(
            HealingConfig::default(),
            vec![
                recording(
                    HealingTier::PageState,
                    TierOutcome::Unrecoverable {
                        reason: "login".into(),
                        reauthenticate_at: Some("https://app/login".into()),
                    },
                    &log,
                ),
                recording(HealingTier::Advisory, TierOutcome::NoRemedy("no".into()), &log),
            ],
        );

        let page = FakePage::new();
        let result = healer
            .heal(&page, &Step::new(1, ActionKind::Click), &timeout_error())
            .await;

        assert!(!result.success);
        assert!(result.requires_reauthentication);
        assert_eq!(*log.lock(), vec![HealingTier::PageState]);
    }

    #[tokio::test]
    async fn test_verification_failure_on_settled_page_is_not_healed() {
        let healer = SelfHealer::new(HealingConfig::default(), None);
        let settled = FakePage::new();
        let loading = FakePage::new().ready_sequence(&[false], true);
        let err = StepError::VerificationFailed("text not found".into());

        assert!(!healer.is_eligible(&settled, &err).await);
        assert!(healer.is_eligible(&loading, &err).await);
        assert!(
            !healer
                .is_eligible(&settled, &StepError::InvalidStep("no locator".into()))
                .await
        );
    }
}
