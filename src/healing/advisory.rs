use super::{HealContext, HealingStrategy, HealingTier, Remedy, TierOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("advisory request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("advisory service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("advisory service returned no content")]
    EmptyResponse,
}

/// What the advisory service is told about a failure
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdvisoryRequest {
    pub action: String,
    pub target: String,
    pub description: String,
    pub primary_locator: Option<String>,
    pub fallback_locators: Vec<String>,
    pub error: String,
    pub url: String,
    pub title: String,
    pub content: String,
}

/// External recovery advisor. Returns the raw completion text.
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<String, AdvisoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Wait,
    Retry,
    AlternativeSelector,
    PageAction,
    SessionRefresh,
    ManualIntervention,
}

#[derive(Debug, Deserialize)]
struct RawAdvice {
    recommended_action: RecommendedAction,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    healing_steps: Vec<String>,
    #[serde(default)]
    alternative_selector: Option<String>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    requires_manual_intervention: bool,
}

/// Validated advice
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryResponse {
    pub recommended_action: RecommendedAction,
    pub reasoning: String,
    pub healing_steps: Vec<String>,
    pub alternative_selector: Option<String>,
    pub confidence: f64,
}

impl AdvisoryResponse {
    /// Extract and validate advice from completion text.
    ///
    /// Anything malformed, below `min_confidence`, or asking for a human
    /// yields `None`.
    pub fn parse(raw: &str, min_confidence: f64) -> Option<Self> {
        let json = extract_json_object(raw)?;
        let advice: RawAdvice = match serde_json::from_str(json) {
            Ok(advice) => advice,
            Err(e) => {
                log::warn!("Discarding malformed advisory response: {}", e);
                return None;
            }
        };

        if !(0.0..=1.0).contains(&advice.confidence) || advice.confidence < min_confidence {
            log::info!(
                "Discarding advisory response with confidence {:.2}",
                advice.confidence
            );
            return None;
        }
        if advice.requires_manual_intervention
            || advice.recommended_action == RecommendedAction::ManualIntervention
        {
            return None;
        }

        let alternative_selector = advice
            .alternative_selector
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if advice.recommended_action == RecommendedAction::AlternativeSelector
            && alternative_selector.is_none()
        {
            return None;
        }

        Some(Self {
            recommended_action: advice.recommended_action,
            reasoning: advice.reasoning,
            healing_steps: advice.healing_steps,
            alternative_selector,
            confidence: advice.confidence,
        })
    }
}

/// First `{` through last `}`, ignoring markdown fences around it
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Asks the advisory service once per failure and applies its remedy
pub struct AdvisoryTier {
    service: Arc<dyn AdvisoryService>,
}

impl AdvisoryTier {
    pub fn new(service: Arc<dyn AdvisoryService>) -> Self {
        Self { service }
    }

    async fn build_request(ctx: &HealContext<'_>) -> AdvisoryRequest {
        let content = ctx.page.text_content().await.unwrap_or_default();
        AdvisoryRequest {
            action: ctx.step.action.to_string(),
            target: ctx.step.target.clone(),
            description: ctx.step.description.clone(),
            primary_locator: ctx.step.primary_locator.clone(),
            fallback_locators: ctx.step.fallback_locators.clone(),
            error: ctx.error_text.clone(),
            url: ctx.page.url().await.unwrap_or_default(),
            title: ctx.page.title().await.unwrap_or_default(),
            content: truncate_chars(&content, ctx.config.content_limit),
        }
    }

    async fn apply(ctx: &HealContext<'_>, advice: AdvisoryResponse) -> TierOutcome {
        let page = ctx.page;
        let mut remedy = match advice.recommended_action {
            RecommendedAction::Wait => {
                let wait = ctx.config.advisory_wait_ms;
                tokio::time::sleep(Duration::from_millis(wait)).await;
                Remedy::new("ai_wait", format!("Waited {}ms as advised", wait))
            }
            RecommendedAction::Retry => Remedy::new("ai_retry", "Retry advised"),
            RecommendedAction::AlternativeSelector => {
                let Some(selector) = advice.alternative_selector.clone() else {
                    return TierOutcome::NoRemedy("no alternative selector given".to_string());
                };
                if !page.exists(&selector).await.unwrap_or(false) {
                    return TierOutcome::NoRemedy(format!(
                        "suggested selector {} matches nothing",
                        selector
                    ));
                }
                let mut remedy = Remedy::new(
                    "ai_alternative_selector",
                    format!("Switching to suggested selector {}", selector),
                );
                remedy.replacement_locator = Some(selector);
                remedy
            }
            RecommendedAction::PageAction => {
                let mut performed = Vec::new();
                for step in &advice.healing_steps {
                    let lower = step.to_lowercase();
                    if lower.contains("modal") || lower.contains("dismiss") || lower.contains("close") {
                        if page.press_key("Escape").await.is_ok() {
                            performed.push("escape");
                        }
                    } else if lower.contains("scroll") {
                        if page.press_key("PageDown").await.is_ok() {
                            performed.push("scroll");
                        }
                    } else if (lower.contains("refresh") || lower.contains("reload"))
                        && page.reload().await.is_ok()
                    {
                        tokio::time::sleep(Duration::from_millis(ctx.config.refresh_wait_ms)).await;
                        performed.push("reload");
                    }
                }
                if performed.is_empty() {
                    return TierOutcome::NoRemedy("no advised page action was applicable".to_string());
                }
                Remedy::new(
                    "ai_page_action",
                    format!("Performed page actions: {}", performed.join(", ")),
                )
            }
            RecommendedAction::SessionRefresh => {
                if let Err(e) = page.reload().await {
                    return TierOutcome::NoRemedy(format!("reload failed: {:#}", e));
                }
                tokio::time::sleep(Duration::from_millis(ctx.config.refresh_wait_ms)).await;
                Remedy::new("ai_session_refresh", "Reloaded the page as advised")
            }
            RecommendedAction::ManualIntervention => {
                return TierOutcome::NoRemedy("manual intervention required".to_string());
            }
        };

        remedy.reasoning = Some(advice.reasoning);
        remedy.confidence = Some(advice.confidence);
        TierOutcome::Resolved(remedy)
    }
}

#[async_trait]
impl HealingStrategy for AdvisoryTier {
    fn tier(&self) -> HealingTier {
        HealingTier::Advisory
    }

    async fn attempt(&self, ctx: &HealContext<'_>) -> TierOutcome {
        let request = Self::build_request(ctx).await;
        let raw = match self.service.advise(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Advisory service unavailable: {}", e);
                return TierOutcome::NoRemedy(e.to_string());
            }
        };

        match AdvisoryResponse::parse(&raw, ctx.config.min_confidence) {
            Some(advice) => Self::apply(ctx, advice).await,
            None => TierOutcome::NoRemedy("advice was malformed or low confidence".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakePage;
    use crate::error::StepError;
    use crate::parser::types::{ActionKind, Step};
    use crate::utils::config::HealingConfig;
    use parking_lot::Mutex;

    struct CannedAdvisor {
        reply: String,
        requests: Mutex<Vec<AdvisoryRequest>>,
    }

    impl CannedAdvisor {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AdvisoryService for CannedAdvisor {
        async fn advise(&self, request: &AdvisoryRequest) -> Result<String, AdvisoryError> {
            self.requests.lock().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    async fn attempt(advisor: Arc<CannedAdvisor>, page: &FakePage) -> TierOutcome {
        let config = HealingConfig {
            advisory_wait_ms: 1,
            refresh_wait_ms: 1,
            content_limit: 10,
            ..Default::default()
        };
        let mut step = Step::new(3, ActionKind::Click);
        step.primary_locator = Some("#submit".into());
        let error = StepError::ElementNotFound {
            target: "Submit".into(),
            tried: vec!["#submit".into()],
        };
        let ctx = HealContext {
            page,
            step: &step,
            error: &error,
            error_text: error.to_string(),
            config: &config,
        };
        AdvisoryTier::new(advisor).attempt(&ctx).await
    }

    #[test]
    fn test_parse_strips_markdown_fence() {
        let raw = "Here you go:\n```json\n{\"recommended_action\": \"wait\", \"reasoning\": \"slow\", \"confidence\": 0.8}\n```";
        let advice = AdvisoryResponse::parse(raw, 0.5).unwrap();
        assert_eq!(advice.recommended_action, RecommendedAction::Wait);
        assert_eq!(advice.reasoning, "slow");
    }

    #[test]
    fn test_parse_rejects_bad_advice() {
        assert!(AdvisoryResponse::parse("no json here", 0.5).is_none());
        assert!(AdvisoryResponse::parse(r#"{"recommended_action": "dance"}"#, 0.0).is_none());
        assert!(AdvisoryResponse::parse(
            r#"{"recommended_action": "wait", "confidence": 0.2}"#,
            0.5
        )
        .is_none());
        assert!(AdvisoryResponse::parse(
            r#"{"recommended_action": "wait", "confidence": 1.7}"#,
            0.5
        )
        .is_none());
        assert!(AdvisoryResponse::parse(
            r#"{"recommended_action": "alternative_selector", "confidence": 0.9}"#,
            0.5
        )
        .is_none());
        assert!(AdvisoryResponse::parse(
            r#"{"recommended_action": "retry", "confidence": 0.9, "requires_manual_intervention": true}"#,
            0.5
        )
        .is_none());
    }

    #[tokio::test]
    async fn test_alternative_selector_becomes_replacement_locator() {
        let advisor = CannedAdvisor::new(
            r#"{"recommended_action": "alternative_selector", "alternative_selector": "button[type=submit]", "confidence": 0.9, "reasoning": "id changed"}"#,
        );
        let page = FakePage::new()
            .with_visible(&["button[type=submit]"])
            .with_text("Order entry form with many fields");

        let outcome = attempt(advisor.clone(), &page).await;
        match outcome {
            TierOutcome::Resolved(remedy) => {
                assert_eq!(remedy.replacement_locator.as_deref(), Some("button[type=submit]"));
                assert_eq!(remedy.confidence, Some(0.9));
            }
            other => panic!("unexpected {:?}", other),
        }

        let requests = advisor.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].content, "Order entr");
        assert_eq!(requests[0].primary_locator.as_deref(), Some("#submit"));
    }

    #[tokio::test]
    async fn test_missing_alternative_selector_is_no_remedy() {
        let advisor = CannedAdvisor::new(
            r##"{"recommended_action": "alternative_selector", "alternative_selector": "#nope", "confidence": 0.9}"##,
        );
        let page = FakePage::new();
        assert!(matches!(attempt(advisor, &page).await, TierOutcome::NoRemedy(_)));
    }

    #[tokio::test]
    async fn test_page_action_maps_steps_to_keys() {
        let advisor = CannedAdvisor::new(
            r#"{"recommended_action": "page_action", "healing_steps": ["Dismiss modal", "Scroll down"], "confidence": 0.7}"#,
        );
        let page = FakePage::new();
        let outcome = attempt(advisor, &page).await;
        assert!(matches!(outcome, TierOutcome::Resolved(ref r) if r.strategy == "ai_page_action"));
        assert_eq!(page.calls(), vec!["key:Escape".to_string(), "key:PageDown".to_string()]);
    }

    #[tokio::test]
    async fn test_session_refresh_reloads() {
        let advisor =
            CannedAdvisor::new(r#"{"recommended_action": "session_refresh", "confidence": 0.6}"#);
        let page = FakePage::new();
        let outcome = attempt(advisor, &page).await;
        assert!(matches!(outcome, TierOutcome::Resolved(ref r) if r.strategy == "ai_session_refresh"));
        assert_eq!(page.call_count("reload"), 1);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
