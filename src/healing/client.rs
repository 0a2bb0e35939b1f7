use super::advisory::{AdvisoryError, AdvisoryRequest, AdvisoryService};
use crate::utils::config::AdvisoryConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are an expert in recovering automated browser tests against \
legacy enterprise web applications. Given a failed step and the page it failed on, reply with \
a single JSON object with the keys recommended_action (one of wait, retry, \
alternative_selector, page_action, session_refresh, manual_intervention), reasoning, \
healing_steps (array of strings), alternative_selector (string or null), confidence \
(number between 0 and 1) and requires_manual_intervention (boolean).";

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Advisory service backed by an OpenAI-compatible chat completion API.
///
/// Azure deployments are addressed by deployment name with an `api-key`
/// header; anything else gets bearer auth and a `model` field.
pub struct ChatCompletionAdvisor {
    client: reqwest::Client,
    url: String,
    api_key: String,
    azure: bool,
    config: AdvisoryConfig,
}

impl ChatCompletionAdvisor {
    pub fn new(config: AdvisoryConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .context("Advisory endpoint is not configured")?;
        let api_key = config
            .api_key
            .clone()
            .context("Advisory API key is not configured")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let azure = endpoint.contains("azure");
        let url = if azure {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, config.deployment, config.api_version
            )
        } else {
            format!("{}/chat/completions", endpoint)
        };

        Ok(Self {
            client,
            url,
            api_key,
            azure,
            config,
        })
    }

    /// Build an advisor only when the endpoint and key are both set
    pub fn from_config(config: &AdvisoryConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        match Self::new(config.clone()) {
            Ok(advisor) => Some(advisor),
            Err(e) => {
                log::warn!("Advisory healing disabled: {:#}", e);
                None
            }
        }
    }

    fn user_prompt(request: &AdvisoryRequest) -> String {
        let fallbacks = if request.fallback_locators.is_empty() {
            "none".to_string()
        } else {
            request.fallback_locators.join(", ")
        };
        format!(
            "Failed step\n  action: {}\n  target: {}\n  description: {}\n  primary locator: {}\n  \
             fallback locators: {}\nError: {}\n\nPage\n  url: {}\n  title: {}\n  content:\n{}",
            request.action,
            request.target,
            request.description,
            request.primary_locator.as_deref().unwrap_or("none"),
            fallbacks,
            request.error,
            request.url,
            request.title,
            request.content
        )
    }

    fn body(&self, request: &AdvisoryRequest) -> serde_json::Value {
        let mut body = json!({
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": Self::user_prompt(request) },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        if !self.azure {
            body["model"] = json!(self.config.deployment);
        }
        body
    }
}

#[async_trait]
impl AdvisoryService for ChatCompletionAdvisor {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<String, AdvisoryError> {
        let builder = self.client.post(&self.url).json(&self.body(request));
        let builder = if self.azure {
            builder.header("api-key", &self.api_key)
        } else {
            builder.bearer_auth(&self.api_key)
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdvisoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AdvisoryError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> AdvisoryConfig {
        AdvisoryConfig {
            endpoint: Some(endpoint.to_string()),
            api_key: Some("k".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_azure_endpoint_uses_deployment_url() {
        let advisor = ChatCompletionAdvisor::new(config("https://corp.openai.azure.com/")).unwrap();
        assert_eq!(
            advisor.url,
            "https://corp.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-15-preview"
        );
        let request = AdvisoryRequest {
            action: "click".into(),
            target: "Save".into(),
            description: String::new(),
            primary_locator: None,
            fallback_locators: vec![],
            error: "boom".into(),
            url: String::new(),
            title: String::new(),
            content: String::new(),
        };
        assert!(advisor.body(&request).get("model").is_none());
    }

    #[test]
    fn test_generic_endpoint_sends_model() {
        let advisor = ChatCompletionAdvisor::new(config("http://localhost:8080/v1")).unwrap();
        assert_eq!(advisor.url, "http://localhost:8080/v1/chat/completions");
        let request = AdvisoryRequest {
            action: "click".into(),
            target: "Save".into(),
            description: "Save the order".into(),
            primary_locator: Some("#save".into()),
            fallback_locators: vec!["text=Save".into()],
            error: "Element not found: Save".into(),
            url: "http://erp/orders".into(),
            title: "Orders".into(),
            content: "Orders".into(),
        };
        let body = advisor.body(&request);
        assert_eq!(body["model"], "gpt-4o");
        let prompt = body["messages"][1]["content"].as_str().unwrap();
        assert!(prompt.contains("primary locator: #save"));
        assert!(prompt.contains("fallback locators: text=Save"));
    }

    #[test]
    fn test_unconfigured_advisor_is_absent() {
        assert!(ChatCompletionAdvisor::from_config(&AdvisoryConfig::default()).is_none());
    }
}
