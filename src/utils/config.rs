use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Browser engine to launch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl std::str::FromStr for BrowserKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => anyhow::bail!("Unknown browser: {}", other),
        }
    }
}

/// Launch arguments that keep old intranet apps loadable
pub const LEGACY_LAUNCH_ARGS: [&str; 5] = [
    "--disable-web-security",
    "--ignore-certificate-errors",
    "--allow-running-insecure-content",
    "--no-sandbox",
    "--disable-dev-shm-usage",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub args: Vec<String>,
    pub executable_path: Option<PathBuf>,
    /// Stop image and web font fetches (Chromium and Firefox; WebKit is not covered)
    pub block_static_assets: bool,
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            args: LEGACY_LAUNCH_ARGS.iter().map(|s| s.to_string()).collect(),
            executable_path: None,
            block_static_assets: true,
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
        }
    }
}

/// Timing knobs, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub default_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    /// Minimum duration of a `wait` step
    pub wait_floor_ms: u64,
    /// Upper bound on locator polling per step
    pub element_wait_ms: u64,
    /// Budget for the pre-step stability poll
    pub stability_timeout_ms: u64,
    pub navigation_settle_ms: u64,
    pub inter_step_delay_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 180_000,
            navigation_timeout_ms: 300_000,
            wait_floor_ms: 180_000,
            element_wait_ms: 180_000,
            stability_timeout_ms: 30_000,
            navigation_settle_ms: 3_000,
            inter_step_delay_ms: 1_000,
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    pub extended_wait_ms: u64,
    pub loading_wait_ms: u64,
    pub settle_wait_ms: u64,
    pub advisory_wait_ms: u64,
    pub refresh_wait_ms: u64,
    /// Advisory responses below this confidence are ignored
    pub min_confidence: f64,
    /// Characters of page text sent to the advisory service
    pub content_limit: usize,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            extended_wait_ms: 3_000,
            loading_wait_ms: 15_000,
            settle_wait_ms: 2_000,
            advisory_wait_ms: 5_000,
            refresh_wait_ms: 3_000,
            min_confidence: 0.5,
            content_limit: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Window in which a repeated start for the same session is dropped
    pub debounce_ms: u64,
    pub event_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            event_capacity: 100,
        }
    }
}

/// OpenAI-compatible chat completion endpoint used for advisory healing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub endpoint: Option<String>,
    pub deployment: String,
    pub api_key: Option<String>,
    pub api_version: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            deployment: "gpt-4o".to_string(),
            api_key: None,
            api_version: "2024-02-15-preview".to_string(),
            timeout_secs: 30,
            temperature: 0.2,
            max_tokens: 800,
        }
    }
}

impl AdvisoryConfig {
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.api_key.is_some()
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub browser: BrowserConfig,
    pub timeouts: TimeoutConfig,
    pub healing: HealingConfig,
    pub control: ControlConfig,
    pub advisory: AdvisoryConfig,
    /// Root directory for reports and screenshots
    pub output_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            timeouts: TimeoutConfig::default(),
            healing: HealingConfig::default(),
            control: ControlConfig::default(),
            advisory: AdvisoryConfig::default(),
            output_dir: PathBuf::from("./output"),
        }
    }
}

impl EngineConfig {
    /// Load from an optional YAML/JSON file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config: {}", p.display()))?;
                serde_yaml::from_str(&content)
                    .with_context(|| format!("Invalid config: {}", p.display()))?
            }
            None => EngineConfig::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LEGACY_E2E_HEADLESS") {
            self.browser.headless = v == "true" || v == "1";
        }
        if let Some(v) = lookup("LEGACY_E2E_BROWSER") {
            match v.parse() {
                Ok(kind) => self.browser.browser = kind,
                Err(e) => log::warn!("Ignoring LEGACY_E2E_BROWSER: {}", e),
            }
        }
        if let Some(v) = lookup("PLAYWRIGHT_CHROMIUM_EXECUTABLE_PATH") {
            self.browser.executable_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("LEGACY_E2E_ADVISORY_ENDPOINT") {
            self.advisory.endpoint = Some(v);
        }
        if let Some(v) = lookup("LEGACY_E2E_ADVISORY_KEY") {
            self.advisory.api_key = Some(v);
        }
        if let Some(v) = lookup("LEGACY_E2E_ADVISORY_DEPLOYMENT") {
            self.advisory.deployment = v;
        }
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }

    /// Millisecond-scale timings for unit tests
    #[cfg(test)]
    pub(crate) fn fast() -> Self {
        let mut config = EngineConfig::default();
        config.timeouts = TimeoutConfig {
            default_timeout_ms: 200,
            navigation_timeout_ms: 200,
            wait_floor_ms: 5,
            element_wait_ms: 60,
            stability_timeout_ms: 20,
            navigation_settle_ms: 1,
            inter_step_delay_ms: 1,
            poll_interval_ms: 5,
        };
        config.healing = HealingConfig {
            extended_wait_ms: 1,
            loading_wait_ms: 40,
            settle_wait_ms: 1,
            advisory_wait_ms: 1,
            refresh_wait_ms: 1,
            min_confidence: 0.5,
            content_limit: 1_000,
        };
        config.control.debounce_ms = 0;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_tuned_for_legacy_apps() {
        let config = EngineConfig::default();
        assert_eq!(config.timeouts.default_timeout_ms, 180_000);
        assert_eq!(config.timeouts.navigation_timeout_ms, 300_000);
        assert_eq!(config.browser.viewport_width, 1920);
        assert!(config
            .browser
            .args
            .contains(&"--ignore-certificate-errors".to_string()));
        assert!(!config.advisory.is_configured());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(
            &path,
            "timeouts:\n  inter_step_delay_ms: 250\nbrowser:\n  browser: firefox\n",
        )
        .unwrap();

        let config: EngineConfig =
            serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.timeouts.inter_step_delay_ms, 250);
        assert_eq!(config.timeouts.wait_floor_ms, 180_000);
        assert_eq!(config.browser.browser, BrowserKind::Firefox);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("LEGACY_E2E_HEADLESS", "false"),
            ("LEGACY_E2E_BROWSER", "webkit"),
            ("LEGACY_E2E_ADVISORY_ENDPOINT", "https://llm.internal"),
            ("LEGACY_E2E_ADVISORY_KEY", "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert!(!config.browser.headless);
        assert_eq!(config.browser.browser, BrowserKind::Webkit);
        assert!(config.advisory.is_configured());
    }
}
