use crate::utils::config::BrowserConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Page configuration applied when a session is created
#[derive(Debug, Clone)]
pub struct PageSetup {
    pub default_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: Option<String>,
    /// Scripts evaluated in every document before page scripts run
    pub init_scripts: Vec<String>,
}

/// Browser page interface used by the executor and the healer
///
/// Locators are Playwright selector strings (CSS, `text=`, `xpath=`).
/// Implementations must be safe to share across tasks; the executor never
/// issues two actions on the same page concurrently.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for network idle
    async fn goto(&self, url: &str, timeout_ms: u64) -> Result<()>;

    /// Whether the locator matches at least one element
    async fn exists(&self, locator: &str) -> Result<bool>;

    /// Whether the first match of the locator is visible
    async fn is_visible(&self, locator: &str) -> Result<bool>;

    async fn click(&self, locator: &str, timeout_ms: u64) -> Result<()>;

    /// Clear the field, then type `text`
    async fn fill(&self, locator: &str, text: &str, timeout_ms: u64) -> Result<()>;

    /// Pick an option of a `<select>` by value or label
    async fn select_option(&self, locator: &str, value: &str, timeout_ms: u64) -> Result<()>;

    async fn scroll_into_view(&self, locator: &str) -> Result<()>;

    /// Press and release a single key (e.g. "Escape", "PageDown")
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Visible text of the document body
    async fn text_content(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn url(&self) -> Result<String>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    /// Readiness as reported by the injected page helpers
    async fn is_ready(&self) -> Result<bool>;

    async fn close(&self) -> Result<()>;
}

/// A running browser process able to open configured pages
#[async_trait]
pub trait BrowserProcess: Send + Sync {
    async fn new_page(&self, setup: &PageSetup) -> Result<Arc<dyn PageDriver>>;

    async fn close(&self) -> Result<()>;
}

/// Starts browser processes
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> Result<Arc<dyn BrowserProcess>>;
}
