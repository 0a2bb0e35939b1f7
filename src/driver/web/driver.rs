//! Playwright-backed browser process and page driver.

use anyhow::{Context, Result};
use async_trait::async_trait;
use playwright::api::{Browser, BrowserContext, DocumentLoadState, Page, Viewport};
use playwright::Playwright;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::driver::scripts;
use crate::driver::traits::{BrowserLauncher, BrowserProcess, PageDriver, PageSetup};
use crate::utils::config::{BrowserConfig, BrowserKind};

/// Launches browsers through Playwright
#[derive(Debug, Default)]
pub struct PlaywrightLauncher;

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self, config: &BrowserConfig) -> Result<Arc<dyn BrowserProcess>> {
        let playwright = Playwright::initialize()
            .await
            .context("Failed to initialize Playwright")?;

        let browser = match config.browser {
            BrowserKind::Chromium => launch_chromium_browser(&playwright, config).await?,
            BrowserKind::Firefox => {
                playwright
                    .firefox()
                    .launcher()
                    .headless(config.headless)
                    .firefox_user_prefs(firefox_user_prefs(config))
                    .launch()
                    .await?
            }
            BrowserKind::Webkit => {
                if config.block_static_assets {
                    log::warn!(
                        "Static asset blocking is not supported on WebKit; images and fonts will load"
                    );
                }
                playwright
                    .webkit()
                    .launcher()
                    .headless(config.headless)
                    .launch()
                    .await?
            }
        };

        log::info!(
            "Launched {:?} (headless: {})",
            config.browser,
            config.headless
        );

        Ok(Arc::new(PlaywrightBrowser {
            _playwright: playwright,
            browser,
        }))
    }
}

async fn launch_chromium_browser(playwright: &Playwright, config: &BrowserConfig) -> Result<Browser> {
    let chromium = playwright.chromium();
    let mut launcher = chromium.launcher().headless(config.headless);

    let executable = config.executable_path.clone().or_else(find_system_browser);
    if let Some(ref path) = executable {
        log::info!("Using browser executable: {}", path.display());
        launcher = launcher.executable(path);
    }

    let args = chromium_launch_args(config);
    launcher = launcher.args(&args);

    Ok(launcher.launch().await?)
}

/// Configured args plus the switches that stop image and web font fetches
fn chromium_launch_args(config: &BrowserConfig) -> Vec<String> {
    let mut args = config.args.clone();
    if config.block_static_assets {
        args.push("--blink-settings=imagesEnabled=false".to_string());
        args.push("--disable-remote-fonts".to_string());
    }
    args
}

fn firefox_user_prefs(config: &BrowserConfig) -> serde_json::Map<String, serde_json::Value> {
    let mut prefs = serde_json::Map::new();
    if config.block_static_assets {
        // 2 = block all images
        prefs.insert("permissions.default.image".to_string(), 2.into());
        prefs.insert("gfx.downloadable_fonts.enabled".to_string(), false.into());
    }
    prefs
}

fn find_system_browser() -> Option<PathBuf> {
    let common_paths = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    common_paths
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(|p| p.to_path_buf())
}

/// A launched Playwright browser
pub struct PlaywrightBrowser {
    _playwright: Playwright,
    browser: Browser,
}

#[async_trait]
impl BrowserProcess for PlaywrightBrowser {
    async fn new_page(&self, setup: &PageSetup) -> Result<Arc<dyn PageDriver>> {
        let viewport = Viewport {
            width: setup.viewport_width as i32,
            height: setup.viewport_height as i32,
        };

        let mut builder = self
            .browser
            .context_builder()
            .viewport(Some(viewport.clone()))
            .ignore_https_errors(true);
        if let Some(ref ua) = setup.user_agent {
            builder = builder.user_agent(ua);
        }
        let context = builder.build().await?;

        let page = context.new_page().await?;
        page.set_viewport_size(viewport).await?;
        page.set_default_timeout(setup.default_timeout_ms as u32)
            .await?;
        page.set_default_navigation_timeout(setup.navigation_timeout_ms as u32)
            .await?;

        for script in &setup.init_scripts {
            page.add_init_script(script)
                .await
                .context("Failed to inject page helpers")?;
        }

        Ok(Arc::new(WebPage {
            context,
            page: Mutex::new(page),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

/// One browser context with a single page
pub struct WebPage {
    context: BrowserContext,
    page: Mutex<Page>,
}

#[async_trait]
impl PageDriver for WebPage {
    async fn goto(&self, url: &str, timeout_ms: u64) -> Result<()> {
        let page = self.page.lock().await;
        page.goto_builder(url)
            .wait_until(DocumentLoadState::NetworkIdle)
            .timeout(timeout_ms as f64)
            .goto()
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }

    async fn exists(&self, locator: &str) -> Result<bool> {
        let page = self.page.lock().await;
        Ok(page.query_selector(locator).await?.is_some())
    }

    async fn is_visible(&self, locator: &str) -> Result<bool> {
        let page = self.page.lock().await;
        match page.query_selector(locator).await? {
            Some(el) => Ok(el.is_visible().await?),
            None => Ok(false),
        }
    }

    async fn click(&self, locator: &str, timeout_ms: u64) -> Result<()> {
        let page = self.page.lock().await;
        page.click_builder(locator)
            .timeout(timeout_ms as f64)
            .click()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to click: {}. Error: {:?}", locator, e))?;
        Ok(())
    }

    async fn fill(&self, locator: &str, text: &str, timeout_ms: u64) -> Result<()> {
        let page = self.page.lock().await;
        // fill() clears the field before typing
        page.fill_builder(locator, text)
            .timeout(timeout_ms as f64)
            .fill()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fill: {}. Error: {:?}", locator, e))?;
        Ok(())
    }

    async fn select_option(&self, locator: &str, value: &str, timeout_ms: u64) -> Result<()> {
        let page = self.page.lock().await;
        let handle = page
            .wait_for_selector_builder(locator)
            .timeout(timeout_ms as f64)
            .wait_for_selector()
            .await?
            .ok_or_else(|| anyhow::anyhow!("Select element not found: {}", locator))?;
        page.evaluate::<_, ()>(&scripts::select_option(value), handle)
            .await?;
        Ok(())
    }

    async fn scroll_into_view(&self, locator: &str) -> Result<()> {
        let page = self.page.lock().await;
        match page.query_selector(locator).await? {
            Some(el) => {
                el.scroll_into_view_if_needed(None).await?;
                Ok(())
            }
            None => anyhow::bail!("Element not found for scroll: {}", locator),
        }
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.keyboard.down(key).await?;
        page.keyboard.up(key).await?;
        Ok(())
    }

    async fn text_content(&self) -> Result<String> {
        let page = self.page.lock().await;
        Ok(page.evaluate::<(), String>(scripts::BODY_TEXT, ()).await?)
    }

    async fn title(&self) -> Result<String> {
        let page = self.page.lock().await;
        Ok(page.evaluate::<(), String>(scripts::TITLE, ()).await?)
    }

    async fn url(&self) -> Result<String> {
        let page = self.page.lock().await;
        Ok(page.evaluate::<(), String>(scripts::LOCATION, ()).await?)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let page = self.page.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        page.screenshot_builder()
            .path(path.to_path_buf())
            .screenshot()
            .await?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let page = self.page.lock().await;
        page.evaluate::<(), ()>(scripts::RELOAD, ()).await?;
        Ok(())
    }

    async fn is_ready(&self) -> Result<bool> {
        let page = self.page.lock().await;
        Ok(page.evaluate::<(), bool>(scripts::IS_READY, ()).await?)
    }

    async fn close(&self) -> Result<()> {
        let page = self.page.lock().await;
        page.close(None).await.ok();
        self.context.close().await?;
        Ok(())
    }
}
