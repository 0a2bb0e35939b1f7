//! Scriptable in-memory browser used by unit tests.

use crate::driver::traits::{BrowserLauncher, BrowserProcess, PageDriver, PageSetup};
use crate::utils::config::BrowserConfig;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct FakeState {
    url: String,
    title: String,
    text: String,
    visible: HashSet<String>,
    present: HashSet<String>,
    /// Locator -> remaining is_visible calls before it disappears
    vanishing: HashMap<String, u32>,
    /// Trigger (click locator or key) -> (hide, show)
    effects: HashMap<String, (Vec<String>, Vec<String>)>,
    click_errors: HashMap<String, VecDeque<String>>,
    redirects: HashMap<String, String>,
    ready: VecDeque<bool>,
    ready_default: bool,
    fail_goto: Option<String>,
    calls: Vec<String>,
}

pub struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                url: "about:blank".to_string(),
                ready_default: true,
                ..Default::default()
            }),
        }
    }

    pub fn with_visible(self, locators: &[&str]) -> Self {
        {
            let mut s = self.state.lock();
            for l in locators {
                s.visible.insert(l.to_string());
                s.present.insert(l.to_string());
            }
        }
        self
    }

    /// Attached to the DOM but hidden
    pub fn with_hidden(self, locators: &[&str]) -> Self {
        {
            let mut s = self.state.lock();
            for l in locators {
                s.present.insert(l.to_string());
            }
        }
        self
    }

    pub fn with_url(self, url: &str) -> Self {
        self.state.lock().url = url.to_string();
        self
    }

    pub fn with_text(self, text: &str) -> Self {
        self.state.lock().text = text.to_string();
        self
    }

    pub fn with_title(self, title: &str) -> Self {
        self.state.lock().title = title.to_string();
        self
    }

    /// Clicking `trigger` (or pressing it as a key) hides and shows locators
    pub fn on_trigger(self, trigger: &str, hide: &[&str], show: &[&str]) -> Self {
        self.state.lock().effects.insert(
            trigger.to_string(),
            (
                hide.iter().map(|s| s.to_string()).collect(),
                show.iter().map(|s| s.to_string()).collect(),
            ),
        );
        self
    }

    /// Fail the next `times` clicks on `locator` with `message`
    pub fn fail_clicks(self, locator: &str, times: usize, message: &str) -> Self {
        self.state
            .lock()
            .click_errors
            .insert(locator.to_string(), vec![message.to_string(); times].into());
        self
    }

    /// Visible for `polls` visibility checks, then gone
    pub fn vanishing(self, locator: &str, polls: u32) -> Self {
        {
            let mut s = self.state.lock();
            s.visible.insert(locator.to_string());
            s.present.insert(locator.to_string());
            s.vanishing.insert(locator.to_string(), polls);
        }
        self
    }

    pub fn redirect(self, from: &str, to: &str) -> Self {
        self.state
            .lock()
            .redirects
            .insert(from.to_string(), to.to_string());
        self
    }

    /// Answers for successive is_ready calls; `default` afterwards
    pub fn ready_sequence(self, answers: &[bool], default: bool) -> Self {
        {
            let mut s = self.state.lock();
            s.ready = answers.iter().copied().collect();
            s.ready_default = default;
        }
        self
    }

    pub fn failing_goto(self, message: &str) -> Self {
        self.state.lock().fail_goto = Some(message.to_string());
        self
    }

    pub fn show(&self, locator: &str) {
        let mut s = self.state.lock();
        s.visible.insert(locator.to_string());
        s.present.insert(locator.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn apply_effects(state: &mut FakeState, trigger: &str) {
        if let Some((hide, show)) = state.effects.get(trigger).cloned() {
            for l in hide {
                state.visible.remove(&l);
                state.present.remove(&l);
            }
            for l in show {
                state.visible.insert(l.clone());
                state.present.insert(l);
            }
        }
    }

    fn require_visible(state: &FakeState, locator: &str) -> Result<()> {
        if state.visible.contains(locator) {
            Ok(())
        } else {
            anyhow::bail!("Timeout 30000ms exceeded waiting for '{}'", locator)
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str, _timeout_ms: u64) -> Result<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("goto:{}", url));
        if let Some(ref msg) = s.fail_goto {
            anyhow::bail!("{}", msg);
        }
        s.url = s
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn exists(&self, locator: &str) -> Result<bool> {
        Ok(self.state.lock().present.contains(locator))
    }

    async fn is_visible(&self, locator: &str) -> Result<bool> {
        let mut s = self.state.lock();
        if let Some(remaining) = s.vanishing.get_mut(locator) {
            if *remaining == 0 {
                s.vanishing.remove(locator);
                s.visible.remove(locator);
                s.present.remove(locator);
                return Ok(false);
            }
            *remaining -= 1;
        }
        Ok(s.visible.contains(locator))
    }

    async fn click(&self, locator: &str, _timeout_ms: u64) -> Result<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("click:{}", locator));
        if let Some(queue) = s.click_errors.get_mut(locator) {
            if let Some(msg) = queue.pop_front() {
                anyhow::bail!("{}", msg);
            }
        }
        Self::require_visible(&s, locator)?;
        Self::apply_effects(&mut s, locator);
        Ok(())
    }

    async fn fill(&self, locator: &str, text: &str, _timeout_ms: u64) -> Result<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("fill:{}={}", locator, text));
        Self::require_visible(&s, locator)
    }

    async fn select_option(&self, locator: &str, value: &str, _timeout_ms: u64) -> Result<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("select:{}={}", locator, value));
        Self::require_visible(&s, locator)
    }

    async fn scroll_into_view(&self, locator: &str) -> Result<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("scroll:{}", locator));
        if !s.present.contains(locator) {
            anyhow::bail!("Element not found for scroll: {}", locator);
        }
        s.visible.insert(locator.to_string());
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        let mut s = self.state.lock();
        s.calls.push(format!("key:{}", key));
        Self::apply_effects(&mut s, key);
        Ok(())
    }

    async fn text_content(&self) -> Result<String> {
        Ok(self.state.lock().text.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.state.lock().title.clone())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.state
            .lock()
            .calls
            .push(format!("screenshot:{}", path.display()));
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let mut s = self.state.lock();
        s.calls.push("reload".to_string());
        Self::apply_effects(&mut s, "reload");
        Ok(())
    }

    async fn is_ready(&self) -> Result<bool> {
        let mut s = self.state.lock();
        let default = s.ready_default;
        Ok(s.ready.pop_front().unwrap_or(default))
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().calls.push("close".to_string());
        Ok(())
    }
}

/// Launcher handing out a shared FakePage
pub struct FakeLauncher {
    pub page: Arc<FakePage>,
    pub launches: AtomicUsize,
    pub pages_opened: Arc<AtomicUsize>,
    pub browsers_closed: Arc<AtomicUsize>,
    pub setups: Arc<Mutex<Vec<PageSetup>>>,
    fail_launch: Option<String>,
    launch_delay_ms: u64,
}

impl FakeLauncher {
    pub fn new(page: Arc<FakePage>) -> Self {
        Self {
            page,
            launches: AtomicUsize::new(0),
            pages_opened: Arc::new(AtomicUsize::new(0)),
            browsers_closed: Arc::new(AtomicUsize::new(0)),
            setups: Arc::new(Mutex::new(Vec::new())),
            fail_launch: None,
            launch_delay_ms: 0,
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut launcher = Self::new(Arc::new(FakePage::new()));
        launcher.fail_launch = Some(message.to_string());
        launcher
    }

    pub fn with_launch_delay(mut self, ms: u64) -> Self {
        self.launch_delay_ms = ms;
        self
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _config: &BrowserConfig) -> Result<Arc<dyn BrowserProcess>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.launch_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.launch_delay_ms)).await;
        }
        if let Some(ref msg) = self.fail_launch {
            anyhow::bail!("{}", msg);
        }
        Ok(Arc::new(FakeBrowser {
            page: self.page.clone(),
            pages_opened: self.pages_opened.clone(),
            closed: self.browsers_closed.clone(),
            setups: self.setups.clone(),
        }))
    }
}

struct FakeBrowser {
    page: Arc<FakePage>,
    pages_opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    setups: Arc<Mutex<Vec<PageSetup>>>,
}

#[async_trait]
impl BrowserProcess for FakeBrowser {
    async fn new_page(&self, setup: &PageSetup) -> Result<Arc<dyn PageDriver>> {
        self.pages_opened.fetch_add(1, Ordering::SeqCst);
        self.setups.lock().push(setup.clone());
        Ok(self.page.clone())
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
