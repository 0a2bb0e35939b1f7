//! Browser resource pool.
//!
//! Owns one browser process and at most one live session. The process is
//! launched lazily on the first `acquire` and the session is reused across
//! runs until it is ended explicitly or the pool shuts down.

use crate::driver::scripts;
use crate::driver::traits::{BrowserLauncher, BrowserProcess, PageDriver, PageSetup};
use crate::error::PoolError;
use crate::utils::config::EngineConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// One live page shared by consecutive runs
pub struct BrowserSession {
    pub id: String,
    page: Arc<dyn PageDriver>,
    created_at: DateTime<Utc>,
    last_used: parking_lot::Mutex<DateTime<Utc>>,
    active: AtomicBool,
}

impl BrowserSession {
    fn new(page: Arc<dyn PageDriver>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            page,
            created_at: now,
            last_used: parking_lot::Mutex::new(now),
            active: AtomicBool::new(true),
        }
    }

    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used(&self) -> DateTime<Utc> {
        *self.last_used.lock()
    }

    fn touch(&self) {
        *self.last_used.lock() = Utc::now();
    }

    /// Session backed by an arbitrary page, for executor tests
    #[cfg(test)]
    pub(crate) fn for_page(page: Arc<dyn PageDriver>) -> Arc<Self> {
        Arc::new(Self::new(page))
    }
}

/// Snapshot of the pool for status queries
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub browser_running: bool,
    pub session_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct PoolInner {
    process: Option<Arc<dyn BrowserProcess>>,
    session: Option<Arc<BrowserSession>>,
}

pub struct BrowserPool {
    launcher: Arc<dyn BrowserLauncher>,
    config: EngineConfig,
    inner: Mutex<PoolInner>,
    shut_down: AtomicBool,
}

impl BrowserPool {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: EngineConfig) -> Self {
        Self {
            launcher,
            config,
            inner: Mutex::new(PoolInner::default()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Page configuration applied to every new session
    pub fn page_setup(&self) -> PageSetup {
        PageSetup {
            default_timeout_ms: self.config.timeouts.default_timeout_ms,
            navigation_timeout_ms: self.config.timeouts.navigation_timeout_ms,
            viewport_width: self.config.browser.viewport_width,
            viewport_height: self.config.browser.viewport_height,
            user_agent: self.config.browser.user_agent.clone(),
            init_scripts: scripts::session_scripts(),
        }
    }

    /// Return the active session, launching the browser and creating a
    /// session as needed. Concurrent callers share a single launch.
    pub async fn acquire(&self) -> Result<Arc<BrowserSession>, PoolError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(PoolError::ShutDown);
        }

        let mut inner = self.inner.lock().await;

        // Shutdown may have won the race for the lock
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(PoolError::ShutDown);
        }

        let process = match inner.process.clone() {
            Some(process) => process,
            None => {
                log::info!("Launching browser process");
                let process = self
                    .launcher
                    .launch(&self.config.browser)
                    .await
                    .map_err(|e| PoolError::Initialization(format!("{:#}", e)))?;
                inner.process = Some(process.clone());
                process
            }
        };

        if let Some(ref session) = inner.session {
            if session.is_active() {
                session.touch();
                return Ok(session.clone());
            }
        }

        let page = process
            .new_page(&self.page_setup())
            .await
            .map_err(|e| PoolError::Session(format!("{:#}", e)))?;
        let session = Arc::new(BrowserSession::new(page));
        log::info!("Created browser session {}", session.id);
        inner.session = Some(session.clone());
        Ok(session)
    }

    /// Hand a session back after a run; it stays alive for reuse
    pub fn release(&self, session: &BrowserSession) {
        session.touch();
    }

    /// Close the current session so the next acquire starts fresh
    pub async fn end_session(&self) {
        let session = self.inner.lock().await.session.take();
        if let Some(session) = session {
            session.active.store(false, Ordering::SeqCst);
            if let Err(e) = session.page.close().await {
                log::warn!("Failed to close session {}: {:#}", session.id, e);
            }
            log::info!("Ended browser session {}", session.id);
        }
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.inner.lock().await;
        let session = inner.session.as_ref().filter(|s| s.is_active());
        SessionStatus {
            browser_running: inner.process.is_some(),
            session_id: session.map(|s| s.id.clone()),
            created_at: session.map(|s| s.created_at()),
            last_used: session.map(|s| s.last_used()),
        }
    }

    /// Close the session and the browser. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.end_session().await;

        let process = self.inner.lock().await.process.take();
        if let Some(process) = process {
            if let Err(e) = process.close().await {
                log::warn!("Failed to close browser: {:#}", e);
            }
            log::info!("Browser pool shut down");
        }
    }
}
