//! The portal adapter: a logged-in Chromium page hosting the 入力ガイド wizard.
//!
//! Only bootstrap and raw control access live here. Which screen to expect,
//! how long to wait and when to retry is decided by the engine.

use crate::chromium::{self, LaunchedBrowser};
use crate::config::RunnerConfig;
use crate::script;
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use guidewalk::descriptor::CANCEL_LABELS;
use guidewalk::error::{SessionResult, SurfaceResult};
use guidewalk::{Domain, SessionError, SessionProvider, SurfaceError, UiOption, WizardSurface};
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// CDP error texts that mean the page or browser is gone.
const DISCONNECT_MARKERS: &[&str] = &["Session closed", "Target closed", "Protocol error"];

/// Timings and credentials for one portal login.
#[derive(Debug, Clone)]
pub struct PortalOptions {
    pub login_url: String,
    pub username: String,
    pub password: String,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    /// Page loads and the login round trip.
    pub navigation_timeout: Duration,
    /// Pause after the login page loads and after entering the search page.
    pub page_settle: Duration,
    /// Pause after opening or closing the modal.
    pub modal_delay: Duration,
    /// Pause after each select or button press.
    pub action_pause: Duration,
}

impl From<&RunnerConfig> for PortalOptions {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            login_url: config.login_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            headless: config.headless,
            chrome_path: config.chrome_path.clone(),
            navigation_timeout: Duration::from_secs(60),
            page_settle: Duration::from_secs(5),
            modal_delay: Duration::from_millis(2000),
            action_pause: Duration::from_millis(500),
        }
    }
}

/// Classify a CDP failure: a dead target breaks the session, anything else
/// is a single failed interaction.
pub fn classify(err: impl Display) -> SurfaceError {
    let message = err.to_string();
    if DISCONNECT_MARKERS.iter().any(|m| message.contains(m)) {
        SurfaceError::Disconnected(message)
    } else {
        SurfaceError::Interaction(message)
    }
}

/// Opens one browser per session, logged in and parked on the rental search
/// page.
pub struct PortalSessionProvider {
    options: PortalOptions,
}

impl PortalSessionProvider {
    pub fn new(options: PortalOptions) -> Self {
        Self { options }
    }

    async fn bootstrap(&self, browser: &Browser) -> SessionResult<Page> {
        let opts = &self.options;
        let page = tokio::time::timeout(opts.navigation_timeout, browser.new_page(opts.login_url.as_str()))
            .await
            .map_err(|_| SessionError::Navigation(format!("login page timed out: {}", opts.login_url)))?
            .map_err(|e| SessionError::Navigation(e.to_string()))?;
        tokio::time::sleep(opts.page_settle).await;

        let form_ready = poll_true(&page, "document.querySelector('input') !== null", opts.navigation_timeout).await;
        if !form_ready {
            return Err(SessionError::Navigation("login form never appeared".into()));
        }

        info!("logging in");
        let pressed: bool = evaluate(&page, script::login(&opts.username, &opts.password))
            .await
            .map_err(|e| SessionError::Authentication(e.to_string()))?;
        if !pressed {
            return Err(SessionError::Authentication("login button not found".into()));
        }
        let _ = tokio::time::timeout(Duration::from_secs(15), page.wait_for_navigation()).await;
        tokio::time::sleep(opts.modal_delay).await;

        let still_on_login: bool = evaluate(&page, script::login_form_present())
            .await
            .map_err(|e| SessionError::Authentication(e.to_string()))?;
        if still_on_login {
            return Err(SessionError::Authentication("login form still shown".into()));
        }

        let entered: bool = evaluate(&page, script::open_rental_search())
            .await
            .map_err(|e| SessionError::Navigation(e.to_string()))?;
        if !entered {
            return Err(SessionError::Navigation("rental search entry not found".into()));
        }
        tokio::time::sleep(opts.page_settle).await;
        info!("on rental search page");
        Ok(page)
    }
}

#[async_trait]
impl SessionProvider for PortalSessionProvider {
    async fn open(&self) -> SessionResult<Box<dyn WizardSurface>> {
        let LaunchedBrowser { mut browser, handler } =
            chromium::launch(self.options.chrome_path.as_deref(), self.options.headless)
                .await
                .map_err(|e| SessionError::Launch(format!("{e:#}")))?;

        match self.bootstrap(&browser).await {
            Ok(page) => {
                let id = Uuid::new_v4().to_string();
                info!(session = %id, "portal session ready");
                Ok(Box::new(PortalSurface {
                    id,
                    browser,
                    handler,
                    page,
                    options: self.options.clone(),
                }))
            }
            Err(e) => {
                shutdown(&mut browser, handler).await;
                Err(e)
            }
        }
    }

    async fn close(&self, surface: Box<dyn WizardSurface>) {
        surface.close().await;
    }
}

/// The wizard controls of one logged-in page.
pub struct PortalSurface {
    id: String,
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    options: PortalOptions,
}

impl PortalSurface {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> SurfaceResult<T> {
        evaluate(&self.page, script).await
    }
}

#[async_trait]
impl WizardSurface for PortalSurface {
    async fn open_guide(&mut self, domain: Domain) -> SurfaceResult<()> {
        // A reload is the only reliable way to reset the modal's state.
        tokio::time::timeout(self.options.navigation_timeout, self.page.reload())
            .await
            .map_err(|_| SurfaceError::Interaction("page reload timed out".into()))?
            .map_err(classify)?;
        tokio::time::sleep(self.options.modal_delay).await;

        let opened: bool = self.eval(script::open_guide(domain)).await?;
        if !opened {
            return Err(SurfaceError::Interaction(format!(
                "{} button for {domain} not found",
                script::GUIDE_BUTTON_LABEL
            )));
        }
        debug!(session = %self.id, %domain, "guide opened");
        tokio::time::sleep(self.options.modal_delay).await;
        Ok(())
    }

    async fn read_options(&mut self, slot: usize) -> SurfaceResult<Vec<UiOption>> {
        self.eval(script::read_options(slot)).await
    }

    async fn select_option(&mut self, slot: usize, value: &str) -> SurfaceResult<bool> {
        let selected: bool = self.eval(script::select_option(slot, value)).await?;
        tokio::time::sleep(self.options.action_pause).await;
        Ok(selected)
    }

    async fn trigger(&mut self, label: &str) -> SurfaceResult<bool> {
        let pressed: bool = self.eval(script::trigger(label)).await?;
        tokio::time::sleep(self.options.action_pause).await;
        Ok(pressed)
    }

    async fn close_guide(&mut self) -> SurfaceResult<()> {
        let closed: bool = self.eval(script::close_guide(CANCEL_LABELS)).await?;
        if !closed {
            debug!(session = %self.id, "no modal to close");
        }
        tokio::time::sleep(self.options.modal_delay).await;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        let PortalSurface {
            id,
            mut browser,
            handler,
            page,
            ..
        } = *self;
        if let Err(e) = page.close().await {
            debug!(session = %id, "page close failed: {}", e);
        }
        shutdown(&mut browser, handler).await;
        info!(session = %id, "portal session closed");
    }
}

async fn evaluate<T: DeserializeOwned>(page: &Page, script: String) -> SurfaceResult<T> {
    page.evaluate(script)
        .await
        .map_err(classify)?
        .into_value()
        .map_err(|e| SurfaceError::Interaction(format!("unexpected script result: {e}")))
}

/// Poll a boolean expression once a second until it holds or `timeout` passes.
async fn poll_true(page: &Page, expression: &str, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(true) = evaluate::<bool>(page, expression.to_string()).await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn shutdown(browser: &mut Browser, handler: JoinHandle<()>) {
    if let Err(e) = browser.close().await {
        warn!("browser close failed: {}", e);
    }
    let _ = browser.wait().await;
    handler.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_texts_are_fatal() {
        assert!(classify("Protocol error (Runtime.evaluate): Target closed.").is_fatal());
        assert!(classify("Session closed. Most likely the page has been closed.").is_fatal());
        assert!(!classify("Cannot read properties of undefined").is_fatal());
    }

    #[test]
    fn test_options_from_config() {
        let config = RunnerConfig {
            username: "agent".into(),
            password: "secret".into(),
            headless: false,
            db: None,
            chrome_path: None,
            login_url: "https://portal.example/login".into(),
            log_level: "info".into(),
            legacy_locations: None,
            legacy_lines: None,
        };
        let options = PortalOptions::from(&config);
        assert!(!options.headless);
        assert_eq!(options.login_url, "https://portal.example/login");
        assert_eq!(options.modal_delay, Duration::from_secs(2));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium and portal credentials in the environment
    async fn test_open_location_guide() {
        let config = RunnerConfig::from_env().expect("GUIDEWALK_USERNAME and GUIDEWALK_PASSWORD must be set");
        let provider = PortalSessionProvider::new(PortalOptions::from(&config));
        let mut surface = provider.open().await.expect("session failed");
        surface.open_guide(Domain::Location).await.expect("guide failed");
        let regions = surface.read_options(0).await.expect("read failed");
        assert!(regions.iter().any(|o| o.label.contains("東日本")));
        provider.close(surface).await;
    }
}
