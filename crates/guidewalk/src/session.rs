//! Supervised session: one authenticated wizard surface with restart.
//!
//! Wraps a [`SessionProvider`] so the rest of the engine only ever asks for
//! "the current surface" and, after a fatal failure, for a fresh one.

use crate::error::{SessionError, SessionResult};
use crate::surface::{SessionProvider, WizardSurface};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Pause before re-opening a broken session.
pub const DEFAULT_RESTART_PAUSE: Duration = Duration::from_secs(3);

pub struct SupervisedSession {
    provider: Arc<dyn SessionProvider>,
    surface: Option<Box<dyn WizardSurface>>,
    restart_pause: Duration,
    restarts: u32,
    opened_at: Option<Instant>,
}

impl SupervisedSession {
    pub fn new(provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            provider,
            surface: None,
            restart_pause: DEFAULT_RESTART_PAUSE,
            restarts: 0,
            opened_at: None,
        }
    }

    pub fn with_restart_pause(mut self, pause: Duration) -> Self {
        self.set_restart_pause(pause);
        self
    }

    pub fn set_restart_pause(&mut self, pause: Duration) {
        self.restart_pause = pause;
    }

    pub fn restart_pause(&self) -> Duration {
        self.restart_pause
    }

    /// The live surface, opening a session first if none is held.
    pub async fn acquire(&mut self) -> SessionResult<&mut dyn WizardSurface> {
        if self.surface.is_none() {
            let surface = self.provider.open().await?;
            self.opened_at = Some(Instant::now());
            info!("session opened");
            self.surface = Some(surface);
        }
        match self.surface.as_deref_mut() {
            Some(surface) => Ok(surface),
            None => Err(SessionError::Launch("session vanished after open".into())),
        }
    }

    /// Close the held session, if any.
    pub async fn release(&mut self) {
        if let Some(surface) = self.surface.take() {
            self.provider.close(surface).await;
            if let Some(opened) = self.opened_at.take() {
                info!(age_secs = opened.elapsed().as_secs(), "session closed");
            }
        }
    }

    /// Tear down, wait the fixed pause, and authenticate again.
    pub async fn restart(&mut self) -> SessionResult<()> {
        self.release().await;
        self.restarts += 1;
        warn!(
            restart = self.restarts,
            pause_ms = self.restart_pause.as_millis() as u64,
            "restarting session"
        );
        tokio::time::sleep(self.restart_pause).await;
        self.acquire().await.map(|_| ())
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn is_open(&self) -> bool {
        self.surface.is_some()
    }

    /// How long the current session has been alive.
    pub fn age(&self) -> Option<Duration> {
        self.opened_at.map(|t| t.elapsed())
    }
}
