//! Collaborator seams: the raw wizard surface and the session provider.
//!
//! Everything above these traits is navigation policy; everything below is
//! a concrete UI (a headless browser or the in-memory simulator).

use crate::error::{SessionResult, SurfaceResult};
use crate::types::{Domain, UiOption};
use async_trait::async_trait;

/// A single authenticated page on which the selection wizard can be opened.
///
/// Control slots are numbered left to right within the visible screen.
#[async_trait]
pub trait WizardSurface: Send {
    /// Open the wizard modal for `domain` at its first screen.
    async fn open_guide(&mut self, domain: Domain) -> SurfaceResult<()>;

    /// Current options of control `slot` on the visible screen.
    async fn read_options(&mut self, slot: usize) -> SurfaceResult<Vec<UiOption>>;

    /// Select the option with `value` in control `slot`.
    ///
    /// Returns `false` when the control does not exist or refused the value.
    async fn select_option(&mut self, slot: usize, value: &str) -> SurfaceResult<bool>;

    /// Press the button labelled `label` (次へ, 決定, キャンセル ...).
    ///
    /// Returns `false` when no such button is visible.
    async fn trigger(&mut self, label: &str) -> SurfaceResult<bool>;

    /// Dismiss the wizard, discarding any partial selection.
    async fn close_guide(&mut self) -> SurfaceResult<()>;

    /// Tear down the page and whatever hosts it.
    async fn close(self: Box<Self>);
}

/// Opens and tears down authenticated sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Authenticate and navigate to the page hosting the wizard.
    async fn open(&self) -> SessionResult<Box<dyn WizardSurface>>;

    /// Release a session. Errors are the provider's to log.
    async fn close(&self, surface: Box<dyn WizardSurface>);
}
