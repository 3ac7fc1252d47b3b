//! Screen state verification.
//!
//! The portal gives no screen identifiers, so a screen is recognised by the
//! labels its first control offers.

use crate::types::{region_names, selectable_labels, UiOption};
use std::collections::HashSet;

/// True when every marker appears among the current option labels.
///
/// Labels are compared trimmed. Order does not matter.
pub fn verify<S: AsRef<str>, M: AsRef<str>>(current: &[S], markers: &[M]) -> bool {
    let present: HashSet<&str> = current.iter().map(|s| s.as_ref().trim()).collect();
    markers
        .iter()
        .all(|m| present.contains(m.as_ref().trim()))
}

/// Expected markers for each of the three wizard screens.
///
/// An empty marker set means "the first control is non-empty".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenMarkers {
    pub screen1: Vec<String>,
    pub screen2: Vec<String>,
    pub screen3: Vec<String>,
}

impl Default for ScreenMarkers {
    fn default() -> Self {
        Self {
            screen1: region_names(),
            screen2: Vec::new(),
            screen3: Vec::new(),
        }
    }
}

impl ScreenMarkers {
    pub fn for_screen(&self, screen: u8) -> &[String] {
        match screen {
            1 => &self.screen1,
            2 => &self.screen2,
            _ => &self.screen3,
        }
    }

    /// Check a screen's first control against its markers.
    pub fn check(&self, screen: u8, options: &[UiOption]) -> bool {
        let labels = selectable_labels(options);
        let markers = self.for_screen(screen);
        if markers.is_empty() {
            return !labels.is_empty();
        }
        verify(&labels, markers)
    }
}
