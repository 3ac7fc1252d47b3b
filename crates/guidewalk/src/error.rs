//! Error types shared across the engine.

use crate::types::{Level, TraversalNode};

/// Errors raised by the raw UI surface.
#[derive(thiserror::Error, Debug, Clone)]
pub enum SurfaceError {
    /// The interactive session is gone (browser crashed, target closed).
    #[error("session disconnected: {0}")]
    Disconnected(String),

    /// A single interaction failed but the session is still usable.
    #[error("interaction failed: {0}")]
    Interaction(String),
}

impl SurfaceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SurfaceError::Disconnected(_))
    }
}

/// Errors raised while opening or closing an authenticated session.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("entry point unreachable: {0}")]
    Navigation(String),

    #[error("session launch failed: {0}")]
    Launch(String),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// A soft, step-local failure inside one wizard screen.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    #[error("no option matching \"{query}\" for {level} (available: {available:?})")]
    OptionNotFound {
        level: Level,
        query: String,
        available: Vec<String>,
    },

    #[error("screen {screen} did not show markers {expected:?} (saw {seen:?})")]
    ScreenMismatch {
        screen: u8,
        expected: Vec<String>,
        seen: Vec<String>,
    },

    #[error("screen {screen} control {slot} did not settle in time")]
    WaitTimeout { screen: u8, slot: usize },

    #[error("action \"{label}\" is not available on screen {screen}")]
    ActionMissing { screen: u8, label: String },

    #[error("screen {screen} refused selection of \"{label}\"")]
    SelectionRejected { screen: u8, label: String },

    #[error("interaction on screen {screen} failed: {reason}")]
    Interaction { screen: u8, reason: String },
}

/// Outcome of a sequencer run that did not reach its goal.
#[derive(thiserror::Error, Debug, Clone)]
pub enum SequencerError {
    /// Every attempt failed on a soft error; the last one is kept.
    #[error("wizard failed after {attempts} attempts: {last}")]
    Failed { attempts: u32, last: StepFailure },

    /// The surface became unusable; only a session restart helps.
    #[error("session broken: {0}")]
    SessionBroken(String),

    /// The run budget expired inside an inline enumeration.
    #[error("interrupted by the run budget")]
    Interrupted,
}

impl SequencerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SequencerError::SessionBroken(_))
    }
}

impl From<SurfaceError> for SequencerError {
    fn from(e: SurfaceError) -> Self {
        SequencerError::SessionBroken(e.to_string())
    }
}

/// Errors from the taxonomy store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },

    #[error("store lock poisoned")]
    Poisoned,
}

/// Errors that stop a traversal before its frontier is drained.
#[derive(thiserror::Error, Debug)]
pub enum TraversalError {
    /// The session broke while visiting `node`; the node was re-queued.
    #[error("session broken while visiting {node}: {reason}")]
    SessionBroken { node: TraversalNode, reason: String },

    /// Too many nodes failed in a row; the session is presumed broken.
    #[error("{count} consecutive node failures, last at {node}")]
    FailureStreak { node: TraversalNode, count: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type SurfaceResult<T> = Result<T, SurfaceError>;
pub type SessionResult<T> = Result<T, SessionError>;
