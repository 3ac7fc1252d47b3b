//! Progress event types and broadcast channel for live run telemetry.
//!
//! Traversals and the controller emit `ProgressEvent`s on a
//! `tokio::sync::broadcast` channel. When no subscriber exists, events are
//! silently dropped.

use crate::types::Level;
use serde::{Deserialize, Serialize};

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number within the emitter.
    pub seq: u64,
    pub event: ProgressEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// A node was expanded.
    NodeVisited {
        level: Level,
        path: Vec<String>,
        children: u32,
    },
    /// A node was already in the store and not visited.
    NodeSkipped { level: Level, path: Vec<String> },
    /// A node exhausted its retries.
    NodeFailed {
        level: Level,
        path: Vec<String>,
        reason: String,
    },
    /// Leaves of one visit were written.
    LeavesStored {
        path: Vec<String>,
        inserted: u64,
        already_present: u64,
    },
    /// Periodic counters.
    Snapshot {
        visited: u64,
        skipped: u64,
        errors: u64,
        frontier: u64,
        leaves_inserted: u64,
        elapsed_ms: u64,
    },
    /// The session was torn down and re-opened.
    SessionRecovered { attempt: u32, reason: String },
    RunFinished {
        completed: bool,
        stop_reason: String,
        elapsed_ms: u64,
    },
}

pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit an event, ignoring send errors (no receivers listening).
pub fn emit(tx: &Option<ProgressSender>, run_id: &str, seq: &mut u64, event: ProgressEventKind) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(ProgressEvent {
            run_id: run_id.to_string(),
            seq: *seq,
            event,
        });
    }
}
