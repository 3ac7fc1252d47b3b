//! Run controller: budget, session recovery and the final report.

use crate::budget::RunBudget;
use crate::error::TraversalError;
use crate::progress::{emit, ProgressEventKind, ProgressSender};
use crate::session::DEFAULT_RESTART_PAUSE;
use crate::traversal::{Expander, Traversal, TraversalStats, DEFAULT_FAILURE_STREAK};
use crate::types::Level;
use chrono::{DateTime, Local};
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Recovery limits for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Session recoveries allowed before the run aborts.
    pub max_recoveries: u32,
    /// Pause before each session restart, handed to the expander.
    pub restart_pause: Duration,
    /// Consecutive node failures that count as a broken session.
    pub failure_streak: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_recoveries: 5,
            restart_pause: DEFAULT_RESTART_PAUSE,
            failure_streak: DEFAULT_FAILURE_STREAK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Nothing left to visit.
    Exhausted,
    BudgetSpent,
    RecoveryExhausted,
    StoreFailure,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "exhausted"),
            Self::BudgetSpent => write!(f, "time budget spent"),
            Self::RecoveryExhausted => write!(f, "session recovery exhausted"),
            Self::StoreFailure => write!(f, "store failure"),
        }
    }
}

/// Final statistics of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub label: String,
    pub completed: bool,
    pub stop_reason: StopReason,
    pub stats: TraversalStats,
    pub recoveries: u32,
    pub remaining: u64,
    pub elapsed: Duration,
    pub started_at: DateTime<Local>,
}

impl RunReport {
    /// Combine the reports of concurrent partitions.
    ///
    /// The merged run completed only if every partition did; the stop reason
    /// is the worst one seen.
    pub fn merge(label: impl Into<String>, reports: Vec<RunReport>) -> RunReport {
        let mut merged = RunReport {
            label: label.into(),
            completed: true,
            stop_reason: StopReason::Exhausted,
            stats: TraversalStats::default(),
            recoveries: 0,
            remaining: 0,
            elapsed: Duration::ZERO,
            started_at: Local::now(),
        };
        for report in reports {
            merged.completed &= report.completed;
            merged.stop_reason = worse(merged.stop_reason, report.stop_reason);
            merged.stats.merge(&report.stats);
            merged.recoveries += report.recoveries;
            merged.remaining += report.remaining;
            merged.elapsed = merged.elapsed.max(report.elapsed);
            merged.started_at = merged.started_at.min(report.started_at);
        }
        merged
    }
}

fn worse(a: StopReason, b: StopReason) -> StopReason {
    let rank = |r: StopReason| match r {
        StopReason::Exhausted => 0,
        StopReason::BudgetSpent => 1,
        StopReason::RecoveryExhausted => 2,
        StopReason::StoreFailure => 3,
    };
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{rule}")?;
        writeln!(f, "  {} finished", self.label)?;
        writeln!(f, "{rule}")?;
        writeln!(f, "  started:     {}", self.started_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "  elapsed:     {:.1} min", self.elapsed.as_secs_f64() / 60.0)?;
        writeln!(f, "  completed:   {}", if self.completed { "yes" } else { "no" })?;
        writeln!(f, "  stop reason: {}", self.stop_reason)?;
        writeln!(f, "  visited:     {}", self.stats.visited_total())?;
        for (level, n) in &self.stats.discovered {
            writeln!(f, "    {:<13}{n}", format!("{}:", level_name(*level)))?;
        }
        writeln!(f, "  skipped:     {}", self.stats.skipped)?;
        writeln!(f, "  errors:      {}", self.stats.errors)?;
        writeln!(
            f,
            "  leaves:      {} new, {} already known",
            self.stats.leaves_inserted, self.stats.leaves_present
        )?;
        writeln!(f, "  recoveries:  {}", self.recoveries)?;
        writeln!(f, "  remaining:   {}", self.remaining)?;
        write!(f, "{rule}")
    }
}

fn level_name(level: Level) -> String {
    format!("{} ({})", level, level.portal_label())
}

/// Drives traversals within one budget.
pub struct RunController {
    config: ControllerConfig,
    budget: RunBudget,
    progress: Option<ProgressSender>,
    seq: u64,
}

impl RunController {
    pub fn new(config: ControllerConfig, budget: RunBudget) -> Self {
        Self {
            config,
            budget,
            progress: None,
            seq: 0,
        }
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn budget(&self) -> &RunBudget {
        &self.budget
    }

    pub fn is_timeout(&self) -> bool {
        self.budget.is_timeout()
    }

    /// Run `traversal` to completion, budget exhaustion or abort.
    ///
    /// Always returns a report; the expander's session is released at the end.
    pub async fn run(&mut self, label: &str, traversal: &mut Traversal, expander: &mut dyn Expander) -> RunReport {
        let started_at = Local::now();
        let mut recoveries = 0u32;
        traversal.set_failure_streak(self.config.failure_streak);
        expander.set_restart_pause(self.config.restart_pause);
        info!(
            run = label,
            strategy = %traversal.strategy(),
            budget_secs = self.budget.limit().as_secs(),
            "run started"
        );

        let stop_reason = loop {
            let reason = match traversal.run(expander, &self.budget).await {
                Ok(true) => break StopReason::Exhausted,
                Ok(false) => break StopReason::BudgetSpent,
                Err(TraversalError::Store(e)) => {
                    error!("store failure: {}", e);
                    break StopReason::StoreFailure;
                }
                Err(e) => e.to_string(),
            };

            // Session-level failure: tear down and resume from the frontier.
            if let Some(stop) = self.recover(label, expander, &mut recoveries, &reason).await {
                break stop;
            }
        };

        expander.shutdown().await;

        let report = RunReport {
            label: label.to_string(),
            completed: stop_reason == StopReason::Exhausted,
            stop_reason,
            stats: traversal.stats().clone(),
            recoveries,
            remaining: traversal.frontier_len() as u64,
            elapsed: self.budget.elapsed(),
            started_at,
        };
        emit(
            &self.progress,
            label,
            &mut self.seq,
            ProgressEventKind::RunFinished {
                completed: report.completed,
                stop_reason: report.stop_reason.to_string(),
                elapsed_ms: report.elapsed.as_millis() as u64,
            },
        );
        info!(run = label, completed = report.completed, stop = %report.stop_reason, "run finished");
        report
    }

    /// Restart the expander's session, retrying until it succeeds or the
    /// recovery allowance or the budget runs out.
    async fn recover(
        &mut self,
        label: &str,
        expander: &mut dyn Expander,
        recoveries: &mut u32,
        reason: &str,
    ) -> Option<StopReason> {
        loop {
            if self.budget.is_timeout() {
                return Some(StopReason::BudgetSpent);
            }
            if *recoveries >= self.config.max_recoveries {
                error!(recoveries = *recoveries, "giving up after repeated session failures");
                return Some(StopReason::RecoveryExhausted);
            }
            *recoveries += 1;
            warn!(
                attempt = *recoveries,
                max = self.config.max_recoveries,
                "recovering session: {}",
                reason
            );
            match expander.recover().await {
                Ok(()) => {
                    emit(
                        &self.progress,
                        label,
                        &mut self.seq,
                        ProgressEventKind::SessionRecovered {
                            attempt: *recoveries,
                            reason: reason.to_string(),
                        },
                    );
                    return None;
                }
                Err(e) => warn!(attempt = *recoveries, "recovery failed: {}", e),
            }
        }
    }
}

/// Run one traversal per seed partition concurrently, each with its own
/// expander (and so its own session), sharing only the store.
pub async fn run_concurrent(
    label: &str,
    config: ControllerConfig,
    budget: RunBudget,
    traversals: Vec<Traversal>,
    expanders: Vec<Box<dyn Expander>>,
) -> RunReport {
    let runs = traversals
        .into_iter()
        .zip(expanders)
        .enumerate()
        .map(|(i, (mut traversal, mut expander))| async move {
            let mut controller = RunController::new(config, budget);
            let part = format!("{label}#{i}");
            controller.run(&part, &mut traversal, expander.as_mut()).await
        });
    let reports = join_all(runs).await;
    RunReport::merge(label, reports)
}
