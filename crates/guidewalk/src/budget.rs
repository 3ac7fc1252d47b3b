//! Wall-clock run budget.

use std::time::Duration;
use tokio::time::Instant;

/// Budget of the `explore-locations-bfs` entrypoint.
pub const LOCATION_BFS_BUDGET: Duration = Duration::from_secs(60 * 60);
/// Budget of the other three entrypoints.
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(30 * 60);

/// A monotonic start plus a limit. Consulted at every loop boundary; never
/// preempts work in flight.
#[derive(Debug, Clone, Copy)]
pub struct RunBudget {
    started: Instant,
    limit: Duration,
}

impl RunBudget {
    pub fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}
