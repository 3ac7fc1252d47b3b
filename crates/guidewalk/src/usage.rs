//! Parallel usage: commit several known selections at once.
//!
//! Every target gets its own session and sequencer; nothing is shared but
//! the provider. Results are merged by the identity of the selected path.

use crate::descriptor::DomainDescriptor;
use crate::error::SequencerError;
use crate::sequencer::{Sequencer, SequencerPolicy, UsageTarget};
use crate::session::SupervisedSession;
use crate::surface::SessionProvider;
use crate::verifier::ScreenMarkers;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of one target.
#[derive(Debug, Clone)]
pub struct UsageOutcome {
    pub target: UsageTarget,
    /// Selected labels from region down, or the reason it failed.
    pub result: Result<Vec<String>, String>,
}

#[derive(Debug, Clone, Default)]
pub struct UsageReport {
    pub outcomes: Vec<UsageOutcome>,
    /// Distinct selections in target order.
    pub selected: Vec<Vec<String>>,
}

impl UsageReport {
    pub fn failures(&self) -> impl Iterator<Item = &UsageOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Commit every target concurrently, one isolated session each.
///
/// A target whose session breaks is retried once on a fresh session.
pub async fn run_usage(
    provider: Arc<dyn SessionProvider>,
    markers: &ScreenMarkers,
    policy: SequencerPolicy,
    restart_pause: Duration,
    targets: Vec<UsageTarget>,
) -> UsageReport {
    let runs = targets.into_iter().map(|target| {
        let provider = provider.clone();
        let descriptor = DomainDescriptor::new(target.domain()).with_markers(markers.clone());
        async move {
            let mut session = SupervisedSession::new(provider).with_restart_pause(restart_pause);
            let mut sequencer = Sequencer::new(descriptor, policy);
            let result = commit_one(&mut session, &mut sequencer, &target).await;
            session.release().await;
            match &result {
                Ok(selected) => info!(target = %target, selected = %selected.join(" > "), "selection confirmed"),
                Err(e) => warn!(target = %target, "selection failed: {}", e),
            }
            UsageOutcome { target, result }
        }
    });
    let outcomes = join_all(runs).await;

    let mut seen = HashSet::new();
    let selected = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .filter(|path| seen.insert((*path).clone()))
        .cloned()
        .collect();

    UsageReport { outcomes, selected }
}

async fn commit_one(
    session: &mut SupervisedSession,
    sequencer: &mut Sequencer,
    target: &UsageTarget,
) -> Result<Vec<String>, String> {
    let mut restarted = false;
    loop {
        let surface = session.acquire().await.map_err(|e| e.to_string())?;
        match sequencer.commit(surface, target).await {
            Ok(selected) => return Ok(selected),
            Err(SequencerError::SessionBroken(reason)) if !restarted => {
                warn!(target = %target, "session broken, retrying once: {}", reason);
                restarted = true;
                session.restart().await.map_err(|e| e.to_string())?;
            }
            Err(e) => return Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimFaults, SimTree, SimulatedProvider};
    use crate::types::Domain;

    fn tree() -> SimTree {
        let mut tree = SimTree::new(Domain::Line);
        for station in ["名古屋", "伏見", "栄"] {
            tree.insert_path(&["中部圏", "愛知県", "タ行", "東山線", station]);
        }
        tree.insert_path(&["中部圏", "愛知県", "マ行", "名城線", "大曽根"]);
        tree
    }

    fn line(line: &str, from: &str) -> UsageTarget {
        UsageTarget::Line {
            prefecture: "愛知県".into(),
            line: line.into(),
            kana_row: None,
            from: from.into(),
            to: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_usage_merges_duplicates() {
        let provider = Arc::new(SimulatedProvider::new(tree(), SimFaults::default()));
        let markers = provider.tree().descriptor().markers;
        let report = run_usage(
            provider.clone(),
            &markers,
            SequencerPolicy::default(),
            Duration::from_secs(1),
            vec![line("東山線", "栄"), line("名城線", "大曽根"), line("東山線", "栄")],
        )
        .await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failures().count(), 0);
        assert_eq!(
            report.selected,
            vec![
                vec!["中部圏", "愛知県", "東山線", "栄"],
                vec!["中部圏", "愛知県", "名城線", "大曽根"],
            ]
        );
        let counters = provider.counters();
        assert_eq!(counters.sessions_opened(), 3);
        assert_eq!(counters.sessions_closed(), 3);
        assert_eq!(counters.confirmations().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_session_retried_once() {
        let faults = SimFaults {
            disconnect_after: vec![3],
            ..Default::default()
        };
        let provider = Arc::new(SimulatedProvider::new(tree(), faults));
        let markers = provider.tree().descriptor().markers;
        let report = run_usage(
            provider.clone(),
            &markers,
            SequencerPolicy::default(),
            Duration::from_secs(1),
            vec![line("名城線", "大曽根")],
        )
        .await;
        assert!(report.outcomes[0].result.is_ok());
        assert_eq!(provider.counters().sessions_opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_station_reported() {
        let provider = Arc::new(SimulatedProvider::new(tree(), SimFaults::default()));
        let markers = provider.tree().descriptor().markers;
        let report = run_usage(
            provider,
            &markers,
            SequencerPolicy::default(),
            Duration::from_secs(1),
            vec![line("東山線", "金山")],
        )
        .await;
        assert_eq!(report.failures().count(), 1);
        assert!(report.selected.is_empty());
    }
}
