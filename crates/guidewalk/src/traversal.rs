//! Traversal engine: BFS and DFS over `expand(node) -> children`.
//!
//! One engine serves both strategies; only the frontier discipline differs.
//! Resumability comes from the store: a leaf parent that already has leaves
//! is skipped without touching the wizard.

use crate::budget::RunBudget;
use crate::descriptor::DomainDescriptor;
use crate::error::{SequencerError, SessionError, StoreResult, TraversalError};
use crate::progress::{emit, ProgressEventKind, ProgressSender};
use crate::sequencer::Sequencer;
use crate::session::SupervisedSession;
use crate::store::TaxonomyStore;
use crate::types::{LeafRecord, Level, TraversalNode};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Consecutive node failures taken as a broken session.
pub const DEFAULT_FAILURE_STREAK: u32 = 5;

/// Nodes between two progress snapshots.
const SNAPSHOT_EVERY: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Strategy {
    BreadthFirst,
    DepthFirst,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BreadthFirst => write!(f, "bfs"),
            Self::DepthFirst => write!(f, "dfs"),
        }
    }
}

/// What one visit found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    Children(Vec<TraversalNode>),
    Leaves(Vec<LeafRecord>),
}

/// The "descend one level" operation.
#[async_trait]
pub trait Expander: Send {
    async fn expand(&mut self, node: &TraversalNode, budget: &RunBudget) -> Result<Expansion, SequencerError>;

    /// Replace a broken session with a fresh one.
    async fn recover(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Release any held session.
    async fn shutdown(&mut self) {}

    /// Pause taken before each `recover`.
    fn set_restart_pause(&mut self, _pause: Duration) {}
}

/// Expands nodes by driving the wizard through a supervised session.
pub struct WizardExpander {
    session: SupervisedSession,
    sequencer: Sequencer,
}

impl WizardExpander {
    pub fn new(session: SupervisedSession, sequencer: Sequencer) -> Self {
        Self { session, sequencer }
    }
}

#[async_trait]
impl Expander for WizardExpander {
    async fn expand(&mut self, node: &TraversalNode, budget: &RunBudget) -> Result<Expansion, SequencerError> {
        let surface = self
            .session
            .acquire()
            .await
            .map_err(|e| SequencerError::SessionBroken(e.to_string()))?;
        let harvest = self.sequencer.discover(surface, &node.path, Some(budget)).await?;

        let descriptor = self.sequencer.descriptor();
        if !descriptor.is_leaf_parent(&node.path) {
            return Ok(Expansion::Children(
                harvest
                    .labels
                    .iter()
                    .map(|label| node.child(harvest.level, label))
                    .collect(),
            ));
        }

        let mut leaves: Vec<LeafRecord> = harvest
            .labels
            .iter()
            .enumerate()
            .filter_map(|(i, label)| descriptor.leaf_record(&node.path, Some(label), i as u32))
            .collect();
        if leaves.is_empty() {
            // A ward with no towns is still recorded so it counts as explored.
            leaves.extend(descriptor.leaf_record(&node.path, None, 0));
        }
        Ok(Expansion::Leaves(leaves))
    }

    async fn recover(&mut self) -> Result<(), SessionError> {
        self.session.restart().await
    }

    async fn shutdown(&mut self) {
        self.session.release().await;
    }

    fn set_restart_pause(&mut self, pause: Duration) {
        self.session.set_restart_pause(pause);
    }
}

/// Counters accumulated by a traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraversalStats {
    /// Nodes expanded, by level.
    pub visited: BTreeMap<Level, u64>,
    /// Children and leaves found, by level.
    pub discovered: BTreeMap<Level, u64>,
    pub skipped: u64,
    pub errors: u64,
    pub leaves_inserted: u64,
    pub leaves_present: u64,
    /// Nodes that exhausted their retries.
    pub failed: Vec<String>,
}

impl TraversalStats {
    pub fn visited_total(&self) -> u64 {
        self.visited.values().sum()
    }

    pub fn merge(&mut self, other: &TraversalStats) {
        for (level, n) in &other.visited {
            *self.visited.entry(*level).or_default() += n;
        }
        for (level, n) in &other.discovered {
            *self.discovered.entry(*level).or_default() += n;
        }
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.leaves_inserted += other.leaves_inserted;
        self.leaves_present += other.leaves_present;
        self.failed.extend(other.failed.iter().cloned());
    }
}

pub struct Traversal {
    strategy: Strategy,
    descriptor: DomainDescriptor,
    store: Arc<TaxonomyStore>,
    frontier: VecDeque<TraversalNode>,
    stats: TraversalStats,
    failure_streak: u32,
    /// Nodes that failed back to back since the last success.
    streak: Vec<TraversalNode>,
    expansions: u64,
    progress: Option<ProgressSender>,
    run_id: String,
    seq: u64,
}

impl Traversal {
    /// A traversal seeded with the root node.
    pub fn new(strategy: Strategy, descriptor: DomainDescriptor, store: Arc<TaxonomyStore>) -> Self {
        let run_id = format!("{}-{}", descriptor.domain, strategy);
        Self {
            strategy,
            descriptor,
            store,
            frontier: VecDeque::from([TraversalNode::root()]),
            stats: TraversalStats::default(),
            failure_streak: DEFAULT_FAILURE_STREAK,
            streak: Vec::new(),
            expansions: 0,
            progress: None,
            run_id,
            seq: 0,
        }
    }

    /// Replace the frontier with `seeds`, visited in the given order.
    pub fn with_seeds(mut self, seeds: Vec<TraversalNode>) -> Self {
        self.frontier.clear();
        self.push_all(seeds);
        self
    }

    pub fn with_failure_streak(mut self, limit: u32) -> Self {
        self.set_failure_streak(limit);
        self
    }

    pub fn set_failure_streak(&mut self, limit: u32) {
        self.failure_streak = limit.max(1);
    }

    pub fn with_progress(mut self, tx: ProgressSender, run_id: impl Into<String>) -> Self {
        self.progress = Some(tx);
        self.run_id = run_id.into();
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn descriptor(&self) -> &DomainDescriptor {
        &self.descriptor
    }

    pub fn stats(&self) -> &TraversalStats {
        &self.stats
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    /// Walk until the frontier drains (`Ok(true)`) or the budget is spent
    /// (`Ok(false)`). A broken session or a failure streak re-queues the node
    /// in flight, together with the streak's earlier nodes, and returns an
    /// error; calling `run` again resumes from the same frontier.
    pub async fn run(&mut self, expander: &mut dyn Expander, budget: &RunBudget) -> Result<bool, TraversalError> {
        loop {
            if budget.is_timeout() {
                info!(frontier = self.frontier.len(), "run budget spent");
                return Ok(false);
            }
            let Some(node) = self.pop() else {
                return Ok(true);
            };

            if self.is_known(&node)? {
                self.skip(&node);
                continue;
            }

            info!(level = %node.level, node = %node, "visiting");
            self.expansions += 1;
            match expander.expand(&node, budget).await {
                Ok(expansion) => {
                    self.streak.clear();
                    self.absorb(&node, expansion)?;
                }
                Err(SequencerError::Interrupted) => {
                    self.requeue(node);
                    info!(frontier = self.frontier.len(), "run budget spent during enumeration");
                    return Ok(false);
                }
                Err(SequencerError::SessionBroken(reason)) => {
                    warn!(node = %node, "session broken: {}", reason);
                    self.requeue(node.clone());
                    self.requeue_streak();
                    return Err(TraversalError::SessionBroken { node, reason });
                }
                Err(failure @ SequencerError::Failed { .. }) => {
                    self.fail(&node, &failure);
                    self.streak.push(node.clone());
                    if self.streak.len() as u32 >= self.failure_streak {
                        let count = self.streak.len() as u32;
                        warn!(node = %node, count, "failure streak, re-queueing it");
                        self.requeue_streak();
                        return Err(TraversalError::FailureStreak { node, count });
                    }
                }
            }

            if self.expansions % SNAPSHOT_EVERY == 0 {
                self.snapshot(budget);
            }
        }
    }

    fn pop(&mut self) -> Option<TraversalNode> {
        match self.strategy {
            Strategy::BreadthFirst => self.frontier.pop_front(),
            Strategy::DepthFirst => self.frontier.pop_back(),
        }
    }

    /// Put a node back so it is the next one out.
    fn requeue(&mut self, node: TraversalNode) {
        match self.strategy {
            Strategy::BreadthFirst => self.frontier.push_front(node),
            Strategy::DepthFirst => self.frontier.push_back(node),
        }
    }

    /// Put the streak back in front, oldest first. Its nodes are retried and
    /// no longer count as failed.
    fn requeue_streak(&mut self) {
        let streak = std::mem::take(&mut self.streak);
        let keep = self.stats.failed.len().saturating_sub(streak.len());
        self.stats.failed.truncate(keep);
        for node in streak.into_iter().rev() {
            self.requeue(node);
        }
    }

    fn push_all(&mut self, nodes: Vec<TraversalNode>) {
        match self.strategy {
            Strategy::BreadthFirst => self.frontier.extend(nodes),
            // Reversed so pops follow the original left-to-right order.
            Strategy::DepthFirst => self.frontier.extend(nodes.into_iter().rev()),
        }
    }

    fn is_known(&self, node: &TraversalNode) -> StoreResult<bool> {
        if !self.descriptor.is_leaf_parent(&node.path) {
            return Ok(false);
        }
        match self.descriptor.partial_key(&node.path) {
            Some(key) => self.store.is_explored(&key),
            None => Ok(false),
        }
    }

    fn skip(&mut self, node: &TraversalNode) {
        debug!(node = %node, "already explored");
        self.stats.skipped += 1;
        emit(
            &self.progress,
            &self.run_id,
            &mut self.seq,
            ProgressEventKind::NodeSkipped {
                level: node.level,
                path: node.path.clone(),
            },
        );
    }

    fn absorb(&mut self, node: &TraversalNode, expansion: Expansion) -> Result<(), TraversalError> {
        *self.stats.visited.entry(node.level).or_default() += 1;
        match expansion {
            Expansion::Children(children) => {
                emit(
                    &self.progress,
                    &self.run_id,
                    &mut self.seq,
                    ProgressEventKind::NodeVisited {
                        level: node.level,
                        path: node.path.clone(),
                        children: children.len() as u32,
                    },
                );
                let mut fresh = Vec::with_capacity(children.len());
                for child in children {
                    *self.stats.discovered.entry(child.level).or_default() += 1;
                    // BFS filters known leaf parents before they enter the
                    // queue; DFS checks them when popped.
                    if self.strategy == Strategy::BreadthFirst && self.is_known(&child)? {
                        self.skip(&child);
                    } else {
                        fresh.push(child);
                    }
                }
                self.push_all(fresh);
            }
            Expansion::Leaves(leaves) => {
                let level = self.descriptor.leaf_level();
                let found = leaves
                    .iter()
                    .filter(|l| !matches!(l, LeafRecord::Location(loc) if loc.town.is_none()))
                    .count();
                *self.stats.discovered.entry(level).or_default() += found as u64;

                let outcome = self.store.insert_batch(&leaves)?;
                self.stats.leaves_inserted += outcome.inserted;
                self.stats.leaves_present += outcome.already_present;
                info!(
                    node = %node,
                    found,
                    inserted = outcome.inserted,
                    "stored {}",
                    level
                );
                emit(
                    &self.progress,
                    &self.run_id,
                    &mut self.seq,
                    ProgressEventKind::LeavesStored {
                        path: node.path.clone(),
                        inserted: outcome.inserted,
                        already_present: outcome.already_present,
                    },
                );
            }
        }
        Ok(())
    }

    fn fail(&mut self, node: &TraversalNode, failure: &SequencerError) {
        warn!(node = %node, "giving up on node: {}", failure);
        self.stats.errors += 1;
        self.stats.failed.push(node.to_string());
        emit(
            &self.progress,
            &self.run_id,
            &mut self.seq,
            ProgressEventKind::NodeFailed {
                level: node.level,
                path: node.path.clone(),
                reason: failure.to_string(),
            },
        );
    }

    fn snapshot(&mut self, budget: &RunBudget) {
        let elapsed = budget.elapsed();
        info!(
            visited = self.stats.visited_total(),
            skipped = self.stats.skipped,
            errors = self.stats.errors,
            frontier = self.frontier.len(),
            leaves = self.stats.leaves_inserted,
            elapsed_secs = elapsed.as_secs(),
            "progress"
        );
        emit(
            &self.progress,
            &self.run_id,
            &mut self.seq,
            ProgressEventKind::Snapshot {
                visited: self.stats.visited_total(),
                skipped: self.stats.skipped,
                errors: self.stats.errors,
                frontier: self.frontier.len() as u64,
                leaves_inserted: self.stats.leaves_inserted,
                elapsed_ms: elapsed.as_millis() as u64,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepFailure;

    /// Expands a fixed map of paths; records the order of visits.
    struct MapExpander {
        children: BTreeMap<Vec<String>, Vec<&'static str>>,
        visits: Vec<Vec<String>>,
        fail: Vec<Vec<String>>,
    }

    #[async_trait]
    impl Expander for MapExpander {
        async fn expand(&mut self, node: &TraversalNode, _budget: &RunBudget) -> Result<Expansion, SequencerError> {
            self.visits.push(node.path.clone());
            if self.fail.contains(&node.path) {
                return Err(SequencerError::Failed {
                    attempts: 3,
                    last: StepFailure::WaitTimeout { screen: 1, slot: 1 },
                });
            }
            let labels = self.children.get(&node.path).cloned().unwrap_or_default();
            Ok(Expansion::Children(
                labels.into_iter().map(|l| node.child(Level::Region, l)).collect(),
            ))
        }

        /// A fresh session heals every failing node.
        async fn recover(&mut self) -> Result<(), SessionError> {
            self.fail.clear();
            Ok(())
        }
    }

    fn expander(fail: &[&[&str]]) -> MapExpander {
        let mut children = BTreeMap::new();
        children.insert(vec![], vec!["a", "b"]);
        children.insert(vec!["a".to_string()], vec!["a1", "a2"]);
        children.insert(vec!["b".to_string()], vec!["b1"]);
        MapExpander {
            children,
            visits: Vec::new(),
            fail: fail
                .iter()
                .map(|p| p.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn traversal(strategy: Strategy) -> Traversal {
        let store = Arc::new(TaxonomyStore::open_in_memory().unwrap());
        Traversal::new(strategy, DomainDescriptor::location(), store)
    }

    fn visit_order(e: &MapExpander) -> Vec<String> {
        e.visits.iter().map(|p| p.join("/")).collect()
    }

    #[tokio::test]
    async fn test_bfs_order() {
        let mut e = expander(&[]);
        let mut t = traversal(Strategy::BreadthFirst);
        let budget = RunBudget::start(Duration::from_secs(60));
        assert!(t.run(&mut e, &budget).await.unwrap());
        assert_eq!(visit_order(&e), vec!["", "a", "b", "a/a1", "a/a2", "b/b1"]);
    }

    #[tokio::test]
    async fn test_dfs_order() {
        let mut e = expander(&[]);
        let mut t = traversal(Strategy::DepthFirst);
        let budget = RunBudget::start(Duration::from_secs(60));
        assert!(t.run(&mut e, &budget).await.unwrap());
        assert_eq!(visit_order(&e), vec!["", "a", "a/a1", "a/a2", "b", "b/b1"]);
    }

    #[tokio::test]
    async fn test_failed_node_does_not_stop_siblings() {
        let mut e = expander(&[&["a"]]);
        let mut t = traversal(Strategy::BreadthFirst);
        let budget = RunBudget::start(Duration::from_secs(60));
        assert!(t.run(&mut e, &budget).await.unwrap());
        assert_eq!(visit_order(&e), vec!["", "a", "b", "b/b1"]);
        assert_eq!(t.stats().errors, 1);
        assert_eq!(t.stats().failed, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_streak_escalates() {
        let mut e = expander(&[&["a"], &["b"]]);
        let mut t = traversal(Strategy::BreadthFirst).with_failure_streak(2);
        let budget = RunBudget::start(Duration::from_secs(60));
        let err = t.run(&mut e, &budget).await.unwrap_err();
        assert!(matches!(err, TraversalError::FailureStreak { ref node, count: 2 } if node.label() == Some("b")));
        assert_eq!(t.frontier_len(), 2);
        assert_eq!(t.stats().errors, 2);
        assert!(t.stats().failed.is_empty());
    }

    #[tokio::test]
    async fn test_streak_nodes_resume_after_recovery() {
        for strategy in [Strategy::BreadthFirst, Strategy::DepthFirst] {
            let mut e = expander(&[&["a"], &["b"]]);
            let mut t = traversal(strategy).with_failure_streak(2);
            let budget = RunBudget::start(Duration::from_secs(60));
            assert!(t.run(&mut e, &budget).await.is_err());

            e.recover().await.unwrap();
            assert!(t.run(&mut e, &budget).await.unwrap());
            let order = visit_order(&e);
            let expected = match strategy {
                Strategy::BreadthFirst => vec!["", "a", "b", "a", "b", "a/a1", "a/a2", "b/b1"],
                Strategy::DepthFirst => vec!["", "a", "b", "a", "a/a1", "a/a2", "b", "b/b1"],
            };
            assert_eq!(order, expected, "{strategy}");
        }
    }

    #[tokio::test]
    async fn test_session_break_requeues_node() {
        struct Breaking {
            broke: bool,
            visits: Vec<Vec<String>>,
        }

        #[async_trait]
        impl Expander for Breaking {
            async fn expand(&mut self, node: &TraversalNode, _budget: &RunBudget) -> Result<Expansion, SequencerError> {
                if !node.path.is_empty() && !self.broke {
                    self.broke = true;
                    return Err(SequencerError::SessionBroken("Target closed".into()));
                }
                self.visits.push(node.path.clone());
                if node.path.is_empty() {
                    Ok(Expansion::Children(vec![
                        node.child(Level::Region, "x"),
                        node.child(Level::Region, "y"),
                    ]))
                } else {
                    Ok(Expansion::Children(Vec::new()))
                }
            }
        }

        let mut e = Breaking {
            broke: false,
            visits: Vec::new(),
        };
        let mut t = traversal(Strategy::BreadthFirst);
        let budget = RunBudget::start(Duration::from_secs(60));
        let err = t.run(&mut e, &budget).await.unwrap_err();
        assert!(matches!(err, TraversalError::SessionBroken { ref node, .. } if node.label() == Some("x")));
        assert_eq!(t.frontier_len(), 2);

        assert!(t.run(&mut e, &budget).await.unwrap());
        let labels: Vec<String> = e.visits.iter().map(|p| p.join("/")).collect();
        assert_eq!(labels, vec!["", "x", "y"]);
    }
}
