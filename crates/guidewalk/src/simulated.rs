//! In-memory wizard over a fixture tree.
//!
//! Behaves like the portal's modal: three screens of two dependent selects,
//! a placeholder at the top of every select, 次へ/決定/キャンセル buttons.
//! Faults can be injected to exercise retries and session recovery.

use crate::descriptor::{DomainDescriptor, ADVANCE_LABEL, CONFIRM_LABEL, CANCEL_LABELS};
use crate::error::{SessionError, SessionResult, SurfaceError, SurfaceResult};
use crate::surface::{SessionProvider, WizardSurface};
use crate::types::{Domain, UiOption, PLACEHOLDER_LABEL};
use crate::verifier::ScreenMarkers;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One option of the fixture and everything below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimNode {
    pub label: String,
    pub children: Vec<SimNode>,
}

impl SimNode {
    fn child(&self, label: &str) -> Option<&SimNode> {
        self.children.iter().find(|c| c.label == label)
    }

    fn count_leaves(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            self.children.iter().map(SimNode::count_leaves).sum()
        }
    }
}

/// Fixture taxonomy behind a simulated wizard.
///
/// Location paths are `region/prefecture/category/ward/detail/town`, line
/// paths are `region/prefecture/kana row/line/station`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTree {
    pub domain: Domain,
    root: SimNode,
}

impl SimTree {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            root: SimNode::default(),
        }
    }

    /// Add a path, reusing existing prefixes. Insertion order is option order.
    pub fn insert_path(&mut self, path: &[&str]) {
        let mut node = &mut self.root;
        for label in path {
            let pos = match node.children.iter().position(|c| c.label == *label) {
                Some(pos) => pos,
                None => {
                    node.children.push(SimNode {
                        label: (*label).to_string(),
                        children: Vec::new(),
                    });
                    node.children.len() - 1
                }
            };
            node = &mut node.children[pos];
        }
    }

    /// Labels directly below `path`, or `None` when the path does not exist.
    pub fn children(&self, path: &[String]) -> Option<Vec<String>> {
        let mut node = &self.root;
        for label in path {
            node = node.child(label)?;
        }
        Some(node.children.iter().map(|c| c.label.clone()).collect())
    }

    pub fn regions(&self) -> Vec<String> {
        self.root.children.iter().map(|c| c.label.clone()).collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.root.children.iter().map(SimNode::count_leaves).sum()
    }

    /// A descriptor whose first-screen markers are this fixture's regions.
    pub fn descriptor(&self) -> DomainDescriptor {
        DomainDescriptor::new(self.domain).with_markers(ScreenMarkers {
            screen1: self.regions(),
            ..ScreenMarkers::default()
        })
    }
}

/// Faults injected into simulated sessions.
#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    /// Prefixes whose dependent controls never populate.
    pub broken: Vec<Vec<String>>,
    /// Per session index: the session disconnects after this many calls.
    pub disconnect_after: Vec<u64>,
    /// Number of initial `open` calls that fail to authenticate.
    pub failed_logins: usize,
    /// Time cost of every select or button press.
    pub step_cost: Duration,
}

/// Counters shared by every wizard of one provider.
#[derive(Debug, Default)]
pub struct SimCounters {
    guide_opens: AtomicU64,
    actions: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    confirmations: Mutex<Vec<Vec<String>>>,
    leaf_screens: Mutex<Vec<Vec<String>>>,
}

impl SimCounters {
    pub fn guide_opens(&self) -> u64 {
        self.guide_opens.load(Ordering::SeqCst)
    }

    pub fn actions(&self) -> u64 {
        self.actions.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> u64 {
        self.sessions_closed.load(Ordering::SeqCst)
    }

    /// Selections committed with 決定, in order.
    pub fn confirmations(&self) -> Vec<Vec<String>> {
        self.confirmations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Paths for which the third screen was reached.
    pub fn leaf_screens(&self) -> Vec<Vec<String>> {
        self.leaf_screens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn push(list: &Mutex<Vec<Vec<String>>>, path: Vec<String>) {
        list.lock().unwrap_or_else(|e| e.into_inner()).push(path);
    }
}

const CONTROLS_PER_SCREEN: usize = 2;
const SCREENS: u8 = 3;

/// One simulated session's wizard.
pub struct SimulatedWizard {
    tree: Arc<SimTree>,
    faults: SimFaults,
    session: usize,
    counters: Arc<SimCounters>,
    /// 0 while the modal is closed.
    screen: u8,
    selection: Vec<Option<String>>,
    calls: u64,
}

impl SimulatedWizard {
    pub fn new(tree: Arc<SimTree>, faults: SimFaults) -> Self {
        Self::for_session(tree, faults, 0, Arc::new(SimCounters::default()))
    }

    fn for_session(tree: Arc<SimTree>, faults: SimFaults, session: usize, counters: Arc<SimCounters>) -> Self {
        Self {
            tree,
            faults,
            session,
            counters,
            screen: 0,
            selection: vec![None; SCREENS as usize * CONTROLS_PER_SCREEN],
            calls: 0,
        }
    }

    pub fn counters(&self) -> Arc<SimCounters> {
        self.counters.clone()
    }

    fn tick(&mut self) -> SurfaceResult<()> {
        self.calls += 1;
        self.counters.actions.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.faults.disconnect_after.get(self.session) {
            if self.calls > *limit {
                return Err(SurfaceError::Disconnected("Target closed".into()));
            }
        }
        Ok(())
    }

    async fn pay(&self) {
        if !self.faults.step_cost.is_zero() {
            tokio::time::sleep(self.faults.step_cost).await;
        }
    }

    fn depth(&self, slot: usize) -> Option<usize> {
        if self.screen == 0 || slot >= CONTROLS_PER_SCREEN {
            return None;
        }
        Some((self.screen as usize - 1) * CONTROLS_PER_SCREEN + slot)
    }

    /// Labels the control at `depth` offers given the current selection.
    fn labels_at(&self, depth: usize) -> Vec<String> {
        // The line wizard's end-station select mirrors the start-station one.
        let parent_len = match self.tree.domain {
            Domain::Line if depth == 5 => 4,
            _ => depth,
        };
        let parent: Option<Vec<String>> = self.selection[..parent_len].iter().cloned().collect();
        let Some(parent) = parent else {
            return Vec::new();
        };
        if self.faults.broken.iter().any(|b| parent.starts_with(b)) {
            return Vec::new();
        }
        self.tree.children(&parent).unwrap_or_default()
    }

    fn reset(&mut self) {
        self.screen = 0;
        self.selection.iter_mut().for_each(|s| *s = None);
    }

    fn selected_path(&self) -> Vec<String> {
        self.selection.iter().flatten().cloned().collect()
    }
}

fn option_value(index: usize) -> String {
    format!("{:03}", index + 1)
}

#[async_trait]
impl WizardSurface for SimulatedWizard {
    async fn open_guide(&mut self, domain: Domain) -> SurfaceResult<()> {
        self.tick()?;
        if domain != self.tree.domain {
            return Err(SurfaceError::Interaction(format!("no {domain} guide on this page")));
        }
        self.pay().await;
        self.reset();
        self.screen = 1;
        self.counters.guide_opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_options(&mut self, slot: usize) -> SurfaceResult<Vec<UiOption>> {
        self.tick()?;
        let Some(depth) = self.depth(slot) else {
            return Ok(Vec::new());
        };
        let mut options = vec![UiOption {
            value: String::new(),
            label: PLACEHOLDER_LABEL.to_string(),
            disabled: false,
        }];
        options.extend(self.labels_at(depth).into_iter().enumerate().map(|(i, label)| UiOption {
            value: option_value(i),
            label,
            disabled: false,
        }));
        Ok(options)
    }

    async fn select_option(&mut self, slot: usize, value: &str) -> SurfaceResult<bool> {
        self.tick()?;
        self.pay().await;
        let Some(depth) = self.depth(slot) else {
            return Ok(false);
        };
        let labels = self.labels_at(depth);
        let Some(label) = labels
            .into_iter()
            .enumerate()
            .find(|(i, _)| option_value(*i) == value)
            .map(|(_, label)| label)
        else {
            return Ok(false);
        };
        self.selection[depth] = Some(label);
        for later in self.selection[depth + 1..].iter_mut() {
            *later = None;
        }
        Ok(true)
    }

    async fn trigger(&mut self, label: &str) -> SurfaceResult<bool> {
        self.tick()?;
        self.pay().await;
        if self.screen == 0 {
            return Ok(false);
        }
        if label == ADVANCE_LABEL {
            let last_slot = self.screen as usize * CONTROLS_PER_SCREEN - 1;
            if self.screen >= SCREENS || self.selection[last_slot].is_none() {
                return Ok(false);
            }
            self.screen += 1;
            if self.screen == SCREENS {
                SimCounters::push(&self.counters.leaf_screens, self.selected_path());
            }
            return Ok(true);
        }
        if label == CONFIRM_LABEL {
            if self.screen != SCREENS {
                return Ok(false);
            }
            SimCounters::push(&self.counters.confirmations, self.selected_path());
            self.reset();
            return Ok(true);
        }
        if CANCEL_LABELS.contains(&label) {
            self.reset();
            return Ok(true);
        }
        Ok(false)
    }

    async fn close_guide(&mut self) -> SurfaceResult<()> {
        self.tick()?;
        self.reset();
        Ok(())
    }

    async fn close(self: Box<Self>) {}
}

/// Session provider handing out simulated wizards over one fixture.
pub struct SimulatedProvider {
    tree: Arc<SimTree>,
    faults: SimFaults,
    counters: Arc<SimCounters>,
    next_session: AtomicUsize,
    logins: AtomicUsize,
}

impl SimulatedProvider {
    pub fn new(tree: SimTree, faults: SimFaults) -> Self {
        Self {
            tree: Arc::new(tree),
            faults,
            counters: Arc::new(SimCounters::default()),
            next_session: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
        }
    }

    pub fn tree(&self) -> &SimTree {
        &self.tree
    }

    pub fn counters(&self) -> Arc<SimCounters> {
        self.counters.clone()
    }
}

#[async_trait]
impl SessionProvider for SimulatedProvider {
    async fn open(&self) -> SessionResult<Box<dyn WizardSurface>> {
        if self.logins.fetch_add(1, Ordering::SeqCst) < self.faults.failed_logins {
            return Err(SessionError::Authentication("simulated login rejected".into()));
        }
        let session = self.next_session.fetch_add(1, Ordering::SeqCst);
        self.counters.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedWizard::for_session(
            self.tree.clone(),
            self.faults.clone(),
            session,
            self.counters.clone(),
        )))
    }

    async fn close(&self, surface: Box<dyn WizardSurface>) {
        surface.close().await;
        self.counters.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }
}
