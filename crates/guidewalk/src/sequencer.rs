//! Step sequencer: drives the wizard's fixed screen sequence.
//!
//! A walk is compiled into a short plan of operations (select, harvest,
//! confirm) over the domain's controls. Executing a plan moves the wizard
//! through `Init → Screen1 → Screen2 → Screen3 → Confirmed`, verifying each
//! screen on arrival. A soft failure anywhere closes the modal and replays
//! the plan from the start, up to `max_attempts` times.

use crate::budget::RunBudget;
use crate::descriptor::{ControlRole, ControlSpec, DomainDescriptor, LEAF_PARENT_DEPTH};
use crate::error::{SequencerError, StepFailure, SurfaceError};
use crate::resolver::resolve_option;
use crate::settle::{await_options, SettlePolicy};
use crate::surface::WizardSurface;
use crate::types::{region_for, selectable_labels, Domain, Level, UiOption};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// Retry and wait settings for one sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerPolicy {
    pub max_attempts: u32,
    pub settle: SettlePolicy,
}

impl Default for SequencerPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            settle: SettlePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardState {
    Init,
    Screen1,
    Screen2,
    Screen3,
    Confirmed,
    Failed,
}

impl WizardState {
    fn for_screen(screen: u8) -> Self {
        match screen {
            1 => Self::Screen1,
            2 => Self::Screen2,
            _ => Self::Screen3,
        }
    }

    /// Wizard screen currently shown, 0 when the modal is not open.
    pub fn screen(&self) -> u8 {
        match self {
            Self::Screen1 => 1,
            Self::Screen2 => 2,
            Self::Screen3 | Self::Confirmed => 3,
            Self::Init | Self::Failed => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

impl fmt::Display for WizardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A known location or line to select and confirm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UsageTarget {
    Location {
        prefecture: String,
        /// 地域区分.
        city: String,
        ward: String,
        /// Located by scanning detail points when present.
        town: Option<String>,
    },
    Line {
        prefecture: String,
        line: String,
        /// Scanned for when unknown.
        kana_row: Option<String>,
        from: String,
        to: Option<String>,
    },
}

impl UsageTarget {
    pub fn domain(&self) -> Domain {
        match self {
            Self::Location { .. } => Domain::Location,
            Self::Line { .. } => Domain::Line,
        }
    }

    pub fn prefecture(&self) -> &str {
        match self {
            Self::Location { prefecture, .. } | Self::Line { prefecture, .. } => prefecture,
        }
    }
}

impl fmt::Display for UsageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location {
                prefecture,
                city,
                ward,
                town,
            } => {
                write!(f, "{prefecture} > {city} > {ward}")?;
                if let Some(town) = town {
                    write!(f, " > {town}")?;
                }
                Ok(())
            }
            Self::Line {
                prefecture,
                line,
                from,
                to,
                ..
            } => {
                write!(f, "{prefecture} > {line} > {from}")?;
                if let Some(to) = to {
                    write!(f, "〜{to}")?;
                }
                Ok(())
            }
        }
    }
}

/// Labels harvested from one control during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harvest {
    pub level: Level,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone)]
enum Op {
    Select {
        control: ControlSpec,
        query: String,
    },
    /// Walk the options of `inline` until `query` resolves in `target`.
    SelectVia {
        inline: ControlSpec,
        target: ControlSpec,
        query: String,
    },
    Harvest {
        control: ControlSpec,
    },
    /// Union of `leaf` options over every option of `inline`.
    HarvestEach {
        inline: ControlSpec,
        leaf: ControlSpec,
    },
    Confirm,
}

enum Outcome {
    Harvested(Harvest),
    Confirmed(Vec<String>),
}

enum AttemptError {
    Step(StepFailure),
    Surface(SurfaceError),
    Interrupted,
}

impl From<StepFailure> for AttemptError {
    fn from(f: StepFailure) -> Self {
        AttemptError::Step(f)
    }
}

impl From<SurfaceError> for AttemptError {
    fn from(e: SurfaceError) -> Self {
        AttemptError::Surface(e)
    }
}

/// Position of the wizard within one attempt.
struct Cursor {
    screen: u8,
    /// Labels of the current screen's first control, for change detection.
    first_control: Vec<String>,
    selected: Vec<String>,
}

/// Drives one wizard surface for one domain.
pub struct Sequencer {
    descriptor: DomainDescriptor,
    policy: SequencerPolicy,
    state: WizardState,
}

impl Sequencer {
    pub fn new(descriptor: DomainDescriptor, policy: SequencerPolicy) -> Self {
        Self {
            descriptor,
            policy,
            state: WizardState::Init,
        }
    }

    pub fn state(&self) -> WizardState {
        self.state
    }

    pub fn descriptor(&self) -> &DomainDescriptor {
        &self.descriptor
    }

    /// Discovery mode: reach the node at `path` and harvest its children.
    ///
    /// For a location leaf parent every detail point is enumerated inline and
    /// `budget` is checked before each one.
    pub async fn discover(
        &mut self,
        surface: &mut dyn WizardSurface,
        path: &[String],
        budget: Option<&RunBudget>,
    ) -> Result<Harvest, SequencerError> {
        let ops = self.discovery_plan(path)?;
        let domain = self.descriptor.domain;
        match self.run(surface, domain, &ops, budget, false).await? {
            Outcome::Harvested(harvest) => Ok(harvest),
            Outcome::Confirmed(_) => Err(SequencerError::Failed {
                attempts: 1,
                last: StepFailure::ActionMissing {
                    screen: 3,
                    label: "harvest".into(),
                },
            }),
        }
    }

    /// Usage mode: select `target` and confirm. Returns the selected labels.
    pub async fn commit(
        &mut self,
        surface: &mut dyn WizardSurface,
        target: &UsageTarget,
    ) -> Result<Vec<String>, SequencerError> {
        let ops = self.usage_plan(target)?;
        let domain = self.descriptor.domain;
        match self.run(surface, domain, &ops, None, true).await? {
            Outcome::Confirmed(selected) => Ok(selected),
            Outcome::Harvested(_) => Err(SequencerError::Failed {
                attempts: 1,
                last: StepFailure::ActionMissing {
                    screen: 3,
                    label: self.descriptor.confirm_label.clone(),
                },
            }),
        }
    }

    /// The select-and-confirm plan for `target`. A target of the other domain
    /// has no controls here.
    fn usage_plan(&self, target: &UsageTarget) -> Result<Vec<Op>, SequencerError> {
        if target.domain() != self.descriptor.domain {
            return Err(SequencerError::Failed {
                attempts: 0,
                last: StepFailure::ActionMissing {
                    screen: 1,
                    label: format!("{} guide", target.domain()),
                },
            });
        }
        let controls = self.descriptor.controls();
        let select = |depth: usize, query: &str| Op::Select {
            control: controls[depth],
            query: query.to_string(),
        };
        let region = region_for(target.prefecture()).unwrap_or_default();

        let mut ops = vec![select(0, region), select(1, target.prefecture())];
        match target {
            UsageTarget::Location {
                city, ward, town, ..
            } => {
                ops.push(select(2, city));
                ops.push(select(3, ward));
                if let Some(town) = town {
                    ops.push(Op::SelectVia {
                        inline: controls[4],
                        target: controls[5],
                        query: town.clone(),
                    });
                }
            }
            UsageTarget::Line {
                line,
                kana_row,
                from,
                to,
                ..
            } => {
                match kana_row {
                    Some(kana_row) => {
                        ops.push(select(2, kana_row));
                        ops.push(select(3, line));
                    }
                    None => ops.push(Op::SelectVia {
                        inline: controls[2],
                        target: controls[3],
                        query: line.clone(),
                    }),
                }
                ops.push(select(4, from));
                if let Some(to) = to {
                    ops.push(select(5, to));
                }
            }
        }
        ops.push(Op::Confirm);
        Ok(ops)
    }

    fn discovery_plan(&self, path: &[String]) -> Result<Vec<Op>, SequencerError> {
        let controls = self.descriptor.controls();
        if path.len() > LEAF_PARENT_DEPTH {
            return Err(SequencerError::Failed {
                attempts: 0,
                last: StepFailure::OptionNotFound {
                    level: self.descriptor.leaf_level(),
                    query: path.join(" > "),
                    available: Vec::new(),
                },
            });
        }

        let mut ops: Vec<Op> = path
            .iter()
            .zip(controls)
            .map(|(label, control)| Op::Select {
                control: *control,
                query: label.clone(),
            })
            .collect();

        let next = controls[path.len()];
        let op = match (next.role, controls.get(path.len() + 1)) {
            (ControlRole::Inline, Some(leaf)) => Op::HarvestEach {
                inline: next,
                leaf: *leaf,
            },
            _ => Op::Harvest { control: next },
        };
        ops.push(op);
        Ok(ops)
    }

    async fn run(
        &mut self,
        surface: &mut dyn WizardSurface,
        domain: Domain,
        ops: &[Op],
        budget: Option<&RunBudget>,
        usage: bool,
    ) -> Result<Outcome, SequencerError> {
        let mut last = None;
        for attempt in 1..=self.policy.max_attempts {
            self.transition(WizardState::Init);
            let failure = match self.attempt(surface, domain, ops, budget).await {
                Ok(outcome) => {
                    if !usage {
                        self.dismiss(surface).await?;
                    }
                    return Ok(outcome);
                }
                Err(AttemptError::Interrupted) => {
                    self.dismiss(surface).await?;
                    return Err(SequencerError::Interrupted);
                }
                Err(AttemptError::Surface(e)) if e.is_fatal() => {
                    self.transition(WizardState::Failed);
                    return Err(SequencerError::SessionBroken(e.to_string()));
                }
                Err(AttemptError::Surface(e)) => StepFailure::Interaction {
                    screen: self.state.screen(),
                    reason: e.to_string(),
                },
                Err(AttemptError::Step(failure)) => failure,
            };

            warn!(
                attempt,
                max_attempts = self.policy.max_attempts,
                "wizard step failed: {}",
                failure
            );
            self.dismiss(surface).await?;
            last = Some(failure);
        }

        self.transition(WizardState::Failed);
        Err(SequencerError::Failed {
            attempts: self.policy.max_attempts,
            last: last.unwrap_or(StepFailure::ActionMissing {
                screen: 0,
                label: "attempt".into(),
            }),
        })
    }

    async fn attempt(
        &mut self,
        surface: &mut dyn WizardSurface,
        domain: Domain,
        ops: &[Op],
        budget: Option<&RunBudget>,
    ) -> Result<Outcome, AttemptError> {
        surface.open_guide(domain).await?;
        let first = await_options(surface, 0, self.policy.settle, |o| !selectable_labels(o).is_empty())
            .await?
            .ok_or(StepFailure::WaitTimeout { screen: 1, slot: 0 })?;
        self.transition(WizardState::Screen1);
        self.check_markers(1, &first)?;

        let mut cursor = Cursor {
            screen: 1,
            first_control: selectable_labels(&first),
            selected: Vec::new(),
        };

        for op in ops {
            match op {
                Op::Select { control, query } => {
                    self.reach(surface, &mut cursor, control.screen).await?;
                    let options = self.ready_options(surface, *control).await?;
                    let label = self.choose(surface, *control, &options, query).await?;
                    cursor.selected.push(label);
                }
                Op::SelectVia {
                    inline,
                    target,
                    query,
                } => {
                    self.reach(surface, &mut cursor, inline.screen).await?;
                    let label = self.select_via(surface, *inline, *target, query).await?;
                    cursor.selected.push(label);
                }
                Op::Harvest { control } => {
                    self.reach(surface, &mut cursor, control.screen).await?;
                    let options = self.ready_options(surface, *control).await?;
                    let labels = selectable_labels(&options);
                    debug!(level = %control.level, count = labels.len(), "harvested");
                    return Ok(Outcome::Harvested(Harvest {
                        level: control.level,
                        labels,
                    }));
                }
                Op::HarvestEach { inline, leaf } => {
                    self.reach(surface, &mut cursor, inline.screen).await?;
                    let labels = self.harvest_each(surface, *inline, *leaf, budget).await?;
                    return Ok(Outcome::Harvested(Harvest {
                        level: leaf.level,
                        labels,
                    }));
                }
                Op::Confirm => {
                    self.reach(surface, &mut cursor, 3).await?;
                    let label = self.descriptor.confirm_label.clone();
                    if !surface.trigger(&label).await? {
                        return Err(StepFailure::ActionMissing {
                            screen: cursor.screen,
                            label,
                        }
                        .into());
                    }
                    self.transition(WizardState::Confirmed);
                    return Ok(Outcome::Confirmed(cursor.selected));
                }
            }
        }

        Err(StepFailure::ActionMissing {
            screen: cursor.screen,
            label: self.descriptor.confirm_label.clone(),
        }
        .into())
    }

    /// Advance until `screen` is shown, verifying each screen on arrival.
    async fn reach(
        &mut self,
        surface: &mut dyn WizardSurface,
        cursor: &mut Cursor,
        screen: u8,
    ) -> Result<(), AttemptError> {
        while cursor.screen < screen {
            let advance = self.descriptor.advance_label.clone();
            if !surface.trigger(&advance).await? {
                return Err(StepFailure::ActionMissing {
                    screen: cursor.screen,
                    label: advance,
                }
                .into());
            }

            let next = cursor.screen + 1;
            let previous = cursor.first_control.clone();
            let options = await_options(surface, 0, self.policy.settle, |o| {
                let labels = selectable_labels(o);
                !labels.is_empty() && labels != previous
            })
            .await?
            .ok_or(StepFailure::WaitTimeout { screen: next, slot: 0 })?;

            self.transition(WizardState::for_screen(next));
            self.check_markers(next, &options)?;
            cursor.screen = next;
            cursor.first_control = selectable_labels(&options);
        }
        Ok(())
    }

    fn check_markers(&self, screen: u8, options: &[UiOption]) -> Result<(), StepFailure> {
        if self.descriptor.markers.check(screen, options) {
            return Ok(());
        }
        Err(StepFailure::ScreenMismatch {
            screen,
            expected: self.descriptor.markers.for_screen(screen).to_vec(),
            seen: selectable_labels(options),
        })
    }

    /// Options of `control` once it has something selectable.
    async fn ready_options(
        &self,
        surface: &mut dyn WizardSurface,
        control: ControlSpec,
    ) -> Result<Vec<UiOption>, AttemptError> {
        let options = await_options(surface, control.slot, self.policy.settle, |o| {
            !selectable_labels(o).is_empty()
        })
        .await?
        .ok_or(StepFailure::WaitTimeout {
            screen: control.screen,
            slot: control.slot,
        })?;
        Ok(options)
    }

    /// Options of a dependent control after its parent selection changed.
    ///
    /// Waits for a list different from `before`; when the wait runs out the
    /// current list is taken as-is, since neighbours may share identical
    /// lists or have none at all.
    async fn changed_options(
        &self,
        surface: &mut dyn WizardSurface,
        slot: usize,
        before: &[String],
    ) -> Result<Vec<UiOption>, SurfaceError> {
        let waited = await_options(surface, slot, self.policy.settle, |o| {
            let labels = selectable_labels(o);
            !labels.is_empty() && labels != before
        })
        .await?;
        match waited {
            Some(options) => Ok(options),
            None => surface.read_options(slot).await,
        }
    }

    async fn choose(
        &self,
        surface: &mut dyn WizardSurface,
        control: ControlSpec,
        options: &[UiOption],
        query: &str,
    ) -> Result<String, AttemptError> {
        let (option, tier) = resolve_option(options, query).ok_or_else(|| StepFailure::OptionNotFound {
            level: control.level,
            query: query.to_string(),
            available: selectable_labels(options),
        })?;
        debug!(level = %control.level, query, matched = %option.label, %tier, "resolved option");

        if !surface.select_option(control.slot, &option.value).await? {
            return Err(StepFailure::SelectionRejected {
                screen: control.screen,
                label: option.label.clone(),
            }
            .into());
        }
        Ok(option.label.trim().to_string())
    }

    async fn select_option_exact(
        &self,
        surface: &mut dyn WizardSurface,
        control: ControlSpec,
        option: &UiOption,
    ) -> Result<(), AttemptError> {
        if surface.select_option(control.slot, &option.value).await? {
            Ok(())
        } else {
            Err(StepFailure::SelectionRejected {
                screen: control.screen,
                label: option.label.clone(),
            }
            .into())
        }
    }

    async fn harvest_each(
        &self,
        surface: &mut dyn WizardSurface,
        inline: ControlSpec,
        leaf: ControlSpec,
        budget: Option<&RunBudget>,
    ) -> Result<Vec<String>, AttemptError> {
        let options = self.ready_options(surface, inline).await?;
        let points: Vec<UiOption> = options.into_iter().filter(|o| o.is_selectable()).collect();

        let mut seen = HashSet::new();
        let mut labels = Vec::new();
        for (i, point) in points.iter().enumerate() {
            if budget.is_some_and(|b| b.is_timeout()) {
                debug!(done = i, total = points.len(), "inline enumeration interrupted");
                return Err(AttemptError::Interrupted);
            }
            let before = selectable_labels(&surface.read_options(leaf.slot).await?);
            self.select_option_exact(surface, inline, point).await?;
            let found = selectable_labels(&self.changed_options(surface, leaf.slot, &before).await?);
            debug!(point = %point.label.trim(), count = found.len(), "{} enumerated", inline.level);
            for label in found {
                if seen.insert(label.clone()) {
                    labels.push(label);
                }
            }
        }
        Ok(labels)
    }

    async fn select_via(
        &self,
        surface: &mut dyn WizardSurface,
        inline: ControlSpec,
        target: ControlSpec,
        query: &str,
    ) -> Result<String, AttemptError> {
        let options = self.ready_options(surface, inline).await?;
        let points: Vec<UiOption> = options.into_iter().filter(|o| o.is_selectable()).collect();

        for point in &points {
            let before = selectable_labels(&surface.read_options(target.slot).await?);
            self.select_option_exact(surface, inline, point).await?;
            let candidates = self.changed_options(surface, target.slot, &before).await?;
            if resolve_option(&candidates, query).is_some() {
                debug!(via = %point.label.trim(), query, "located by scanning {}", inline.level);
                return self.choose(surface, target, &candidates, query).await;
            }
        }

        Err(StepFailure::OptionNotFound {
            level: target.level,
            query: query.to_string(),
            available: Vec::new(),
        }
        .into())
    }

    /// Close the modal. Only a disconnect is worth reporting.
    async fn dismiss(&mut self, surface: &mut dyn WizardSurface) -> Result<(), SequencerError> {
        if let Err(e) = surface.close_guide().await {
            if e.is_fatal() {
                self.transition(WizardState::Failed);
                return Err(SequencerError::SessionBroken(e.to_string()));
            }
            warn!("could not close wizard: {}", e);
        }
        if !self.state.is_terminal() {
            self.transition(WizardState::Init);
        }
        Ok(())
    }

    fn transition(&mut self, next: WizardState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "wizard state");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimFaults, SimTree, SimulatedWizard};
    use std::sync::Arc;

    fn path(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn location_tree() -> SimTree {
        let mut tree = SimTree::new(Domain::Location);
        tree.insert_path(&["東日本", "東京都", "23区", "港区", "芝地区", "芝一丁目"]);
        tree.insert_path(&["東日本", "東京都", "23区", "港区", "芝地区", "芝二丁目"]);
        tree.insert_path(&["東日本", "東京都", "23区", "港区", "麻布地区", "麻布十番"]);
        tree.insert_path(&["東日本", "東京都", "23区", "港区", "麻布地区", "芝二丁目"]);
        tree.insert_path(&["東日本", "東京都", "23区", "千代田区", "丸の内地区", "丸の内一丁目"]);
        tree.insert_path(&["東日本", "東京都", "市部", "八王子市", "八王子地区", "旭町"]);
        tree
    }

    fn line_tree() -> SimTree {
        let mut tree = SimTree::new(Domain::Line);
        for station in ["名古屋", "伏見", "栄", "新栄町"] {
            tree.insert_path(&["中部圏", "愛知県", "タ行", "東山線", station]);
        }
        tree.insert_path(&["中部圏", "愛知県", "マ行", "名城線", "大曽根"]);
        tree
    }

    fn wizard(tree: SimTree) -> SimulatedWizard {
        SimulatedWizard::new(Arc::new(tree), SimFaults::default())
    }

    fn sequencer(tree: &SimTree) -> Sequencer {
        Sequencer::new(tree.descriptor(), SequencerPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_regions_and_prefectures() {
        let mut surface = wizard(location_tree());
        let mut seq = sequencer(&location_tree());

        let regions = seq.discover(&mut surface, &[], None).await.unwrap();
        assert_eq!(regions.level, Level::Region);
        assert_eq!(regions.labels, vec!["東日本"]);

        let prefs = seq.discover(&mut surface, &path(&["東日本"]), None).await.unwrap();
        assert_eq!(prefs.labels, vec!["東京都"]);
        assert_eq!(seq.state(), WizardState::Init);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_crosses_screens() {
        let mut surface = wizard(location_tree());
        let mut seq = sequencer(&location_tree());

        let categories = seq
            .discover(&mut surface, &path(&["東日本", "東京"]), None)
            .await
            .unwrap();
        assert_eq!(categories.level, Level::AreaCategory);
        assert_eq!(categories.labels, vec!["23区", "市部"]);

        let wards = seq
            .discover(&mut surface, &path(&["東日本", "東京都", "23区"]), None)
            .await
            .unwrap();
        assert_eq!(wards.labels, vec!["港区", "千代田区"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_towns_enumerated_over_detail_points() {
        let mut surface = wizard(location_tree());
        let mut seq = sequencer(&location_tree());

        let towns = seq
            .discover(&mut surface, &path(&["東日本", "東京都", "23区", "港区"]), None)
            .await
            .unwrap();
        assert_eq!(towns.level, Level::Town);
        assert_eq!(towns.labels, vec!["芝一丁目", "芝二丁目", "麻布十番"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stations_in_order() {
        let mut surface = wizard(line_tree());
        let mut seq = sequencer(&line_tree());

        let stations = seq
            .discover(&mut surface, &path(&["中部圏", "愛知県", "タ行", "東山線"]), None)
            .await
            .unwrap();
        assert_eq!(stations.level, Level::Station);
        assert_eq!(stations.labels, vec!["名古屋", "伏見", "栄", "新栄町"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_option_fails_after_three_attempts() {
        let tree = Arc::new(location_tree());
        let mut surface = SimulatedWizard::new(tree.clone(), SimFaults::default());
        let counters = surface.counters();
        let mut seq = sequencer(&tree);

        let err = seq
            .discover(&mut surface, &path(&["東日本", "大阪府"]), None)
            .await
            .unwrap_err();
        match err {
            SequencerError::Failed { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, StepFailure::OptionNotFound { level: Level::Prefecture, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(seq.state(), WizardState::Failed);
        assert_eq!(counters.guide_opens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_screen_mismatch_is_soft() {
        // The fixture only offers 東日本, so the four default region markers fail.
        let mut surface = wizard(location_tree());
        let mut seq = Sequencer::new(DomainDescriptor::location(), SequencerPolicy::default());
        let err = seq.discover(&mut surface, &[], None).await.unwrap_err();
        assert!(matches!(
            err,
            SequencerError::Failed {
                last: StepFailure::ScreenMismatch { screen: 1, .. },
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_fatal() {
        let faults = SimFaults {
            disconnect_after: vec![2],
            ..Default::default()
        };
        let mut surface = SimulatedWizard::new(Arc::new(location_tree()), faults);
        let mut seq = sequencer(&location_tree());
        let err = seq
            .discover(&mut surface, &path(&["東日本", "東京都"]), None)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_enumeration_discards_harvest() {
        let faults = SimFaults {
            step_cost: std::time::Duration::from_secs(1),
            ..Default::default()
        };
        let mut surface = SimulatedWizard::new(Arc::new(location_tree()), faults);
        let mut seq = sequencer(&location_tree());
        let budget = RunBudget::start(std::time::Duration::from_secs(6));
        let err = seq
            .discover(&mut surface, &path(&["東日本", "東京都", "23区", "港区"]), Some(&budget))
            .await
            .unwrap_err();
        assert!(matches!(err, SequencerError::Interrupted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_town_via_detail_scan() {
        let tree = Arc::new(location_tree());
        let mut surface = SimulatedWizard::new(tree.clone(), SimFaults::default());
        let counters = surface.counters();
        let mut seq = sequencer(&tree);

        let target = UsageTarget::Location {
            prefecture: "東京都".into(),
            city: "23区".into(),
            ward: "港区".into(),
            town: Some("麻布十番".into()),
        };
        let selected = seq.commit(&mut surface, &target).await.unwrap();
        assert_eq!(selected, vec!["東日本", "東京都", "23区", "港区", "麻布十番"]);
        assert_eq!(seq.state(), WizardState::Confirmed);
        assert_eq!(counters.confirmations().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_line_without_kana_row() {
        let mut surface = wizard(line_tree());
        let mut seq = sequencer(&line_tree());

        let target = UsageTarget::Line {
            prefecture: "愛知県".into(),
            line: "名城線".into(),
            kana_row: None,
            from: "大曽根".into(),
            to: None,
        };
        let selected = seq.commit(&mut surface, &target).await.unwrap();
        assert_eq!(selected, vec!["中部圏", "愛知県", "名城線", "大曽根"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_rejects_other_domain() {
        let mut surface = wizard(line_tree());
        let mut seq = sequencer(&location_tree());

        let target = UsageTarget::Line {
            prefecture: "愛知県".into(),
            line: "名城線".into(),
            kana_row: None,
            from: "大曽根".into(),
            to: None,
        };
        let err = seq.commit(&mut surface, &target).await.unwrap_err();
        assert!(matches!(
            err,
            SequencerError::Failed {
                attempts: 0,
                last: StepFailure::ActionMissing { screen: 1, .. }
            }
        ));
        assert_eq!(seq.state(), WizardState::Init);
    }
}
