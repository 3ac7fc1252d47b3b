//! Domain descriptors: how each taxonomy level maps onto the wizard screens.
//!
//! One traversal engine and one sequencer serve both domains; everything
//! domain-specific (which control holds which level, which level is the leaf,
//! how a path becomes a store key) lives here.

use crate::types::{region_for, Domain, LeafRecord, Level, LineLeaf, LocationLeaf, PartialKey};
use crate::verifier::ScreenMarkers;

/// Label of the button that moves to the next screen.
pub const ADVANCE_LABEL: &str = "次へ";
/// Label of the button that commits the final selection.
pub const CONFIRM_LABEL: &str = "決定";
/// Buttons that dismiss the wizard, in the order they are tried.
pub const CANCEL_LABELS: &[&str] = &["キャンセル", "閉じる", "×"];

/// How a control's level takes part in a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRole {
    /// Each option becomes a traversal node.
    Node,
    /// Enumerated inside one visit; never a node, never persisted.
    Inline,
    /// Options are the persisted leaves.
    Leaf,
    /// Only used when committing a selection.
    UsageOnly,
}

/// One `<select>` of the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSpec {
    pub level: Level,
    /// 1-based wizard screen.
    pub screen: u8,
    /// Position of the control on its screen.
    pub slot: usize,
    pub role: ControlRole,
}

impl ControlSpec {
    const fn new(level: Level, screen: u8, slot: usize, role: ControlRole) -> Self {
        Self {
            level,
            screen,
            slot,
            role,
        }
    }
}

const LOCATION_CONTROLS: &[ControlSpec] = &[
    ControlSpec::new(Level::Region, 1, 0, ControlRole::Node),
    ControlSpec::new(Level::Prefecture, 1, 1, ControlRole::Node),
    ControlSpec::new(Level::AreaCategory, 2, 0, ControlRole::Node),
    ControlSpec::new(Level::City, 2, 1, ControlRole::Node),
    ControlSpec::new(Level::Detail, 3, 0, ControlRole::Inline),
    ControlSpec::new(Level::Town, 3, 1, ControlRole::Leaf),
];

const LINE_CONTROLS: &[ControlSpec] = &[
    ControlSpec::new(Level::Region, 1, 0, ControlRole::Node),
    ControlSpec::new(Level::Prefecture, 1, 1, ControlRole::Node),
    ControlSpec::new(Level::KanaRow, 2, 0, ControlRole::Node),
    ControlSpec::new(Level::Line, 2, 1, ControlRole::Node),
    ControlSpec::new(Level::Station, 3, 0, ControlRole::Leaf),
    ControlSpec::new(Level::EndStation, 3, 1, ControlRole::UsageOnly),
];

/// Number of node labels above the leaf level: region, prefecture,
/// category or kana row, ward or line.
pub const LEAF_PARENT_DEPTH: usize = 4;

/// Everything the engine needs to know about one domain.
#[derive(Debug, Clone)]
pub struct DomainDescriptor {
    pub domain: Domain,
    controls: &'static [ControlSpec],
    pub markers: ScreenMarkers,
    pub advance_label: String,
    pub confirm_label: String,
    pub cancel_labels: Vec<String>,
}

impl DomainDescriptor {
    pub fn new(domain: Domain) -> Self {
        let controls = match domain {
            Domain::Location => LOCATION_CONTROLS,
            Domain::Line => LINE_CONTROLS,
        };
        Self {
            domain,
            controls,
            markers: ScreenMarkers::default(),
            advance_label: ADVANCE_LABEL.to_string(),
            confirm_label: CONFIRM_LABEL.to_string(),
            cancel_labels: CANCEL_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn location() -> Self {
        Self::new(Domain::Location)
    }

    pub fn line() -> Self {
        Self::new(Domain::Line)
    }

    pub fn with_markers(mut self, markers: ScreenMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn controls(&self) -> &[ControlSpec] {
        self.controls
    }

    /// Control holding the label at path position `depth`.
    pub fn control_at(&self, depth: usize) -> Option<ControlSpec> {
        self.controls.get(depth).copied()
    }

    /// First control with the given role, if the domain has one.
    pub fn control_with_role(&self, role: ControlRole) -> Option<ControlSpec> {
        self.controls.iter().copied().find(|c| c.role == role)
    }

    pub fn leaf_control(&self) -> ControlSpec {
        self.control_with_role(ControlRole::Leaf)
            .unwrap_or(self.controls[self.controls.len() - 1])
    }

    pub fn leaf_level(&self) -> Level {
        self.leaf_control().level
    }

    /// Level of the nodes whose children are leaves.
    pub fn leaf_parent_level(&self) -> Level {
        self.controls[LEAF_PARENT_DEPTH - 1].level
    }

    /// Level of the children discovered below a node at `depth`.
    pub fn child_level(&self, depth: usize) -> Option<Level> {
        if depth >= LEAF_PARENT_DEPTH {
            return Some(self.leaf_level());
        }
        self.control_at(depth).map(|c| c.level)
    }

    pub fn is_leaf_parent(&self, path: &[String]) -> bool {
        path.len() == LEAF_PARENT_DEPTH
    }

    /// Build the record for a leaf found under `path`.
    ///
    /// `ordinal` is the leaf's position in its visit's harvest and becomes the
    /// station order in the line domain. `None` records a ward with no towns.
    pub fn leaf_record(&self, path: &[String], label: Option<&str>, ordinal: u32) -> Option<LeafRecord> {
        if path.len() != LEAF_PARENT_DEPTH {
            return None;
        }
        let prefecture = path[1].clone();
        let region = region_for(&prefecture)
            .map(str::to_string)
            .unwrap_or_else(|| path[0].clone());
        match self.domain {
            Domain::Location => Some(LeafRecord::Location(LocationLeaf {
                region,
                prefecture,
                city: path[2].clone(),
                ward: path[3].clone(),
                town: label.map(str::to_string),
            })),
            Domain::Line => label.map(|station| {
                LeafRecord::Line(LineLeaf {
                    region,
                    prefecture,
                    line: path[3].clone(),
                    station: station.to_string(),
                    order: ordinal,
                })
            }),
        }
    }

    /// Store key prefix for a node path. The kana row is not persisted, so it
    /// does not take part in line keys.
    pub fn partial_key(&self, path: &[String]) -> Option<PartialKey> {
        if path.len() < 2 {
            return None;
        }
        let prefecture = path[1].clone();
        let region = region_for(&prefecture)
            .map(str::to_string)
            .unwrap_or_else(|| path[0].clone());
        Some(match self.domain {
            Domain::Location => PartialKey::Location {
                region,
                prefecture,
                city: path.get(2).cloned(),
                ward: path.get(3).cloned(),
            },
            Domain::Line => PartialKey::Line {
                region,
                prefecture,
                line: path.get(3).cloned(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_location_layout() {
        let d = DomainDescriptor::location();
        assert_eq!(d.leaf_level(), Level::Town);
        assert_eq!(d.leaf_parent_level(), Level::City);
        assert_eq!(d.child_level(0), Some(Level::Region));
        assert_eq!(d.child_level(3), Some(Level::City));
        assert_eq!(d.child_level(4), Some(Level::Town));
        assert_eq!(d.control_with_role(ControlRole::Inline).map(|c| c.level), Some(Level::Detail));
    }

    #[test]
    fn test_line_layout() {
        let d = DomainDescriptor::line();
        assert_eq!(d.leaf_level(), Level::Station);
        assert_eq!(d.leaf_parent_level(), Level::Line);
        assert_eq!(d.child_level(2), Some(Level::KanaRow));
        assert!(d.control_with_role(ControlRole::Inline).is_none());
    }

    #[test]
    fn test_leaf_record_recomputes_region() {
        let d = DomainDescriptor::location();
        let rec = d
            .leaf_record(&path(&["近畿圏", "東京都", "23区", "港区"]), Some("芝"), 0)
            .unwrap();
        match rec {
            LeafRecord::Location(leaf) => {
                assert_eq!(leaf.region, "東日本");
                assert_eq!(leaf.town.as_deref(), Some("芝"));
            }
            _ => panic!("wrong domain"),
        }
        assert!(d.leaf_record(&path(&["東日本", "東京都"]), Some("x"), 0).is_none());
    }

    #[test]
    fn test_line_key_skips_kana_row() {
        let d = DomainDescriptor::line();
        let key = d
            .partial_key(&path(&["東日本", "東京都", "ア行", "JR山手線"]))
            .unwrap();
        assert_eq!(
            key,
            PartialKey::Line {
                region: "東日本".into(),
                prefecture: "東京都".into(),
                line: Some("JR山手線".into()),
            }
        );
        let rec = d
            .leaf_record(&path(&["東日本", "東京都", "ア行", "JR山手線"]), Some("品川"), 3)
            .unwrap();
        assert!(matches!(rec, LeafRecord::Line(ref l) if l.order == 3 && l.line == "JR山手線"));
        assert!(d.leaf_record(&path(&["東日本", "東京都", "ア行", "JR山手線"]), None, 0).is_none());
    }
}
