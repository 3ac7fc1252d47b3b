//! Core data types for the location and line taxonomies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Region → prefecture table used by the portal's first wizard screen.
pub const REGION_PREFECTURES: &[(&str, &[&str])] = &[
    (
        "東日本",
        &[
            "北海道", "青森県", "岩手県", "宮城県", "秋田県", "山形県", "福島県", "茨城県",
            "栃木県", "群馬県", "埼玉県", "千葉県", "東京都", "神奈川県", "新潟県", "山梨県",
            "長野県",
        ],
    ),
    (
        "中部圏",
        &["富山県", "石川県", "福井県", "岐阜県", "静岡県", "愛知県", "三重県"],
    ),
    (
        "近畿圏",
        &["滋賀県", "京都府", "大阪府", "兵庫県", "奈良県", "和歌山県"],
    ),
    (
        "西日本",
        &[
            "鳥取県", "島根県", "岡山県", "広島県", "山口県", "徳島県", "香川県", "愛媛県",
            "高知県", "福岡県", "佐賀県", "長崎県", "熊本県", "大分県", "宮崎県", "鹿児島県",
            "沖縄県",
        ],
    ),
];

/// The four top-level region names, in wizard order.
pub fn region_names() -> Vec<String> {
    REGION_PREFECTURES
        .iter()
        .map(|(region, _)| (*region).to_string())
        .collect()
}

/// Look up the region a prefecture belongs to.
pub fn region_for(prefecture: &str) -> Option<&'static str> {
    REGION_PREFECTURES
        .iter()
        .find(|(_, prefectures)| prefectures.contains(&prefecture))
        .map(|(region, _)| *region)
}

/// Which taxonomy a wizard walk targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// 所在地: administrative areas down to towns.
    Location,
    /// 沿線: rail lines and their stations.
    Line,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location => write!(f, "location"),
            Self::Line => write!(f, "line"),
        }
    }
}

/// One typed level of a taxonomy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// The wizard entry point, above the regions.
    Root,
    Region,
    Prefecture,
    AreaCategory,
    City,
    /// 詳細地点: enumerated inside a ward visit, never persisted.
    Detail,
    Town,
    KanaRow,
    Line,
    Station,
    /// Usage-only end-of-range station on the line wizard's last screen.
    EndStation,
}

impl Level {
    /// Label as shown in the portal.
    pub fn portal_label(&self) -> &'static str {
        match self {
            Self::Root => "入力ガイド",
            Self::Region => "地方",
            Self::Prefecture => "都道府県",
            Self::AreaCategory => "地域区分",
            Self::City => "市区町村",
            Self::Detail => "詳細地点",
            Self::Town => "町丁目",
            Self::KanaRow => "カナ行",
            Self::Line => "路線",
            Self::Station => "駅",
            Self::EndStation => "終点駅",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Root => "root",
            Self::Region => "region",
            Self::Prefecture => "prefecture",
            Self::AreaCategory => "area_category",
            Self::City => "city",
            Self::Detail => "detail",
            Self::Town => "town",
            Self::KanaRow => "kana_row",
            Self::Line => "line",
            Self::Station => "station",
            Self::EndStation => "end_station",
        };
        write!(f, "{name}")
    }
}

/// A town (or a ward with no towns yet) in the location taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationLeaf {
    pub region: String,
    pub prefecture: String,
    /// 地域区分 (area category).
    pub city: String,
    /// 市区町村.
    pub ward: String,
    /// `None` records the ward before any town is known.
    pub town: Option<String>,
}

/// A station and its position along a line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineLeaf {
    pub region: String,
    pub prefecture: String,
    pub line: String,
    pub station: String,
    pub order: u32,
}

/// The unit persisted to the taxonomy store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum LeafRecord {
    Location(LocationLeaf),
    Line(LineLeaf),
}

impl LeafRecord {
    pub fn domain(&self) -> Domain {
        match self {
            Self::Location(_) => Domain::Location,
            Self::Line(_) => Domain::Line,
        }
    }

    pub fn prefecture(&self) -> &str {
        match self {
            Self::Location(leaf) => &leaf.prefecture,
            Self::Line(leaf) => &leaf.prefecture,
        }
    }
}

/// A prefix of a leaf key, used to ask whether a branch is already known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialKey {
    Location {
        region: String,
        prefecture: String,
        city: Option<String>,
        ward: Option<String>,
    },
    Line {
        region: String,
        prefecture: String,
        line: Option<String>,
    },
}

/// A pending visit: the node's own level plus the labels leading to it.
///
/// `path` holds the ancestors followed by the node's own label, so the root
/// node has an empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraversalNode {
    pub level: Level,
    pub path: Vec<String>,
}

impl TraversalNode {
    pub fn root() -> Self {
        Self {
            level: Level::Root,
            path: Vec::new(),
        }
    }

    /// Build the child node reached by choosing `label` at `level`.
    pub fn child(&self, level: Level, label: &str) -> Self {
        let mut path = self.path.clone();
        path.push(label.to_string());
        Self { level, path }
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn label(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }
}

impl fmt::Display for TraversalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.path.join(" > "))
        }
    }
}

/// One option of a wizard `<select>` control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiOption {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub disabled: bool,
}

/// Placeholder text the portal puts at the top of every select.
pub const PLACEHOLDER_LABEL: &str = "選択してください";

impl UiOption {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            value: label.clone(),
            label,
            disabled: false,
        }
    }

    /// Whether the option can actually be chosen.
    pub fn is_selectable(&self) -> bool {
        let label = self.label.trim();
        !self.disabled && !label.is_empty() && label != PLACEHOLDER_LABEL && !label.contains("---")
    }
}

/// Trimmed labels of the selectable options, in order.
pub fn selectable_labels(options: &[UiOption]) -> Vec<String> {
    options
        .iter()
        .filter(|o| o.is_selectable())
        .map(|o| o.label.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_lookup() {
        assert_eq!(region_for("東京都"), Some("東日本"));
        assert_eq!(region_for("愛知県"), Some("中部圏"));
        assert_eq!(region_for("大阪府"), Some("近畿圏"));
        assert_eq!(region_for("沖縄県"), Some("西日本"));
        assert_eq!(region_for("Atlantis"), None);
    }

    #[test]
    fn test_all_prefectures_covered_once() {
        let total: usize = REGION_PREFECTURES.iter().map(|(_, p)| p.len()).sum();
        assert_eq!(total, 47);
        assert_eq!(region_names(), vec!["東日本", "中部圏", "近畿圏", "西日本"]);
    }

    #[test]
    fn test_selectable_filters_placeholders() {
        let options = vec![
            UiOption::new(PLACEHOLDER_LABEL),
            UiOption::new("------"),
            UiOption::new("  "),
            UiOption {
                value: "x".into(),
                label: "無効".into(),
                disabled: true,
            },
            UiOption::new(" 千代田区 "),
        ];
        assert_eq!(selectable_labels(&options), vec!["千代田区"]);
    }

    #[test]
    fn test_node_child_and_display() {
        let root = TraversalNode::root();
        assert_eq!(root.to_string(), "<root>");
        let region = root.child(Level::Region, "東日本");
        let pref = region.child(Level::Prefecture, "東京都");
        assert_eq!(pref.depth(), 2);
        assert_eq!(pref.label(), Some("東京都"));
        assert_eq!(pref.to_string(), "東日本 > 東京都");
        assert!(root.path.is_empty());
    }
}
