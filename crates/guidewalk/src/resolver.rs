//! Option resolver: tiered fuzzy matching of a wanted label against the
//! options a wizard control currently offers.
//!
//! Tiers are tried in order and the first tier with a hit wins; inside a tier
//! the earliest candidate wins. Not finding anything is an ordinary outcome.

use crate::types::UiOption;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which rule produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchTier {
    Exact,
    Prefix,
    Substring,
    ReverseSubstring,
    Normalized,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Prefix => write!(f, "prefix"),
            Self::Substring => write!(f, "substring"),
            Self::ReverseSubstring => write!(f, "reverse-substring"),
            Self::Normalized => write!(f, "normalized"),
        }
    }
}

/// A successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    /// Position in the candidate slice.
    pub index: usize,
    pub label: &'a str,
    pub tier: MatchTier,
}

/// Resolve `query` against `candidates`.
///
/// Returns `None` (NotFound) when no tier matches or the query is blank.
pub fn resolve<'a, S: AsRef<str>>(candidates: &'a [S], query: &str) -> Option<Match<'a>> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }

    let labels: Vec<&str> = candidates.iter().map(|c| c.as_ref().trim()).collect();
    let hit = |tier: MatchTier, pred: &dyn Fn(&str) -> bool| {
        labels
            .iter()
            .position(|label| !label.is_empty() && pred(label))
            .map(|index| Match {
                index,
                label: labels[index],
                tier,
            })
    };

    if let Some(m) = hit(MatchTier::Exact, &|c| c == query) {
        return Some(m);
    }
    if let Some(m) = hit(MatchTier::Prefix, &|c| c.starts_with(query)) {
        return Some(m);
    }
    if let Some(m) = hit(MatchTier::Substring, &|c| c.contains(query)) {
        return Some(m);
    }
    if let Some(m) = hit(MatchTier::ReverseSubstring, &|c| {
        c.chars().count() > 1 && query.contains(c)
    }) {
        return Some(m);
    }

    let wanted = normalize(query);
    if wanted.is_empty() {
        return None;
    }
    let normalized: Vec<String> = labels.iter().map(|l| normalize(l)).collect();
    let position = normalized
        .iter()
        .position(|c| !c.is_empty() && *c == wanted)
        .or_else(|| {
            normalized.iter().position(|c| {
                !c.is_empty()
                    && (c.contains(&wanted) || (c.chars().count() > 1 && wanted.contains(c.as_str())))
            })
        });

    position.map(|index| Match {
        index,
        label: labels[index],
        tier: MatchTier::Normalized,
    })
}

/// Resolve against live options, ignoring anything not selectable.
pub fn resolve_option<'a>(options: &'a [UiOption], query: &str) -> Option<(&'a UiOption, MatchTier)> {
    let selectable: Vec<&UiOption> = options.iter().filter(|o| o.is_selectable()).collect();
    let labels: Vec<&str> = selectable.iter().map(|o| o.label.as_str()).collect();
    let m = resolve(&labels, query)?;
    Some((selectable[m.index], m.tier))
}

/// Lowercase, drop all whitespace and fold katakana into hiragana.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .map(fold_katakana)
        .collect()
}

/// Map a katakana code point (ァ..ヶ) onto its hiragana counterpart.
fn fold_katakana(c: char) -> char {
    match c {
        '\u{30A1}'..='\u{30F6}' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_beats_prefix() {
        let m = resolve(&["東京都港区", "東京都"], "東京都").unwrap();
        assert_eq!(m.label, "東京都");
        assert_eq!(m.tier, MatchTier::Exact);
    }

    #[test]
    fn test_prefix_tier() {
        let m = resolve(&["東京都", "大阪府"], "東京").unwrap();
        assert_eq!(m.label, "東京都");
        assert_eq!(m.tier, MatchTier::Prefix);
    }

    #[test]
    fn test_not_found() {
        assert!(resolve(&["東京都"], "Osaka").is_none());
        assert!(resolve(&["東京都"], "   ").is_none());
        let empty: [&str; 0] = [];
        assert!(resolve(&empty, "東京").is_none());
    }

    #[test]
    fn test_substring_tier() {
        let m = resolve(&["JR山手線", "東京メトロ銀座線"], "銀座").unwrap();
        assert_eq!(m.label, "東京メトロ銀座線");
        assert_eq!(m.tier, MatchTier::Substring);
    }

    #[test]
    fn test_reverse_substring_requires_two_chars() {
        let m = resolve(&["区", "港区"], "東京都港区").unwrap();
        assert_eq!(m.label, "港区");
        assert_eq!(m.tier, MatchTier::ReverseSubstring);
    }

    #[test]
    fn test_normalized_tier_folds_katakana_and_case() {
        let m = resolve(&["ゆりかもめ", "りんかい線"], "ユリカモメ").unwrap();
        assert_eq!(m.label, "ゆりかもめ");
        assert_eq!(m.tier, MatchTier::Normalized);

        let m = resolve(&["Osaka Metro 御堂筋線"], "osakametro").unwrap();
        assert_eq!(m.tier, MatchTier::Normalized);
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let m = resolve(&["中央区日本橋", "中央区銀座"], "中央区").unwrap();
        assert_eq!(m.index, 0);
    }

    #[test]
    fn test_disabled_options_excluded() {
        let options = vec![
            UiOption {
                value: "1".into(),
                label: "千代田区".into(),
                disabled: true,
            },
            UiOption::new("千代田区丸の内"),
        ];
        let (opt, tier) = resolve_option(&options, "千代田区").unwrap();
        assert_eq!(opt.label, "千代田区丸の内");
        assert_eq!(tier, MatchTier::Prefix);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(" カナ 行\u{3000}ABC"), "かな行abc");
    }
}
