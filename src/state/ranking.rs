use crate::state::roster::PlayerTarget;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// A rating value, or why there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rating {
    Value(i64),
    Marker(RatingMarker),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RatingMarker {
    /// Scanned, but not on the ladder within the page budget.
    NoData,
    /// Not scanned yet; a background scan is filling it in.
    Updating,
}

impl Rating {
    pub const NO_DATA: Rating = Rating::Marker(RatingMarker::NoData);
    pub const UPDATING: Rating = Rating::Marker(RatingMarker::Updating);

    pub fn value(&self) -> Option<i64> {
        match self {
            Rating::Value(v) => Some(*v),
            Rating::Marker(_) => None,
        }
    }
}

/// Annotation attached by the presentation layer's badge classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// One player's standing within one season.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEntry {
    pub battle_tag: String,
    pub found: bool,
    /// Position on the full upstream ladder.
    pub rank: Option<u32>,
    pub rating: Rating,
    /// Dense 1..N position among tracked players.
    pub local_rank: usize,
    #[serde(default)]
    pub twitch_user: Option<String>,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub badges: Vec<Badge>,
}

impl RankEntry {
    pub fn unresolved(target: &PlayerTarget) -> Self {
        Self {
            battle_tag: target.id.clone(),
            found: false,
            rank: None,
            rating: Rating::NO_DATA,
            local_rank: 0,
            twitch_user: target.twitch.clone(),
            is_live: false,
            avatar: None,
            badges: Vec::new(),
        }
    }

    pub fn updating(target: &PlayerTarget) -> Self {
        Self {
            rating: Rating::UPDATING,
            ..Self::unresolved(target)
        }
    }

    pub fn key(&self) -> String {
        self.battle_tag.to_lowercase()
    }
}

fn rank_order(a: &RankEntry, b: &RankEntry) -> Ordering {
    match (a.found, b.found) {
        (true, true) => a.rank.unwrap_or(u32::MAX).cmp(&b.rank.unwrap_or(u32::MAX)),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

/// Sort resolved players by upstream rank ahead of unresolved ones (which keep
/// their relative order) and assign dense local ranks 1..N.
pub fn rank_entries(entries: &mut [RankEntry]) {
    entries.sort_by(rank_order);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.local_rank = i + 1;
    }
}

/// Merge scan results into an existing season.
///
/// A full scan replaces everything. A targeted scan replaces only the entries
/// it carries, appends the ones not seen before and leaves the rest untouched.
/// The result is always re-ranked.
pub fn merge_entries(
    existing: Vec<RankEntry>,
    incoming: Vec<RankEntry>,
    targeted: bool,
) -> Vec<RankEntry> {
    let mut merged = if targeted {
        let mut by_key: HashMap<String, RankEntry> =
            incoming.into_iter().map(|e| (e.key(), e)).collect();
        let mut merged: Vec<RankEntry> = existing
            .into_iter()
            .map(|old| by_key.remove(&old.key()).unwrap_or(old))
            .collect();
        // Appended in a stable order; HashMap iteration is not.
        let mut appended: Vec<RankEntry> = by_key.into_values().collect();
        appended.sort_by_key(|e| e.key());
        merged.extend(appended);
        merged
    } else {
        incoming
    };
    rank_entries(&mut merged);
    merged
}

/// Roster players with no entry in `entries`.
pub fn missing_targets<'a>(
    roster: &'a [PlayerTarget],
    entries: &[RankEntry],
) -> Vec<&'a PlayerTarget> {
    let known: HashSet<String> = entries.iter().map(RankEntry::key).collect();
    roster.iter().filter(|t| !known.contains(&t.full_key)).collect()
}

/// Response-only view: stored entries plus "updating" placeholders for any
/// roster player without one, re-ranked. Nothing here is persisted.
pub fn with_placeholders(entries: &[RankEntry], roster: &[PlayerTarget]) -> Vec<RankEntry> {
    let missing = missing_targets(roster, entries);
    if missing.is_empty() {
        return entries.to_vec();
    }
    let mut view = entries.to_vec();
    view.extend(missing.into_iter().map(RankEntry::updating));
    rank_entries(&mut view);
    view
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(tag: &str, rank: u32, rating: i64) -> RankEntry {
        RankEntry {
            found: true,
            rank: Some(rank),
            rating: Rating::Value(rating),
            ..RankEntry::unresolved(&PlayerTarget::new(tag, None))
        }
    }

    fn missing(tag: &str) -> RankEntry {
        RankEntry::unresolved(&PlayerTarget::new(tag, None))
    }

    fn tags(entries: &[RankEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.battle_tag.as_str()).collect()
    }

    #[test]
    fn ranking_is_dense_found_first_then_by_rank() {
        let mut entries = vec![
            missing("U1#1"),
            found("B#2", 40, 9000),
            missing("U2#2"),
            found("A#1", 3, 12000),
            found("C#3", 250, 8100),
        ];
        rank_entries(&mut entries);

        assert_eq!(tags(&entries), vec!["A#1", "B#2", "C#3", "U1#1", "U2#2"]);
        let locals: Vec<usize> = entries.iter().map(|e| e.local_rank).collect();
        assert_eq!(locals, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn ranking_is_stable_on_rerun() {
        let mut entries = vec![found("A#1", 1, 1), missing("X#1"), missing("Y#1")];
        rank_entries(&mut entries);
        let first = entries.clone();
        rank_entries(&mut entries);
        assert_eq!(entries, first);
    }

    #[test]
    fn full_merge_replaces_everything() {
        let existing = vec![found("A#1", 1, 1), found("B#2", 2, 1)];
        let merged = merge_entries(existing, vec![missing("C#3")], false);
        assert_eq!(tags(&merged), vec!["C#3"]);
        assert_eq!(merged[0].local_rank, 1);
    }

    #[test]
    fn targeted_merge_preserves_untouched_entries() {
        let existing = vec![
            found("A#1", 10, 9000),
            missing("B#2"),
            found("C#3", 5, 9500),
            found("D#4", 80, 8200),
        ];
        let incoming = vec![found("a#1", 12, 8900), found("B#2", 7, 9400)];
        let merged = merge_entries(existing.clone(), incoming, true);

        let c = merged.iter().find(|e| e.battle_tag == "C#3").unwrap();
        let d = merged.iter().find(|e| e.battle_tag == "D#4").unwrap();
        let orig_c = &existing[2];
        let orig_d = &existing[3];
        assert_eq!((c.found, c.rank, c.rating), (orig_c.found, orig_c.rank, orig_c.rating));
        assert_eq!((d.found, d.rank, d.rating), (orig_d.found, orig_d.rank, orig_d.rating));

        let b = merged.iter().find(|e| e.battle_tag == "B#2").unwrap();
        assert!(b.found);
        assert_eq!(merged.len(), 4);
        assert_eq!(tags(&merged), vec!["C#3", "B#2", "a#1", "D#4"]);
    }

    #[test]
    fn targeted_merge_appends_new_players() {
        let merged = merge_entries(vec![found("A#1", 1, 1)], vec![missing("New#9")], true);
        assert_eq!(tags(&merged), vec!["A#1", "New#9"]);
        assert_eq!(merged[1].local_rank, 2);
    }

    #[test]
    fn placeholders_fill_missing_roster_players() {
        let roster = vec![
            PlayerTarget::new("A#1", None),
            PlayerTarget::new("Fresh#5", Some("freshtv".into())),
        ];
        let stored = vec![found("A#1", 4, 9000)];
        let view = with_placeholders(&stored, &roster);

        assert_eq!(view.len(), 2);
        assert_eq!(view[1].battle_tag, "Fresh#5");
        assert_eq!(view[1].rating, Rating::UPDATING);
        assert_eq!(view[1].twitch_user.as_deref(), Some("freshtv"));
        assert_eq!(view[1].local_rank, 2);
    }

    #[test]
    fn rating_serializes_as_number_or_marker() {
        assert_eq!(serde_json::to_string(&Rating::Value(9000)).unwrap(), "9000");
        assert_eq!(serde_json::to_string(&Rating::NO_DATA).unwrap(), "\"no-data\"");
        let back: Rating = serde_json::from_str("\"updating\"").unwrap();
        assert_eq!(back, Rating::UPDATING);
    }
}
