//! Versioned-text history: per-page snapshots of the markdown body, stored
//! inline in the `.json` sidecar alongside the current body (spec §4.2,
//! SPEC_FULL §4 "Versioned-text history storage").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub at: DateTime<Utc>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionedText {
    pub current: String,
    #[serde(default)]
    pub history: Vec<Snapshot>,
}

impl VersionedText {
    #[must_use]
    pub fn new(current: String) -> Self {
        Self { current, history: Vec::new() }
    }

    /// Append a snapshot of the body being replaced, then set the new body
    /// as current. Called by `save` whenever the body actually changes.
    pub fn push_snapshot(&mut self, at: DateTime<Utc>, new_body: String) {
        self.history.push(Snapshot { at, body: std::mem::replace(&mut self.current, new_body) });
    }

    /// Latest snapshot at or before `t`, scanning from the most recent.
    #[must_use]
    pub fn get_previous_by_timestamp(&self, t: DateTime<Utc>) -> Option<&Snapshot> {
        self.history.iter().rev().find(|s| s.at <= t)
    }

    /// Snapshots spaced at least `gap` apart, newest first, paired with the
    /// line-count edit-distance magnitude versus the next-older snapshot in
    /// the returned sequence.
    #[must_use]
    pub fn major_snapshots_and_change_sums(&self, gap: chrono::Duration) -> Vec<(Snapshot, usize)> {
        let mut ordered: Vec<&Snapshot> = self.history.iter().collect();
        ordered.sort_by_key(|s| std::cmp::Reverse(s.at));
        let mut picked: Vec<&Snapshot> = Vec::new();
        for s in ordered {
            match picked.last() {
                Some(prev) if (prev.at - s.at) < gap => {}
                _ => picked.push(s),
            }
        }
        let mut out = Vec::with_capacity(picked.len());
        for (i, snap) in picked.iter().enumerate() {
            let baseline = picked.get(i + 1).map_or("", |older| older.body.as_str());
            out.push(((*snap).clone(), line_change_sum(baseline, &snap.body)));
        }
        out
    }
}

/// Count of changed lines between two texts: a small internal routine
/// (no new heavy diff dependency) counting lines present in one side but
/// not matched in the other, via a line-frequency comparison.
#[must_use]
pub fn line_change_sum(old: &str, new: &str) -> usize {
    use std::collections::HashMap;
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for line in old.lines() {
        *counts.entry(line).or_insert(0) -= 1;
    }
    for line in new.lines() {
        *counts.entry(line).or_insert(0) += 1;
    }
    counts.values().map(|c| c.unsigned_abs() as usize).sum()
}
