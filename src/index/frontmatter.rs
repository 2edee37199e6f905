//! The front-matter index (C4): an in-memory inverted index over dotted
//! key paths, rebuilt from page events, supporting exact/prefix/existence
//! queries (spec §4.4). Grounded on the teacher's `database::index`
//! hash/btree index pair, generalized from BSON document fields to
//! front-matter `Value`s over dotted paths.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::page::Value;

type Forward = HashMap<String, HashMap<String, Value>>;
type Inverted = HashMap<String, HashMap<String, HashSet<String>>>;

#[derive(Default)]
pub struct FrontMatterIndex {
    // path -> value's display string -> ids
    inverted: RwLock<Inverted>,
    // id -> path -> value
    forward: RwLock<Forward>,
}

impl FrontMatterIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace all entries for `id` with the flattened contents
    /// of `flattened` (dotted path, value). Readers observe either the
    /// complete pre-update or post-update state per id (spec §4.4).
    pub fn replace_for_id(&self, id: &str, flattened: Vec<(String, Value)>) {
        let mut forward = self.forward.write();
        let mut inverted = self.inverted.write();

        if let Some(old_paths) = forward.get(id) {
            for (path, value) in old_paths {
                if let Some(by_value) = inverted.get_mut(path) {
                    if let Some(ids) = by_value.get_mut(&value.to_display_string()) {
                        ids.remove(id);
                        if ids.is_empty() {
                            by_value.remove(&value.to_display_string());
                        }
                    }
                }
            }
        }

        let mut new_forward: HashMap<String, Value> = HashMap::new();
        for (path, value) in flattened {
            inverted.entry(path.clone()).or_default().entry(value.to_display_string()).or_default().insert(id.to_string());
            new_forward.insert(path, value);
        }
        if new_forward.is_empty() {
            forward.remove(id);
        } else {
            forward.insert(id.to_string(), new_forward);
        }
    }

    /// Wipe all entries for `id`.
    pub fn remove_id(&self, id: &str) {
        self.replace_for_id(id, Vec::new());
    }

    /// Ids where the value at `path` equals `v`, sorted lexicographically.
    #[must_use]
    pub fn query_exact_match(&self, path: &str, v: &str) -> Vec<String> {
        let inverted = self.inverted.read();
        let mut ids: Vec<String> = inverted.get(path).and_then(|by_value| by_value.get(v)).map(|s| s.iter().cloned().collect()).unwrap_or_default();
        ids.sort();
        ids
    }

    /// Ids where the value at `path` is a string beginning with `prefix`,
    /// sorted lexicographically.
    #[must_use]
    pub fn query_prefix_match(&self, path: &str, prefix: &str) -> Vec<String> {
        let inverted = self.inverted.read();
        let mut ids: HashSet<String> = HashSet::new();
        if let Some(by_value) = inverted.get(path) {
            for (value, value_ids) in by_value {
                if value.starts_with(prefix) {
                    ids.extend(value_ids.iter().cloned());
                }
            }
        }
        let mut ids: Vec<String> = ids.into_iter().collect();
        ids.sort();
        ids
    }

    /// Ids where `path` is present and non-null, sorted lexicographically.
    #[must_use]
    pub fn query_key_existence(&self, path: &str) -> Vec<String> {
        let forward = self.forward.read();
        let mut ids: Vec<String> = forward.iter().filter(|(_, paths)| paths.contains_key(path)).map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids
    }

    /// The value at `path` for `id`, or `""` if absent — callers treat
    /// empty string as absence, even for non-string values (spec §4.4,
    /// open question in §9: preserved as specified).
    #[must_use]
    pub fn get_value(&self, id: &str, path: &str) -> String {
        self.forward.read().get(id).and_then(|paths| paths.get(path)).map(Value::to_display_string).unwrap_or_default()
    }

    /// Snapshot of indexed ids, for diagnostics.
    #[must_use]
    pub fn indexed_ids(&self) -> BTreeMap<String, usize> {
        self.forward.read().iter().map(|(id, paths)| (id.clone(), paths.len())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_returns_sorted_ids() {
        let idx = FrontMatterIndex::new();
        idx.replace_for_id("b", vec![("inventory.container".to_string(), Value::from("box"))]);
        idx.replace_for_id("a", vec![("inventory.container".to_string(), Value::from("box"))]);
        assert_eq!(idx.query_exact_match("inventory.container", "box"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn replace_for_id_is_atomic_swap() {
        let idx = FrontMatterIndex::new();
        idx.replace_for_id("x", vec![("k".to_string(), Value::from("old"))]);
        idx.replace_for_id("x", vec![("k".to_string(), Value::from("new"))]);
        assert_eq!(idx.query_exact_match("k", "old"), Vec::<String>::new());
        assert_eq!(idx.query_exact_match("k", "new"), vec!["x".to_string()]);
    }

    #[test]
    fn remove_id_wipes_all_entries() {
        let idx = FrontMatterIndex::new();
        idx.replace_for_id("x", vec![("k".to_string(), Value::from("v"))]);
        idx.remove_id("x");
        assert_eq!(idx.query_key_existence("k"), Vec::<String>::new());
        assert_eq!(idx.get_value("x", "k"), "");
    }

    #[test]
    fn prefix_match_matches_string_values_only() {
        let idx = FrontMatterIndex::new();
        idx.replace_for_id("x", vec![("title".to_string(), Value::from("Tool Box"))]);
        assert_eq!(idx.query_prefix_match("title", "Tool"), vec!["x".to_string()]);
        assert_eq!(idx.query_prefix_match("title", "Nope"), Vec::<String>::new());
    }

    #[test]
    fn get_value_returns_empty_string_for_absence() {
        let idx = FrontMatterIndex::new();
        assert_eq!(idx.get_value("missing", "k"), "");
    }
}
