//! Front-matter value model: an ordered key/value mapping whose leaves are
//! scalars, homogeneous scalar arrays, or nested maps, addressable through
//! dotted paths (spec §3 `FrontMatter`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Array(Vec<Value>),
    Map(FrontMatter),
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool_loose(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&FrontMatter> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map_mut(&mut self) -> Option<&mut FrontMatter> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Render for display/indexing purposes: strings pass through unquoted,
    /// everything else via its natural textual form.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Array(items) => items.iter().map(Value::to_display_string).collect::<Vec<_>>().join(","),
            Value::Map(_) => String::new(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// An ordered mapping from top-level key to [`Value`]. Nested [`Value::Map`]
/// entries are addressed by joining keys with `.`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontMatter(pub IndexMap<String, Value>);

impl FrontMatter {
    #[must_use]
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    #[must_use]
    pub fn get_top(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set_top(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Read the value at a dotted path, descending through nested maps.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut cur = self.0.get(first)?;
        for part in parts {
            cur = cur.as_map()?.0.get(part)?;
        }
        Some(cur)
    }

    /// Write a value at a dotted path, creating intermediate maps as needed.
    /// Returns an error message if an intermediate segment already holds a
    /// non-map scalar (the caller decides whether that is fatal).
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), String> {
        let mut parts: Vec<&str> = path.split('.').collect();
        let last = parts.pop().ok_or_else(|| "empty path".to_string())?;
        let mut cur = self;
        for part in parts {
            let entry = cur.0.entry(part.to_string()).or_insert_with(|| Value::Map(FrontMatter::new()));
            if !matches!(entry, Value::Map(_)) {
                *entry = Value::Map(FrontMatter::new());
            }
            cur = entry.as_map_mut().expect("just normalized to Map");
        }
        cur.0.insert(last.to_string(), value);
        Ok(())
    }

    /// Delete the value at a dotted path. Missing paths are a silent no-op
    /// (spec §4.9 step 5 / §4.9 delete-field semantics).
    pub fn delete_path(&mut self, path: &str) {
        let mut parts: Vec<&str> = path.split('.').collect();
        let Some(last) = parts.pop() else { return };
        let mut cur = self;
        for part in parts {
            let Some(Value::Map(next)) = cur.0.get_mut(part) else { return };
            cur = next;
        }
        cur.0.shift_remove(last);
    }

    /// Flatten into `(dotted_path, value)` pairs for indexing. Homogeneous
    /// scalar arrays yield one pair per element under the same path, plus
    /// the whole-array pair for iteration conveniences.
    pub fn flatten(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        flatten_into(&self.0, String::new(), &mut out);
        out
    }
}

fn flatten_into(map: &IndexMap<String, Value>, prefix: String, out: &mut Vec<(String, Value)>) {
    for (k, v) in map {
        let path = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
        match v {
            Value::Map(nested) => flatten_into(&nested.0, path, out),
            Value::Array(items) => {
                for item in items {
                    out.push((path.clone(), item.clone()));
                }
            }
            scalar => out.push((path, scalar.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_path_nested() {
        let mut fm = FrontMatter::new();
        fm.set_path("inventory.container", Value::from("tool_box")).unwrap();
        assert_eq!(fm.get_path("inventory.container").unwrap().as_str(), Some("tool_box"));
    }

    #[test]
    fn delete_path_missing_is_noop() {
        let mut fm = FrontMatter::new();
        fm.delete_path("a.b.c");
        assert!(fm.0.is_empty());
    }

    #[test]
    fn flatten_indexes_each_array_element_under_same_path() {
        let mut fm = FrontMatter::new();
        fm.set_top("inventory", Value::Map({
            let mut m = FrontMatter::new();
            m.set_top("items", Value::Array(vec![Value::from("hammer"), Value::from("screwdriver")]));
            m
        }));
        let flat = fm.flatten();
        let items: Vec<_> = flat.iter().filter(|(p, _)| p == "inventory.items").collect();
        assert_eq!(items.len(), 2);
    }
}
