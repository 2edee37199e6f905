//! The page store (C2): at-most-one-writer-per-id persistence of
//! `{id -> (front matter, markdown)}` under `data_dir/`, emitting change
//! events that drive the indexing service (spec §4.2).

use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{PageError, Result};
use crate::events::{EventSink, NullSink, PageEvent};
use crate::identifier::{self, Identifier};
use crate::page::front_matter::{FrontMatter, Value};
use crate::page::lock::LockRegistry;
use crate::page::model::{Page, PageJson};

const DELETED_DIR: &str = "__deleted__";

pub struct PageStore {
    data_dir: PathBuf,
    locks: LockRegistry,
    events: Arc<dyn EventSink>,
}

impl PageStore {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, events: Arc<dyn EventSink>) -> Self {
        Self { data_dir: data_dir.into(), locks: LockRegistry::new(), events }
    }

    /// A store with no event fan-out, convenient for store-only tests.
    #[must_use]
    pub fn without_events(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(data_dir, Arc::new(NullSink))
    }

    fn json_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }

    fn md_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.md"))
    }

    /// Open an existing page, or a zero-valued page with `is_new = true`.
    /// Never fails for a well-formed identifier.
    ///
    /// # Errors
    /// Returns [`PageError::InvalidIdentifier`] if `raw_id` cannot be
    /// munged, or [`PageError::Io`]/[`PageError::Json`] if the on-disk state
    /// is corrupt.
    pub fn open(&self, raw_id: &str) -> Result<Page> {
        let id = identifier::munge(raw_id)?;
        let key = identifier::encode_on_disk(id.as_str());
        let json_path = self.json_path(&key);
        if !json_path.exists() {
            return Ok(Page::new_empty(id));
        }
        let json_text = std::fs::read_to_string(&json_path)?;
        let parsed: PageJson = serde_json::from_str(&json_text)?;
        let md_path = self.md_path(&key);
        let current_body = if md_path.exists() { std::fs::read_to_string(&md_path)? } else { parsed.text.current.clone() };
        let mut versioned_text = parsed.text;
        versioned_text.current = current_body;
        Ok(Page {
            identifier: id,
            versioned_text,
            front_matter: parsed.front_matter,
            lock_state: parsed.lock_state,
            last_edit_at: parsed.last_edit_at,
            is_new: false,
        })
    }

    /// Persist `page`, writing both files atomically-per-file and emitting
    /// an `Upsert` event on success. The front-matter `identifier` field is
    /// forced to the canonical munged id (invariant (a), spec §3).
    ///
    /// # Errors
    /// Returns [`PageError::Io`] on write failure; on error, on-disk state
    /// for the half that failed is left unchanged.
    pub fn save(&self, mut page: Page) -> Result<()> {
        let id = page.identifier.clone();
        let key = identifier::encode_on_disk(id.as_str());
        page.front_matter.set_top("identifier", Value::String(id.as_str().to_string()));
        if page.last_edit_at.is_none() {
            page.last_edit_at = Some(Utc::now());
        }
        page.is_new = false;

        let json_path = self.json_path(&key);
        let md_path = self.md_path(&key);
        let body = page.versioned_text.current.clone();
        let json_repr = page.into_json_repr();
        let json_bytes = serde_json::to_vec_pretty(&json_repr)?;

        self.locks.with_lock(id.as_str(), || -> Result<()> {
            crate::fsutil::write_atomic(&json_path, &json_bytes)?;
            crate::fsutil::write_atomic(&md_path, body.as_bytes())?;
            Ok(())
        })?;

        self.events.emit(PageEvent::Upsert(id));
        Ok(())
    }

    /// Soft-delete by moving both files into `__deleted__/`, with a
    /// monotonically-increasing numeric suffix on collision.
    ///
    /// # Errors
    /// Returns [`PageError::NotFound`] if neither file exists, or
    /// [`PageError::Io`] on move failure.
    pub fn delete(&self, raw_id: &str) -> Result<()> {
        let id = identifier::munge(raw_id)?;
        let key = identifier::encode_on_disk(id.as_str());
        let json_path = self.json_path(&key);
        let md_path = self.md_path(&key);
        if !json_path.exists() && !md_path.exists() {
            return Err(PageError::NotFound(id.as_str().to_string()));
        }
        let deleted_dir = self.data_dir.join(DELETED_DIR);
        self.locks.with_lock(id.as_str(), || -> Result<()> {
            if json_path.exists() {
                crate::fsutil::move_with_collision_suffix(&json_path, &deleted_dir)?;
            }
            if md_path.exists() {
                crate::fsutil::move_with_collision_suffix(&md_path, &deleted_dir)?;
            }
            Ok(())
        })?;
        self.events.emit(PageEvent::Remove(id));
        Ok(())
    }

    /// Read just the front matter, distinguishing `NotFound` from I/O
    /// failure.
    ///
    /// # Errors
    /// Returns [`PageError::NotFound`] if the page does not exist.
    pub fn read_front_matter(&self, raw_id: &str) -> Result<(Identifier, FrontMatter)> {
        let page = self.open(raw_id)?;
        if page.is_new {
            return Err(PageError::NotFound(page.identifier.as_str().to_string()));
        }
        Ok((page.identifier, page.front_matter))
    }

    /// Read just the markdown body.
    ///
    /// # Errors
    /// Returns [`PageError::NotFound`] if the page does not exist.
    pub fn read_markdown(&self, raw_id: &str) -> Result<(Identifier, String)> {
        let page = self.open(raw_id)?;
        if page.is_new {
            return Err(PageError::NotFound(page.identifier.as_str().to_string()));
        }
        Ok((page.identifier, page.versioned_text.current))
    }

    /// Enumerate logical identifiers by decoding base32 filenames, skipping
    /// non-page files and the `__deleted__` directory.
    ///
    /// # Errors
    /// Returns [`PageError::Io`] if the data directory cannot be read.
    pub fn list(&self) -> Result<Vec<Identifier>> {
        if !self.data_dir.exists() {
            return Ok(Vec::new());
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let Some(ext) = path.extension().and_then(|s| s.to_str()) else { continue };
            if ext != "json" && ext != "md" {
                continue;
            }
            let Ok(raw) = identifier::decode_on_disk(stem) else { continue };
            let Ok(id) = identifier::munge(&raw) else { continue };
            if seen.insert(id.as_str().to_string()) {
                out.push(id);
            }
        }
        out.sort();
        Ok(out)
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_missing_page_is_new() {
        let dir = tempdir().unwrap();
        let store = PageStore::without_events(dir.path());
        let page = store.open("hammer").unwrap();
        assert!(page.is_new);
    }

    #[test]
    fn save_then_open_round_trips_front_matter_and_body() {
        let dir = tempdir().unwrap();
        let store = PageStore::without_events(dir.path());
        let mut page = store.open("Tool Box").unwrap();
        page.set_body("# Tool Box".to_string(), Utc::now());
        page.front_matter.set_top("inventory", Value::Map({
            let mut m = FrontMatter::new();
            m.set_top("is_container", Value::Bool(true));
            m
        }));
        store.save(page).unwrap();

        let reopened = store.open("tool_box").unwrap();
        assert!(!reopened.is_new);
        assert_eq!(reopened.versioned_text.current, "# Tool Box");
        assert_eq!(reopened.front_matter.get_path("identifier").unwrap().as_str(), Some("tool_box"));
    }

    #[test]
    fn delete_moves_both_files_into_deleted_dir() {
        let dir = tempdir().unwrap();
        let store = PageStore::without_events(dir.path());
        let mut page = store.open("hammer").unwrap();
        page.set_body("# Hammer".to_string(), Utc::now());
        store.save(page).unwrap();

        store.delete("hammer").unwrap();
        let reopened = store.open("hammer").unwrap();
        assert!(reopened.is_new);

        let key = identifier::encode_on_disk("hammer");
        assert!(dir.path().join(DELETED_DIR).join(format!("{key}.json")).exists());
        assert!(dir.path().join(DELETED_DIR).join(format!("{key}.md")).exists());
    }

    #[test]
    fn delete_missing_page_is_not_found() {
        let dir = tempdir().unwrap();
        let store = PageStore::without_events(dir.path());
        let err = store.delete("nope").unwrap_err();
        assert!(matches!(err, PageError::NotFound(_)));
    }

    #[test]
    fn list_skips_deleted_dir_and_decodes_identifiers() {
        let dir = tempdir().unwrap();
        let store = PageStore::without_events(dir.path());
        for name in ["hammer", "screwdriver"] {
            let mut page = store.open(name).unwrap();
            page.set_body(format!("# {name}"), Utc::now());
            store.save(page).unwrap();
        }
        store.delete("hammer").unwrap();
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|i| i.as_str().to_string()).collect();
        assert_eq!(ids, vec!["screwdriver".to_string()]);
    }
}
