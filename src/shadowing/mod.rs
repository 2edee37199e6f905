//! The shadowing-migration engine (C7): one scan job that short-lists
//! legacy non-canonical identifiers, and one migration job per identifier
//! that reconciles the shadowed pair onto the canonical munged id (spec
//! §4.7).

use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{PageError, Result};
use crate::identifier;
use crate::page::{PageJson, PageStore};
use crate::queue::{Coordinator, Job};

pub const SHADOWING_QUEUE: &str = "shadowing";

/// Reads every `.json` in the store's data directory and enqueues one
/// [`MigrationJob`] per short-listed raw identifier.
pub struct ScanJob {
    store: Arc<PageStore>,
    coordinator: Coordinator,
}

impl ScanJob {
    #[must_use]
    pub fn new(store: Arc<PageStore>, coordinator: Coordinator) -> Self {
        Self { store, coordinator }
    }

    fn shortlist(&self) -> Result<Vec<String>> {
        let data_dir = self.store.data_dir();
        if !data_dir.exists() {
            return Ok(Vec::new());
        }
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for entry in std::fs::read_dir(data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(&path) else { continue };
            let Ok(parsed) = serde_json::from_str::<PageJson>(&text) else { continue };
            let raw = parsed.identifier;
            let Ok(needs) = identifier::needs_migration(&raw) else { continue };
            let Ok(safe) = identifier::safe_to_collapse(&raw) else { continue };
            if needs && safe && seen.insert(raw.clone()) {
                out.push(raw);
            }
        }
        out.sort();
        Ok(out)
    }
}

impl Job for ScanJob {
    fn name(&self) -> String {
        SHADOWING_QUEUE.to_string()
    }

    fn execute(&self) -> Result<()> {
        self.coordinator.register_queue(SHADOWING_QUEUE);
        for raw in self.shortlist()? {
            let store = self.store.clone();
            self.coordinator.enqueue(SHADOWING_QUEUE, Box::new(MigrationJob::new(store, raw)))?;
        }
        Ok(())
    }
}

/// Reconciles the shadowed pair for a single non-canonical raw identifier
/// `R` onto its canonical munged form `M`.
pub struct MigrationJob {
    store: Arc<PageStore>,
    raw: String,
}

impl MigrationJob {
    #[must_use]
    pub fn new(store: Arc<PageStore>, raw: String) -> Self {
        Self { store, raw }
    }

    fn raw_paths(&self) -> (PathBuf, PathBuf) {
        let key = identifier::encode_on_disk(&self.raw);
        let data_dir = self.store.data_dir();
        (data_dir.join(format!("{key}.json")), data_dir.join(format!("{key}.md")))
    }
}

impl Job for MigrationJob {
    fn name(&self) -> String {
        format!("migrate:{}", self.raw)
    }

    fn execute(&self) -> Result<()> {
        let munged = identifier::munge(&self.raw)?;
        if identifier::encode_on_disk(&self.raw) == identifier::encode_on_disk(munged.as_str()) {
            // Self-collision: renaming would overwrite the same file. Silent skip (spec §7).
            return Ok(());
        }

        let (raw_json, raw_md) = self.raw_paths();
        if !raw_json.exists() && !raw_md.exists() {
            return Err(PageError::NotFound(format!("no PascalCase files found for identifier '{}'", self.raw)));
        }
        let raw_body = if raw_md.exists() {
            std::fs::read_to_string(&raw_md)?
        } else if raw_json.exists() {
            let text = std::fs::read_to_string(&raw_json)?;
            serde_json::from_str::<PageJson>(&text)?.text.current
        } else {
            String::new()
        };

        let canonical_page = self.store.open(munged.as_str())?;
        let canonical_body = canonical_page.versioned_text.current.clone();
        let shadowing = !canonical_body.is_empty();
        let chosen_body = if shadowing {
            if raw_body.len() > canonical_body.len() { raw_body } else { canonical_body }
        } else {
            raw_body
        };

        // Soft-delete R first: prevents data loss when R and M happen to
        // share a base32 key for case-only differences (spec §4.7).
        let deleted_dir = self.store.data_dir().join("__deleted__");
        if raw_json.exists() {
            crate::fsutil::move_with_collision_suffix(&raw_json, &deleted_dir)?;
        }
        if raw_md.exists() {
            crate::fsutil::move_with_collision_suffix(&raw_md, &deleted_dir)?;
        }

        let mut page = self.store.open(munged.as_str())?;
        page.set_body(chosen_body, Utc::now());
        self.store.save(page)?;
        Ok(())
    }
}
