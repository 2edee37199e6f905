//! The `Page` aggregate (spec §3): identifier, versioned body, front matter,
//! lock state, and last-edit timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;
use crate::page::front_matter::FrontMatter;
use crate::page::history::VersionedText;

/// The subset of on-disk `.json` fields unrelated to front matter or text
/// history (spec §6: `is_locked`, `unlocked_for`, `passphrase_to_unlock`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockState {
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub unlocked_for: Option<String>,
    #[serde(default)]
    pub passphrase_to_unlock: Option<String>,
}

/// On-disk shape of the `.json` sidecar. Kept separate from [`Page`] so
/// serde's field order/defaults mirror spec §6 exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageJson {
    pub identifier: String,
    pub text: VersionedText,
    #[serde(flatten)]
    pub lock_state: LockState,
    pub last_edit_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub front_matter: FrontMatter,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub identifier: Identifier,
    pub versioned_text: VersionedText,
    pub front_matter: FrontMatter,
    pub lock_state: LockState,
    pub last_edit_at: Option<DateTime<Utc>>,
    /// True if this page has never been saved — `open` never fails for a
    /// well-formed id, it returns a zero-valued page with this set instead.
    pub is_new: bool,
}

impl Page {
    #[must_use]
    pub fn new_empty(identifier: Identifier) -> Self {
        Self {
            identifier,
            versioned_text: VersionedText::default(),
            front_matter: FrontMatter::new(),
            lock_state: LockState::default(),
            last_edit_at: None,
            is_new: true,
        }
    }

    /// Set the body, snapshotting the previous body into history if it
    /// actually changes.
    pub fn set_body(&mut self, new_body: String, at: DateTime<Utc>) {
        if self.versioned_text.current != new_body {
            self.versioned_text.push_snapshot(at, new_body);
        }
        self.last_edit_at = Some(at);
        self.is_new = false;
    }

    #[must_use]
    pub fn into_json_repr(self) -> PageJson {
        PageJson {
            identifier: self.identifier.as_str().to_string(),
            text: self.versioned_text,
            lock_state: self.lock_state,
            last_edit_at: self.last_edit_at,
            front_matter: self.front_matter,
        }
    }
}
