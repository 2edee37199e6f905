//! Identifier codec (C1): munging, base32 on-disk keys, and the
//! self-collision guard used by the shadowing migration.

use data_encoding::BASE32;
use unicode_normalization::UnicodeNormalization;

use crate::errors::{PageError, Result};

/// A canonical munged identifier. Equality between two `Identifier`s implies
/// their munged forms are equal, per spec §3.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize a raw identifier to its canonical munged form: NFKC, a `_`
/// inserted at each camelCase/PascalCase boundary (lower-or-digit followed
/// by upper, or an acronym run followed by a new word), lowercase, each
/// maximal run of non-`[a-z0-9]` characters collapsed to a single `_`,
/// leading/trailing `_` stripped.
///
/// # Errors
/// Returns [`PageError::InvalidIdentifier`] if the result is empty or
/// consists solely of underscores.
pub fn munge(raw: &str) -> Result<Identifier> {
    let normalized: String = raw.nfkc().collect();
    let chars: Vec<char> = normalized.chars().collect();
    let mut out = String::with_capacity(normalized.len() + 4);
    let mut pending_underscore = false;
    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_ascii_alphanumeric() {
            let case_boundary = ch.is_ascii_uppercase()
                && i > 0
                && {
                    let prev = chars[i - 1];
                    let next_lower = chars.get(i + 1).is_some_and(char::is_ascii_lowercase);
                    prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower)
                };
            if !out.is_empty() && (pending_underscore || case_boundary) {
                out.push('_');
            }
            pending_underscore = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_underscore = true;
        }
    }
    if out.is_empty() {
        return Err(PageError::InvalidIdentifier(raw.to_string()));
    }
    Ok(Identifier(out))
}

/// True iff `raw` is not already in canonical munged form.
///
/// # Errors
/// Returns [`PageError::InvalidIdentifier`] under the same conditions as
/// [`munge`].
pub fn needs_migration(raw: &str) -> Result<bool> {
    Ok(munge(raw)?.as_str() != raw)
}

/// Base32-encode the lowercased identifier using standard padded RFC-4648,
/// matching "accept the codec's default padding" in spec §4.1.
#[must_use]
pub fn encode_on_disk(id: &str) -> String {
    BASE32.encode(id.to_lowercase().as_bytes())
}

/// Decode a base32 on-disk key back to the lowercased identifier bytes it
/// was derived from. Accepts legacy unpadded input by trying a padded retry.
///
/// # Errors
/// Returns [`PageError::InvalidIdentifier`] if `key` is not valid base32 or
/// does not decode to valid UTF-8.
pub fn decode_on_disk(key: &str) -> Result<String> {
    let bytes = BASE32
        .decode(key.as_bytes())
        .or_else(|_| {
            let mut padded = key.to_string();
            while padded.len() % 8 != 0 {
                padded.push('=');
            }
            BASE32.decode(padded.as_bytes())
        })
        .map_err(|e| PageError::InvalidIdentifier(format!("{key}: {e}")))?;
    String::from_utf8(bytes).map_err(|e| PageError::InvalidIdentifier(format!("{key}: {e}")))
}

/// True iff renaming `raw` to its munged form is safe to perform — i.e. the
/// two identifiers encode to *different* on-disk filenames. If the base32
/// forms are equal, the rename would overwrite itself and must be skipped.
///
/// # Errors
/// Returns [`PageError::InvalidIdentifier`] if `raw` cannot be munged.
pub fn safe_to_collapse(raw: &str) -> Result<bool> {
    let munged = munge(raw)?;
    Ok(encode_on_disk(raw) != encode_on_disk(munged.as_str()))
}
