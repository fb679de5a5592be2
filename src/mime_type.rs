//! MIME type handle and per-type metadata records.
//!
//! A [`MimeType`] is a cheap, immutable handle identified by its canonical
//! name (e.g. `"text/plain"`). Equality and hashing are by name only; the
//! associated metadata (comments, icons, glob patterns) lives in the
//! providers and is queried through the database.

use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The fallback type returned when nothing else matches.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// The type reported for directories (file names with a trailing `/`).
pub const DIRECTORY_MIME_TYPE: &str = "inode/directory";

/// The type reported for plain text detected by the content heuristic.
pub const TEXT_MIME_TYPE: &str = "text/plain";

/// The type reported for zero-length content, when the database knows it.
pub const ZEROSIZE_MIME_TYPE: &str = "application/x-zerosize";

/// An immutable MIME type handle.
///
/// Multiple providers may claim knowledge of the same name; the handle does
/// not belong to any of them. An *invalid* handle (empty name) is the
/// explicit "not found" sentinel, never a panic or a null.
///
/// # Example
///
/// ```
/// use mimey::MimeDatabase;
///
/// let db = MimeDatabase::new();
/// let mime = db.mime_type_for_name("no-such/type");
/// assert!(!mime.is_valid());
/// ```
#[derive(Debug, Clone, Eq)]
pub struct MimeType {
    name: String,
}

impl MimeType {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        MimeType { name: name.into() }
    }

    pub(crate) fn invalid() -> Self {
        MimeType {
            name: String::new(),
        }
    }

    /// The canonical name, e.g. `"image/png"`. Empty for an invalid handle.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this handle refers to a real type (non-empty name).
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }

    /// Whether this is the default fallback type, `application/octet-stream`.
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_MIME_TYPE
    }

    /// Conventional generic icon name derived from the media part,
    /// e.g. `"image-x-generic"` for `image/png`. Used by callers when no
    /// provider supplies an explicit `generic-icon`.
    pub fn generic_icon_fallback(&self) -> Option<String> {
        let (media, _) = self.name.split_once('/')?;
        Some(format!("{}-x-generic", media))
    }
}

impl PartialEq for MimeType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Hash for MimeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialEq<str> for MimeType {
    fn eq(&self, other: &str) -> bool {
        self.name == other
    }
}

impl PartialEq<&str> for MimeType {
    fn eq(&self, other: &&str) -> bool {
        self.name == *other
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Per-type metadata as assembled from definition files.
///
/// Providers keep one record per type name. For the binary cache provider
/// the record is filled lazily from the companion XML snippet on first
/// access; for the XML provider it is built eagerly during parsing.
#[derive(Debug, Clone, Default)]
pub(crate) struct MimeTypeData {
    pub name: String,
    /// Comment text keyed by locale; the key `"default"` holds the
    /// untranslated comment.
    pub locale_comments: FxHashMap<String, String>,
    pub icon_name: Option<String>,
    pub generic_icon_name: Option<String>,
    /// Raw glob pattern strings, for enumeration. The first pattern
    /// starting with `*` is promoted to the front after parsing.
    pub glob_patterns: Vec<String>,
    pub has_glob_delete_all: bool,
    /// Whether lazy extras have been loaded (binary cache provider only).
    pub loaded: bool,
}

impl MimeTypeData {
    pub fn new(name: impl Into<String>) -> Self {
        MimeTypeData {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Look up a comment with locale fallback: `pt_BR` falls back to `pt`,
    /// then to the untranslated `default` entry.
    pub fn comment_for_locale(&self, locale: &str) -> Option<&str> {
        if let Some(text) = self.locale_comments.get(locale) {
            return Some(text);
        }
        if let Some((lang, _)) = locale.split_once('_') {
            if let Some(text) = self.locale_comments.get(lang) {
                return Some(text);
            }
        }
        self.locale_comments.get("default").map(String::as_str)
    }

    /// Move the first pattern starting with `*` to the front of the raw
    /// pattern list. The glob file shipped with a mime directory does not
    /// guarantee that the primary pattern comes first.
    pub fn promote_primary_pattern(&mut self) {
        if let Some(pos) = self.glob_patterns.iter().position(|p| p.starts_with('*')) {
            if pos > 0 {
                let primary = self.glob_patterns.remove(pos);
                self.glob_patterns.insert(0, primary);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_by_name_only() {
        let a = MimeType::new("text/plain");
        let b = MimeType::new("text/plain");
        let c = MimeType::new("text/html");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, "text/plain");
    }

    #[test]
    fn test_invalid_sentinel() {
        let invalid = MimeType::invalid();
        assert!(!invalid.is_valid());
        assert!(!invalid.is_default());
        assert_eq!(invalid.name(), "");
    }

    #[test]
    fn test_default_type() {
        let mime = MimeType::new(DEFAULT_MIME_TYPE);
        assert!(mime.is_valid());
        assert!(mime.is_default());
    }

    #[test]
    fn test_generic_icon_fallback() {
        let mime = MimeType::new("image/png");
        assert_eq!(mime.generic_icon_fallback().unwrap(), "image-x-generic");
        assert_eq!(MimeType::invalid().generic_icon_fallback(), None);
    }

    #[test]
    fn test_comment_locale_fallback() {
        let mut data = MimeTypeData::new("text/plain");
        data.locale_comments
            .insert("default".to_string(), "Plain text".to_string());
        data.locale_comments
            .insert("pt".to_string(), "Texto simples".to_string());

        assert_eq!(data.comment_for_locale("pt_BR").unwrap(), "Texto simples");
        assert_eq!(data.comment_for_locale("pt").unwrap(), "Texto simples");
        assert_eq!(data.comment_for_locale("de").unwrap(), "Plain text");
    }

    #[test]
    fn test_promote_primary_pattern() {
        let mut data = MimeTypeData::new("application/x-tar");
        data.glob_patterns = vec!["notes.tar".to_string(), "*.tar".to_string()];
        data.promote_primary_pattern();
        assert_eq!(data.glob_patterns, vec!["*.tar", "notes.tar"]);
    }
}
