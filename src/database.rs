//! The mime database: an ordered stack of providers behind one lock.
//!
//! Providers are ordered by precedence: in-memory definitions registered at
//! runtime (newest first), then the configured mime directories in order.
//! A type defined by an earlier provider completely shadows later
//! definitions of the same name, including their globs and magic rules.
//!
//! File name and content matching are separate passes; when the file name
//! alone is ambiguous, content sniffing disambiguates. See
//! [`MimeDatabase::mime_type_for_file_name_and_data`].

use crate::binary_provider::BinaryProvider;
use crate::glob_match::GlobMatchResult;
use crate::mime_type::{
    MimeType, MimeTypeData, DEFAULT_MIME_TYPE, DIRECTORY_MIME_TYPE, TEXT_MIME_TYPE,
    ZEROSIZE_MIME_TYPE,
};
use crate::provider::MimeProvider;
use crate::xml_provider::XmlProvider;
use crate::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// How much of a file's head content sniffing looks at.
const SNIFF_BUFFER_SIZE: usize = 16 * 1024;

/// One registered in-memory definition document.
struct Definition {
    id: String,
    data: Vec<u8>,
}

struct DbState {
    cache_dirs: Vec<PathBuf>,
    /// Newest registration first; all precede the cache directories.
    definitions: Vec<Definition>,
    providers: Vec<Box<dyn MimeProvider>>,
    /// Per-provider exclusion set: the names defined by all providers
    /// before it. Rebuilt together with the provider list.
    exclusions: Vec<FxHashSet<String>>,
    stale: bool,
}

/// The MIME type resolution database.
///
/// Cheap to query concurrently from multiple threads; all state sits
/// behind one coarse mutex, which is sufficient because queries are pure
/// lookups after the initial load.
///
/// # Example
///
/// ```
/// use mimey::MimeDatabase;
///
/// let db = MimeDatabase::with_cache_dirs(Vec::new());
/// db.add_definition_data(
///     "builtin",
///     br#"<mime-info>
///       <mime-type type="image/png">
///         <glob pattern="*.png"/>
///         <magic><match type="string" value="\x89PNG" offset="0"/></magic>
///       </mime-type>
///     </mime-info>"#,
/// )?;
/// assert_eq!(db.mime_type_for_file_name("shot.PNG"), ["image/png"]);
/// assert_eq!(db.mime_type_for_data(b"\x89PNG\r\n\x1a\n").0.name(), "image/png");
/// # Ok::<(), mimey::MimeError>(())
/// ```
pub struct MimeDatabase {
    state: Mutex<DbState>,
}

impl MimeDatabase {
    /// Creates a database over the standard XDG mime directories:
    /// `$XDG_DATA_HOME/mime` followed by each entry of `$XDG_DATA_DIRS`
    /// (with the usual fallbacks when unset).
    pub fn new() -> Self {
        MimeDatabase::with_cache_dirs(default_cache_dirs())
    }

    /// Creates a database over an explicit list of mime directories, in
    /// decreasing precedence. Each directory may carry a compiled
    /// `mime.cache`; directories without one are loaded from their
    /// `packages/*.xml` sources.
    pub fn with_cache_dirs(cache_dirs: Vec<PathBuf>) -> Self {
        MimeDatabase {
            state: Mutex::new(DbState {
                cache_dirs,
                definitions: Vec::new(),
                providers: Vec::new(),
                exclusions: Vec::new(),
                stale: true,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DbState> {
        // a poisoned lock only means another thread panicked mid-query;
        // the state itself is still consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers an in-memory definition document. It takes precedence
    /// over every directory and over previously registered documents.
    /// Registering again under the same id replaces the old document.
    ///
    /// # Errors
    ///
    /// Returns a parse error when `data` is not a valid definition
    /// document; the database is left unchanged.
    pub fn add_definition_data(&self, id: &str, data: &[u8]) -> Result<()> {
        // validate before touching any state
        XmlProvider::from_data(id, data)?;
        let mut state = self.lock();
        state.purge_provider(id);
        state.definitions.retain(|d| d.id != id);
        state.definitions.insert(
            0,
            Definition {
                id: id.to_string(),
                data: data.to_vec(),
            },
        );
        state.stale = true;
        Ok(())
    }

    /// Unregisters a definition document. Returns whether it existed.
    pub fn remove_definition_data(&self, id: &str) -> bool {
        let mut state = self.lock();
        let before = state.definitions.len();
        state.definitions.retain(|d| d.id != id);
        let removed = state.definitions.len() != before;
        if removed {
            state.purge_provider(id);
            state.stale = true;
        }
        removed
    }

    /// Forces a rebuild on the next query: directory providers re-check
    /// their backing files and pick up changes.
    pub fn reload(&self) {
        self.lock().stale = true;
    }

    /// The type registered under `name` or under an alias of it; an
    /// invalid handle when no provider recognizes either. The first
    /// provider in order that declares the alias decides the canonical
    /// name.
    pub fn mime_type_for_name(&self, name: &str) -> MimeType {
        let mut state = self.lock();
        state.ensure();
        let canonical = state.resolve_alias(name);
        if state.knows(&canonical) {
            MimeType::new(canonical)
        } else {
            MimeType::invalid()
        }
    }

    /// Matches on the file name alone, returning every candidate at the
    /// best weight and pattern length, sorted by name for determinism.
    /// The list may be empty; a trailing `/` yields `inode/directory`.
    pub fn mime_type_for_file_name(&self, file_name: &str) -> Vec<MimeType> {
        if file_name.ends_with('/') {
            return vec![MimeType::new(DIRECTORY_MIME_TYPE)];
        }
        let mut state = self.lock();
        state.ensure();
        state
            .find_by_file_name(file_name)
            .sorted_matching_mime_types()
            .into_iter()
            .map(MimeType::new)
            .collect()
    }

    /// Matches on content alone: magic rules first, then the plain-text
    /// heuristic, then the default type. The second element is the
    /// accuracy of the answer, from 0 (nothing matched) to 100.
    pub fn mime_type_for_data(&self, data: &[u8]) -> (MimeType, i32) {
        let mut state = self.lock();
        state.ensure();
        match state.find_by_data(data) {
            (Some(name), accuracy) => (MimeType::new(name), accuracy),
            (None, _) => (MimeType::new(DEFAULT_MIME_TYPE), 0),
        }
    }

    /// Matches on the file name, disambiguating with content when needed.
    /// The second element is the accuracy of the answer, from 0 (default
    /// fallback) to 100 (unambiguous).
    ///
    /// Glob patterns are evaluated first; a unique match at the top
    /// weight wins outright at accuracy 100. Otherwise the content is
    /// sniffed (at most the first 16 KiB are considered), and a magic hit
    /// that is, or is an ancestor of, one of the name candidates settles
    /// the tie at accuracy 100. With conflicting name candidates and no
    /// deciding magic, the lexicographically smallest candidate is
    /// returned at accuracy 20, keeping results deterministic.
    pub fn mime_type_for_file_name_and_data(
        &self,
        file_name: &str,
        data: &[u8],
    ) -> (MimeType, i32) {
        if file_name.ends_with('/') {
            return (MimeType::new(DIRECTORY_MIME_TYPE), 100);
        }
        let mut state = self.lock();
        state.ensure();

        let by_name = state.find_by_file_name(file_name);
        if by_name.matching_mime_types().len() == 1 {
            let name = by_name.matching_mime_types()[0].clone();
            if state.knows(&name) {
                return (MimeType::new(name), 100);
            }
        }

        let data = &data[..data.len().min(SNIFF_BUFFER_SIZE)];
        let (sniffed, accuracy) = state.find_by_data(data);
        if let Some(sniffed) = sniffed {
            if accuracy > 0 {
                if by_name.matching_mime_types().iter().any(|m| *m == sniffed) {
                    return (MimeType::new(sniffed), 100);
                }
                for name in by_name.matching_mime_types().to_vec() {
                    if state.inherits(&name, &sniffed) {
                        // magic and pattern agree through inheritance
                        return (MimeType::new(name), 100);
                    }
                }
                if by_name.all_matching_mime_types().is_empty() {
                    return (MimeType::new(sniffed), accuracy);
                }
            }
        }

        for name in by_name.sorted_matching_mime_types() {
            if state.knows(&name) {
                return (MimeType::new(name), 20);
            }
        }
        (MimeType::new(DEFAULT_MIME_TYPE), 0)
    }

    /// All ancestors of `name`, breadth first: direct parents before
    /// grandparents, so the least specific type comes last. Cycle-safe.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut state = self.lock();
        state.ensure();
        let canonical = state.resolve_alias(name);
        let mut all = Vec::new();
        let mut to_visit = vec![canonical];
        let mut next = 0;
        while next < to_visit.len() {
            let current = to_visit[next].clone();
            next += 1;
            for parent in state.parents_of(&current) {
                if !all.contains(&parent) {
                    all.push(parent.clone());
                    to_visit.push(parent);
                }
            }
        }
        all
    }

    /// The direct parents declared via `sub-class-of`.
    pub fn parents(&self, name: &str) -> Vec<String> {
        let mut state = self.lock();
        state.ensure();
        let canonical = state.resolve_alias(name);
        state.parents_of(&canonical)
    }

    /// The alias names declared for canonical `name`.
    pub fn aliases(&self, name: &str) -> Vec<String> {
        let mut state = self.lock();
        state.ensure();
        let mut aliases = Vec::new();
        for provider in state.providers.iter_mut() {
            provider.add_aliases(name, &mut aliases);
        }
        aliases
    }

    /// Whether `name` is, or descends from, `ancestor`. Both sides are
    /// alias-resolved; a type inherits from itself.
    pub fn inherits(&self, name: &str, ancestor: &str) -> bool {
        let mut state = self.lock();
        state.ensure();
        let name = state.resolve_alias(name);
        state.inherits(&name, ancestor)
    }

    /// Every defined type, in no particular order.
    pub fn all_mime_types(&self) -> Vec<MimeType> {
        let mut state = self.lock();
        state.ensure();
        let mut names = Vec::new();
        for provider in state.providers.iter_mut() {
            provider.add_all_mime_types(&mut names);
        }
        names.into_iter().map(MimeType::new).collect()
    }

    /// The complete suffix a glob match knows about, without the leading
    /// dot: `"tar.gz"` for `archive.tar.gz` when `*.tar.gz` is defined.
    pub fn suffix_for_file_name(&self, file_name: &str) -> Option<String> {
        let mut state = self.lock();
        state.ensure();
        let result = state.find_by_file_name(file_name);
        let length = result.known_suffix_length();
        if length == 0 {
            return None;
        }
        let chars: Vec<char> = file_name.chars().collect();
        Some(chars[chars.len() - length..].iter().collect())
    }

    /// The localized description of `name`. `locale` falls back from
    /// `pt_BR` to `pt` to the untranslated text.
    pub fn comment(&self, name: &str, locale: &str) -> Option<String> {
        let mut state = self.lock();
        state.ensure();
        let data = state.load_data(name)?;
        data.comment_for_locale(locale).map(str::to_string)
    }

    /// The icon for `name`: the declared one, or the conventional
    /// `media-subtype` form with the slash replaced by a dash.
    pub fn icon_name(&self, name: &str) -> Option<String> {
        let mut state = self.lock();
        state.ensure();
        if !state.knows(name) {
            return None;
        }
        for provider in state.providers.iter_mut() {
            if let Some(icon) = provider.icon_name(name) {
                return Some(icon);
            }
        }
        let data = state.load_data(name);
        if let Some(icon) = data.and_then(|d| d.icon_name) {
            return Some(icon);
        }
        Some(name.replacen('/', "-", 1))
    }

    /// The generic icon for `name`: the declared one, or the
    /// `media-x-generic` fallback.
    pub fn generic_icon_name(&self, name: &str) -> Option<String> {
        let mut state = self.lock();
        state.ensure();
        if !state.knows(name) {
            return None;
        }
        for provider in state.providers.iter_mut() {
            if let Some(icon) = provider.generic_icon_name(name) {
                return Some(icon);
            }
        }
        let data = state.load_data(name);
        if let Some(icon) = data.and_then(|d| d.generic_icon_name) {
            return Some(icon);
        }
        MimeType::new(name).generic_icon_fallback()
    }

    /// The raw glob patterns declared for `name`, primary pattern first.
    pub fn glob_patterns(&self, name: &str) -> Vec<String> {
        let mut state = self.lock();
        state.ensure();
        match state.load_data(name) {
            Some(data) => data.glob_patterns,
            None => Vec::new(),
        }
    }
}

impl Default for MimeDatabase {
    fn default() -> Self {
        MimeDatabase::new()
    }
}

impl DbState {
    fn ensure(&mut self) {
        if self.stale {
            self.rebuild();
        }
    }

    /// Drops the provider registered under `key` so a rebuild cannot
    /// reuse it.
    fn purge_provider(&mut self, key: &str) {
        self.providers.retain(|p| p.key() != key);
    }

    fn rebuild(&mut self) {
        let mut reusable: FxHashMap<String, Box<dyn MimeProvider>> =
            std::mem::take(&mut self.providers)
                .into_iter()
                .map(|p| (p.key().to_string(), p))
                .collect();

        let mut providers: Vec<Box<dyn MimeProvider>> = Vec::new();
        for definition in &self.definitions {
            match reusable.remove(&definition.id) {
                Some(provider) => providers.push(provider),
                None => match XmlProvider::from_data(&definition.id, &definition.data) {
                    Ok(provider) => providers.push(Box::new(provider)),
                    // validated at registration; only a logic error gets here
                    Err(e) => warn!(id = %definition.id, "skipping definition: {}", e),
                },
            }
        }
        for dir in &self.cache_dirs {
            let key = dir.display().to_string();
            if let Some(mut provider) = reusable.remove(&key) {
                provider.ensure_loaded();
                if provider.is_valid() {
                    providers.push(provider);
                    continue;
                }
                // the cache went away; fall through to a fresh load
            }
            let binary = BinaryProvider::new(dir);
            if binary.is_valid() {
                providers.push(Box::new(binary));
            } else {
                providers.push(Box::new(XmlProvider::from_directory(dir)));
            }
        }

        let mut seen = FxHashSet::default();
        self.exclusions = providers
            .iter_mut()
            .map(|provider| {
                let excluded = seen.clone();
                provider.collect_defined_names(&mut seen);
                excluded
            })
            .collect();
        self.providers = providers;
        self.stale = false;
    }

    fn knows(&mut self, name: &str) -> bool {
        self.providers
            .iter_mut()
            .any(|provider| provider.knows_mime_type(name))
    }

    fn resolve_alias(&mut self, name: &str) -> String {
        for provider in self.providers.iter_mut() {
            if let Some(canonical) = provider.resolve_alias(name) {
                return canonical;
            }
        }
        name.to_string()
    }

    fn parents_of(&mut self, name: &str) -> Vec<String> {
        let mut parents = Vec::new();
        for provider in self.providers.iter_mut() {
            provider.add_parents(name, &mut parents);
        }
        parents
    }

    fn inherits(&mut self, name: &str, ancestor: &str) -> bool {
        let ancestor = self.resolve_alias(ancestor);
        let mut to_check = vec![name.to_string()];
        let mut visited = FxHashSet::default();
        while let Some(current) = to_check.pop() {
            if current == ancestor {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            for parent in self.parents_of(&current) {
                to_check.push(self.resolve_alias(&parent));
            }
        }
        false
    }

    fn find_by_file_name(&mut self, file_name: &str) -> GlobMatchResult {
        let mut result = GlobMatchResult::new();
        for (i, provider) in self.providers.iter_mut().enumerate() {
            provider.add_file_name_matches(file_name, &mut result, &self.exclusions[i]);
        }
        result
    }

    /// Content-only match: `(candidate, accuracy)`. Zero-length content
    /// maps to `application/x-zerosize` when the database defines it; a
    /// magic miss falls back to the plain-text heuristic at low accuracy.
    fn find_by_data(&mut self, data: &[u8]) -> (Option<String>, i32) {
        if data.is_empty() {
            if self.knows(ZEROSIZE_MIME_TYPE) {
                return (Some(ZEROSIZE_MIME_TYPE.to_string()), 100);
            }
            return (None, 0);
        }
        let mut accuracy = 0;
        let mut candidate = None;
        for (i, provider) in self.providers.iter_mut().enumerate() {
            provider.find_by_magic(data, &mut accuracy, &mut candidate, &self.exclusions[i]);
        }
        if candidate.is_some() {
            return (candidate, accuracy);
        }
        if looks_like_text(data) {
            return (Some(TEXT_MIME_TYPE.to_string()), 5);
        }
        (None, 0)
    }

    /// Loads the metadata record from the first provider that defines the
    /// type: an overriding definition fully replaces the overridden one.
    fn load_data(&mut self, name: &str) -> Option<MimeTypeData> {
        let mut data = MimeTypeData::new(name);
        for provider in self.providers.iter_mut() {
            if provider.knows_mime_type(name) {
                provider.load_mime_type_data(&mut data);
                return Some(data);
            }
        }
        None
    }
}

/// The shared-mime-info plain text heuristic: a UTF-16 byte order mark, or
/// no control characters other than tab, newline and carriage return in
/// the first 128 bytes.
fn looks_like_text(data: &[u8]) -> bool {
    if data.starts_with(&[0xfe, 0xff]) || data.starts_with(&[0xff, 0xfe]) {
        return true;
    }
    data.iter()
        .take(128)
        .all(|&b| b >= 32 || b == 9 || b == 10 || b == 13)
}

fn default_cache_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let data_home = std::env::var_os("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")));
    if let Some(home) = data_home {
        dirs.push(home.join("mime"));
    }
    let data_dirs = std::env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "/usr/local/share:/usr/share".to_string());
    for dir in data_dirs.split(':').filter(|d| !d.is_empty()) {
        dirs.push(PathBuf::from(dir).join("mime"));
    }
    dirs
}
