//! Provider backed by a compiled `mime.cache` directory.
//!
//! The cache file packs every table the resolution engine needs: literal
//! file names, a reversed suffix tree for the common `*.ext` patterns, a
//! list of complex globs, magic match rules sorted by descending priority,
//! and sorted key/value lists for aliases, parents and icons. All lookups
//! walk the memory-mapped buffer directly; nothing is deserialized up
//! front.
//!
//! Two companion files supply what the cache leaves out: `<dir>/types`
//! lists every defined name (for enumeration and existence checks), and
//! `<dir>/<media>/<subtype>.xml` holds the per-type extras (comments,
//! icons, raw glob patterns), parsed lazily on first access.

use crate::cache_buffer::{
    CacheBuffer, POS_ALIAS_LIST, POS_GENERIC_ICONS_LIST, POS_GLOB_LIST, POS_ICONS_LIST,
    POS_LITERAL_LIST, POS_MAGIC_LIST, POS_PARENT_LIST, POS_REVERSE_SUFFIX_TREE,
};
use crate::glob::{GlobPattern, MatchMode};
use crate::glob_match::GlobMatchResult;
use crate::magic;
use crate::mime_type::MimeTypeData;
use crate::provider::MimeProvider;
use crate::xml_parser;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

pub(crate) struct BinaryProvider {
    directory: PathBuf,
    key: String,
    cache: Option<CacheBuffer>,
    /// Modification time of `mime.cache` when it was mapped.
    mtime: Option<SystemTime>,
    mime_type_names: FxHashSet<String>,
    name_list_loaded: bool,
}

impl BinaryProvider {
    /// Maps `<directory>/mime.cache`. When the file is missing or
    /// malformed the provider reports itself invalid and the database
    /// falls back to parsing the directory's XML sources.
    pub(crate) fn new(directory: &Path) -> Self {
        let mut provider = BinaryProvider {
            directory: directory.to_path_buf(),
            key: directory.display().to_string(),
            cache: None,
            mtime: None,
            mime_type_names: FxHashSet::default(),
            name_list_loaded: false,
        };
        provider.remap();
        provider
    }

    fn cache_path(&self) -> PathBuf {
        self.directory.join("mime.cache")
    }

    fn remap(&mut self) {
        let path = self.cache_path();
        self.mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        self.cache = match CacheBuffer::open(&path) {
            Ok(cache) => Some(cache),
            Err(e) => {
                debug!(file = %path.display(), "no usable cache: {}", e);
                None
            }
        };
        self.mime_type_names.clear();
        self.name_list_loaded = false;
    }

    /// Loads the `types` companion file listing every defined name.
    fn ensure_name_list(&mut self) {
        if self.name_list_loaded {
            return;
        }
        self.name_list_loaded = true;
        let path = self.directory.join("types");
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                self.mime_type_names = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            Err(e) => debug!(file = %path.display(), "no type list: {}", e),
        }
    }
}

impl MimeProvider for BinaryProvider {
    fn key(&self) -> &str {
        &self.key
    }

    fn is_valid(&self) -> bool {
        self.cache.is_some()
    }

    fn ensure_loaded(&mut self) {
        let mtime = std::fs::metadata(self.cache_path())
            .and_then(|m| m.modified())
            .ok();
        if mtime != self.mtime {
            self.remap();
        }
    }

    fn knows_mime_type(&mut self, name: &str) -> bool {
        self.ensure_name_list();
        self.mime_type_names.contains(name)
    }

    fn collect_defined_names(&mut self, into: &mut FxHashSet<String>) {
        self.ensure_name_list();
        into.extend(self.mime_type_names.iter().cloned());
    }

    fn add_file_name_matches(
        &mut self,
        file_name: &str,
        result: &mut GlobMatchResult,
        excluded: &FxHashSet<String>,
    ) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let filter = |mime: &str| !excluded.contains(mime);

        // Stage 1: exact file names ("Makefile")
        if let Some(off) = cache.table_offset(POS_LITERAL_LIST) {
            match_glob_list(cache, off, file_name, result, &filter);
        }

        // Stage 2: the very common *.ext patterns, via the suffix tree.
        // One case-insensitive pass, then a case-sensitive pass for
        // patterns flagged as such.
        if result.matching_mime_types().is_empty() {
            if let Some(tree_off) = cache.table_offset(POS_REVERSE_SUFFIX_TREE) {
                if let (Some(n_roots), Some(first_root)) =
                    (cache.get_u32(tree_off), cache.get_u32(tree_off + 4))
                {
                    let lower: Vec<char> = file_name.to_lowercase().chars().collect();
                    if !lower.is_empty() {
                        match_suffix_tree(
                            cache,
                            result,
                            n_roots,
                            first_root as usize,
                            &lower,
                            lower.len() as isize - 1,
                            false,
                            &filter,
                        );
                    }
                    if result.matching_mime_types().is_empty() {
                        let original: Vec<char> = file_name.chars().collect();
                        if !original.is_empty() {
                            match_suffix_tree(
                                cache,
                                result,
                                n_roots,
                                first_root as usize,
                                &original,
                                original.len() as isize - 1,
                                true,
                                &filter,
                            );
                        }
                    }
                }
            }
        }

        // Stage 3: complex globs ("[0-9]*.part")
        if result.matching_mime_types().is_empty() {
            if let Some(off) = cache.table_offset(POS_GLOB_LIST) {
                match_glob_list(cache, off, file_name, result, &filter);
            }
        }
    }

    fn find_by_magic(
        &mut self,
        data: &[u8],
        accuracy: &mut i32,
        candidate: &mut Option<String>,
        excluded: &FxHashSet<String>,
    ) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let Some(magic_off) = cache.table_offset(POS_MAGIC_LIST) else {
            return;
        };
        let (Some(n_matches), Some(first_match)) =
            (cache.get_u32(magic_off), cache.get_u32(magic_off + 8))
        else {
            return;
        };
        // The table is sorted by descending priority, so the first hit is
        // this provider's best answer.
        for i in 0..n_matches as usize {
            let off = first_match as usize + 16 * i;
            let (Some(n_matchlets), Some(first_matchlet)) =
                (cache.get_u32(off + 8), cache.get_u32(off + 12))
            else {
                return;
            };
            if match_magic_rule(cache, n_matchlets, first_matchlet as usize, data) {
                let Some(mime) = cache
                    .get_u32(off + 4)
                    .and_then(|o| cache.get_str(o as usize))
                else {
                    return;
                };
                if excluded.contains(mime) {
                    continue;
                }
                let priority = cache.get_u32(off).unwrap_or(0) as i32;
                if priority > *accuracy {
                    *accuracy = priority;
                    *candidate = Some(mime.to_string());
                }
                return;
            }
        }
    }

    fn add_parents(&mut self, name: &str, parents: &mut Vec<String>) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let Some(list_off) = cache.table_offset(POS_PARENT_LIST) else {
            return;
        };
        let Some(entry_off) = find_pair_value(cache, list_off, name) else {
            return;
        };
        let Some(count) = cache.get_u32(entry_off) else {
            return;
        };
        for i in 0..count as usize {
            let Some(parent) = cache
                .get_u32(entry_off + 4 + 4 * i)
                .and_then(|o| cache.get_str(o as usize))
            else {
                return;
            };
            if !parents.iter().any(|p| p == parent) {
                parents.push(parent.to_string());
            }
        }
    }

    fn resolve_alias(&mut self, name: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        let list_off = cache.table_offset(POS_ALIAS_LIST)?;
        let value_off = find_pair_value(cache, list_off, name)?;
        cache.get_str(value_off).map(str::to_string)
    }

    fn add_aliases(&mut self, name: &str, aliases: &mut Vec<String>) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let Some(list_off) = cache.table_offset(POS_ALIAS_LIST) else {
            return;
        };
        let Some(count) = cache.get_u32(list_off) else {
            return;
        };
        // no reverse index; scan the whole sorted list
        for i in 0..count as usize {
            let off = list_off + 4 + 8 * i;
            let (Some(alias), Some(canonical)) = (
                cache.get_u32(off).and_then(|o| cache.get_str(o as usize)),
                cache
                    .get_u32(off + 4)
                    .and_then(|o| cache.get_str(o as usize)),
            ) else {
                return;
            };
            if canonical == name && !aliases.iter().any(|a| a == alias) {
                aliases.push(alias.to_string());
            }
        }
    }

    fn add_all_mime_types(&mut self, names: &mut Vec<String>) {
        self.ensure_name_list();
        for name in &self.mime_type_names {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }

    fn load_mime_type_data(&mut self, data: &mut MimeTypeData) -> bool {
        let known = self.knows_mime_type(&data.name);
        let path = self.directory.join(format!("{}.xml", data.name));
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                // extras are optional; the cache alone is a valid install
                data.loaded = true;
                return known;
            }
        };
        match xml_parser::parse(&bytes) {
            Ok(info) => {
                if let Some(parsed) = info.mime_types.into_iter().find(|m| m.name == data.name) {
                    data.locale_comments.extend(parsed.locale_comments);
                    if parsed.icon_name.is_some() {
                        data.icon_name = parsed.icon_name;
                    }
                    if parsed.generic_icon_name.is_some() {
                        data.generic_icon_name = parsed.generic_icon_name;
                    }
                    for pattern in parsed.glob_patterns {
                        if !data.glob_patterns.contains(&pattern) {
                            data.glob_patterns.push(pattern);
                        }
                    }
                    data.has_glob_delete_all |= parsed.has_glob_delete_all;
                }
            }
            Err(e) => warn!(file = %path.display(), "cannot parse type extras: {}", e),
        }
        data.loaded = true;
        true
    }

    fn icon_name(&mut self, name: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        let list_off = cache.table_offset(POS_ICONS_LIST)?;
        let value_off = find_pair_value(cache, list_off, name)?;
        cache.get_str(value_off).map(str::to_string)
    }

    fn generic_icon_name(&mut self, name: &str) -> Option<String> {
        let cache = self.cache.as_ref()?;
        let list_off = cache.table_offset(POS_GENERIC_ICONS_LIST)?;
        let value_off = find_pair_value(cache, list_off, name)?;
        cache.get_str(value_off).map(str::to_string)
    }
}

/// Runs `file_name` against a glob list table: a u32 count followed by
/// 12-byte records of (pattern offset, mime offset, flags). The low byte
/// of the flags is the weight; bit 8 marks a case-sensitive pattern.
fn match_glob_list<F: Fn(&str) -> bool>(
    cache: &CacheBuffer,
    list_off: usize,
    file_name: &str,
    result: &mut GlobMatchResult,
    filter: &F,
) {
    let Some(count) = cache.get_u32(list_off) else {
        return;
    };
    for i in 0..count as usize {
        let off = list_off + 4 + 12 * i;
        let (Some(pattern_off), Some(mime_off), Some(flags)) = (
            cache.get_u32(off),
            cache.get_u32(off + 4),
            cache.get_u32(off + 8),
        ) else {
            return;
        };
        let (Some(pattern), Some(mime)) = (
            cache.get_str(pattern_off as usize),
            cache.get_str(mime_off as usize),
        ) else {
            continue;
        };
        if !filter(mime) {
            continue;
        }
        let weight = (flags & 0xff) as i32;
        let mode = if flags & 0x100 != 0 {
            MatchMode::CaseSensitive
        } else {
            MatchMode::CaseInsensitive
        };
        let glob = GlobPattern::new(pattern, mime, weight, mode);
        if glob.matches_file_name(file_name) {
            result.add_match(mime, weight, pattern, 0);
        }
    }
}

/// Walks the reversed suffix tree from the last character of `name`.
///
/// Each 12-byte node holds a character; a zero character marks a leaf
/// carrying (mime offset, flags). Children are sorted by character for
/// binary search, with leaf entries first. A deeper match wins over leaf
/// entries of the current node, so `*.tar.gz` beats `*.gz` here without
/// going through the weight logic.
#[allow(clippy::too_many_arguments)]
fn match_suffix_tree<F: Fn(&str) -> bool>(
    cache: &CacheBuffer,
    result: &mut GlobMatchResult,
    n_entries: u32,
    first_off: usize,
    name: &[char],
    char_pos: isize,
    case_sensitive_check: bool,
    filter: &F,
) -> bool {
    if char_pos < 0 {
        return false;
    }
    let file_char = name[char_pos as usize] as u32;
    let mut lo = 0i64;
    let mut hi = n_entries as i64 - 1;
    let mut node_off = None;
    while lo <= hi {
        let mid = (lo + hi) / 2;
        let off = first_off + 12 * mid as usize;
        let Some(ch) = cache.get_u32(off) else {
            return false;
        };
        if ch == file_char {
            node_off = Some(off);
            break;
        }
        if ch < file_char {
            lo = mid + 1;
        } else {
            hi = mid - 1;
        }
    }
    let Some(off) = node_off else {
        return false;
    };

    let char_pos = char_pos - 1;
    let (Some(n_children), Some(children_off)) = (cache.get_u32(off + 4), cache.get_u32(off + 8))
    else {
        return false;
    };
    let children_off = children_off as usize;
    let mut success = false;
    if char_pos > 0 {
        success = match_suffix_tree(
            cache,
            result,
            n_children,
            children_off,
            name,
            char_pos,
            case_sensitive_check,
            filter,
        );
    }
    if !success {
        for i in 0..n_children as usize {
            let child_off = children_off + 12 * i;
            let Some(ch) = cache.get_u32(child_off) else {
                break;
            };
            if ch != 0 {
                break;
            }
            let (Some(mime_off), Some(flags)) =
                (cache.get_u32(child_off + 4), cache.get_u32(child_off + 8))
            else {
                break;
            };
            let Some(mime) = cache.get_str(mime_off as usize) else {
                continue;
            };
            let weight = (flags & 0xff) as i32;
            let case_sensitive = flags & 0x100 != 0;
            if (case_sensitive_check || !case_sensitive) && filter(mime) {
                let suffix: String = name[(char_pos + 1) as usize..].iter().collect();
                let pattern = format!("*{}", suffix);
                let known_suffix = (name.len() as isize - char_pos - 2) as usize;
                result.add_match(mime, weight, &pattern, known_suffix);
                success = true;
            }
        }
    }
    success
}

/// Evaluates a list of 32-byte matchlet records as alternatives. A hit
/// with children requires one of the children to hit as well; the children
/// verdict is final, later alternatives are not retried.
fn match_magic_rule(cache: &CacheBuffer, n_matchlets: u32, first_off: usize, data: &[u8]) -> bool {
    for i in 0..n_matchlets as usize {
        let off = first_off + 32 * i;
        let (Some(range_start), Some(range_length), Some(value_length), Some(value_off), Some(mask_off)) = (
            cache.get_u32(off),
            cache.get_u32(off + 4),
            cache.get_u32(off + 12),
            cache.get_u32(off + 16),
            cache.get_u32(off + 20),
        ) else {
            return false;
        };
        let Some(value) = cache.get_slice(value_off as usize, value_length as usize) else {
            return false;
        };
        let mask = if mask_off != 0 {
            match cache.get_slice(mask_off as usize, value_length as usize) {
                Some(mask) => Some(mask),
                None => return false,
            }
        } else {
            None
        };
        if !magic::match_substring(
            data,
            range_start as usize,
            range_length as usize,
            value,
            mask,
        ) {
            continue;
        }
        let (Some(n_children), Some(first_child)) =
            (cache.get_u32(off + 24), cache.get_u32(off + 28))
        else {
            return false;
        };
        if n_children == 0 {
            return true;
        }
        return match_magic_rule(cache, n_children, first_child as usize, data);
    }
    false
}

/// Binary search over a sorted key/value list: a u32 count followed by
/// 8-byte records of (key string offset, value). Returns the value of the
/// matching record, which is a string offset for the alias and icon lists
/// and an entry offset for the parent list.
fn find_pair_value(cache: &CacheBuffer, list_off: usize, key: &str) -> Option<usize> {
    let count = cache.get_u32(list_off)?;
    let mut lo = 0i64;
    let mut hi = count as i64 - 1;
    while lo <= hi {
        let mid = (lo + hi) / 2;
        let off = list_off + 4 + 8 * mid as usize;
        let entry_key = cache.get_str(cache.get_u32(off)? as usize)?;
        match entry_key.cmp(key) {
            std::cmp::Ordering::Less => lo = mid + 1,
            std::cmp::Ordering::Greater => hi = mid - 1,
            std::cmp::Ordering::Equal => return cache.get_u32(off + 4).map(|v| v as usize),
        }
    }
    None
}
