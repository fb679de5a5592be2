//! Provider backed by XML definition files.
//!
//! Used for mime directories without a usable `mime.cache` (the parsed
//! `packages/*.xml` sources are read instead) and for in-memory definition
//! blobs registered at runtime. Everything is loaded eagerly into hash maps
//! at construction; queries are pure lookups.

use crate::glob::{GlobPattern, MatchMode};
use crate::glob_match::{AllGlobPatterns, GlobMatchResult};
use crate::magic::MagicRuleMatcher;
use crate::mime_type::MimeTypeData;
use crate::provider::MimeProvider;
use crate::xml_parser::{self, ParsedMimeInfo};
use crate::Result;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub(crate) struct XmlProvider {
    key: String,
    directory: Option<PathBuf>,
    mime_types: FxHashMap<String, MimeTypeData>,
    /// alias name to canonical name
    aliases: FxHashMap<String, String>,
    /// child name to direct parents, in declaration order
    parents: FxHashMap<String, Vec<String>>,
    magic_matchers: Vec<MagicRuleMatcher>,
    globs: AllGlobPatterns,
}

impl XmlProvider {
    /// Loads every definition file under `<directory>/packages`, in file
    /// name order. Files that fail to parse are logged and skipped.
    pub(crate) fn from_directory(directory: &Path) -> Self {
        let mut provider = XmlProvider::empty(directory.display().to_string());
        provider.directory = Some(directory.to_path_buf());
        provider.load_directory();
        provider
    }

    /// Builds a provider from one in-memory definition document.
    pub(crate) fn from_data(key: &str, data: &[u8]) -> Result<Self> {
        let mut provider = XmlProvider::empty(key.to_string());
        let info = xml_parser::parse(data)?;
        provider.merge(info);
        Ok(provider)
    }

    fn empty(key: String) -> Self {
        XmlProvider {
            key,
            directory: None,
            mime_types: FxHashMap::default(),
            aliases: FxHashMap::default(),
            parents: FxHashMap::default(),
            magic_matchers: Vec::new(),
            globs: AllGlobPatterns::new(),
        }
    }

    fn load_directory(&mut self) {
        let Some(directory) = self.directory.clone() else {
            return;
        };
        let package_dir = directory.join("packages");
        let mut files = Vec::new();
        match std::fs::read_dir(&package_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_file() {
                        files.push(path);
                    }
                }
            }
            Err(e) => {
                debug!(directory = %package_dir.display(), "no definition files: {}", e);
                return;
            }
        }
        // directory iteration order is unspecified
        files.sort();
        for path in files {
            let data = match std::fs::read(&path) {
                Ok(data) => data,
                Err(e) => {
                    warn!(file = %path.display(), "cannot read definition file: {}", e);
                    continue;
                }
            };
            match xml_parser::parse(&data) {
                Ok(info) => self.merge(info),
                Err(e) => warn!(file = %path.display(), "cannot parse definition file: {}", e),
            }
        }
    }

    /// Merges one parsed document into the provider. Later documents
    /// extend earlier ones; a `glob-deleteall` drops every glob the type
    /// accumulated from earlier documents (the parser already dropped the
    /// ones declared before it in the same document).
    fn merge(&mut self, info: ParsedMimeInfo) {
        for name in &info.glob_delete_all {
            self.globs.remove_mime_type(name);
            if let Some(existing) = self.mime_types.get_mut(name) {
                existing.glob_patterns.clear();
            }
        }
        for glob in info.globs {
            let mode = if glob.case_sensitive {
                MatchMode::CaseSensitive
            } else {
                MatchMode::CaseInsensitive
            };
            self.globs.add_glob(GlobPattern::new(
                &glob.pattern,
                &glob.mime_type,
                glob.weight,
                mode,
            ));
        }
        for data in info.mime_types {
            match self.mime_types.get_mut(&data.name) {
                None => {
                    self.mime_types.insert(data.name.clone(), data);
                }
                Some(existing) => {
                    existing.locale_comments.extend(data.locale_comments);
                    if data.icon_name.is_some() {
                        existing.icon_name = data.icon_name;
                    }
                    if data.generic_icon_name.is_some() {
                        existing.generic_icon_name = data.generic_icon_name;
                    }
                    for pattern in data.glob_patterns {
                        if !existing.glob_patterns.contains(&pattern) {
                            existing.glob_patterns.push(pattern);
                        }
                    }
                    existing.has_glob_delete_all |= data.has_glob_delete_all;
                    existing.promote_primary_pattern();
                }
            }
        }
        for (alias, canonical) in info.aliases {
            self.aliases.insert(alias, canonical);
        }
        for (child, parent) in info.parents {
            let list = self.parents.entry(child).or_default();
            if !list.contains(&parent) {
                list.push(parent);
            }
        }
        self.magic_matchers.extend(info.magic_matchers);
    }
}

impl MimeProvider for XmlProvider {
    fn key(&self) -> &str {
        &self.key
    }

    fn is_valid(&self) -> bool {
        !self.mime_types.is_empty()
    }

    fn ensure_loaded(&mut self) {
        if self.directory.is_none() {
            return;
        }
        self.mime_types.clear();
        self.aliases.clear();
        self.parents.clear();
        self.magic_matchers.clear();
        self.globs = AllGlobPatterns::new();
        self.load_directory();
    }

    fn knows_mime_type(&mut self, name: &str) -> bool {
        self.mime_types.contains_key(name)
    }

    fn collect_defined_names(&mut self, into: &mut FxHashSet<String>) {
        into.extend(self.mime_types.keys().cloned());
    }

    fn add_file_name_matches(
        &mut self,
        file_name: &str,
        result: &mut GlobMatchResult,
        excluded: &FxHashSet<String>,
    ) {
        self.globs
            .matching_globs(file_name, result, |mime| !excluded.contains(mime));
    }

    fn find_by_magic(
        &mut self,
        data: &[u8],
        accuracy: &mut i32,
        candidate: &mut Option<String>,
        excluded: &FxHashSet<String>,
    ) {
        for matcher in &self.magic_matchers {
            if excluded.contains(matcher.mime_type()) {
                continue;
            }
            let priority = matcher.priority() as i32;
            if priority > *accuracy && matcher.matches(data) {
                *accuracy = priority;
                *candidate = Some(matcher.mime_type().to_string());
            }
        }
    }

    fn add_parents(&mut self, name: &str, parents: &mut Vec<String>) {
        if let Some(list) = self.parents.get(name) {
            for parent in list {
                if !parents.contains(parent) {
                    parents.push(parent.clone());
                }
            }
        }
    }

    fn resolve_alias(&mut self, name: &str) -> Option<String> {
        self.aliases.get(name).cloned()
    }

    fn add_aliases(&mut self, name: &str, aliases: &mut Vec<String>) {
        for (alias, canonical) in &self.aliases {
            if canonical == name && !aliases.contains(alias) {
                aliases.push(alias.clone());
            }
        }
    }

    fn add_all_mime_types(&mut self, names: &mut Vec<String>) {
        for name in self.mime_types.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }

    fn load_mime_type_data(&mut self, data: &mut MimeTypeData) -> bool {
        let Some(record) = self.mime_types.get(&data.name) else {
            return false;
        };
        for (locale, text) in &record.locale_comments {
            data.locale_comments
                .entry(locale.clone())
                .or_insert_with(|| text.clone());
        }
        if data.icon_name.is_none() {
            data.icon_name = record.icon_name.clone();
        }
        if data.generic_icon_name.is_none() {
            data.generic_icon_name = record.generic_icon_name.clone();
        }
        for pattern in &record.glob_patterns {
            if !data.glob_patterns.contains(pattern) {
                data.glob_patterns.push(pattern.clone());
            }
        }
        data.has_glob_delete_all |= record.has_glob_delete_all;
        data.loaded = true;
        true
    }

    fn icon_name(&mut self, name: &str) -> Option<String> {
        self.mime_types.get(name)?.icon_name.clone()
    }

    fn generic_icon_name(&mut self, name: &str) -> Option<String> {
        self.mime_types.get(name)?.generic_icon_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(xml: &str) -> XmlProvider {
        XmlProvider::from_data("test", xml.as_bytes()).unwrap()
    }

    const PNG_XML: &str = r#"<mime-info>
  <mime-type type="image/png">
    <comment>PNG image</comment>
    <glob pattern="*.png"/>
    <magic priority="50">
      <match type="string" value="\x89PNG" offset="0"/>
    </magic>
  </mime-type>
</mime-info>"#;

    #[test]
    fn test_glob_lookup() {
        let mut p = provider(PNG_XML);
        let mut result = GlobMatchResult::new();
        p.add_file_name_matches("photo.PNG", &mut result, &FxHashSet::default());
        assert_eq!(result.matching_mime_types(), ["image/png"]);
    }

    #[test]
    fn test_magic_lookup() {
        let mut p = provider(PNG_XML);
        let mut accuracy = 0;
        let mut candidate = None;
        p.find_by_magic(
            b"\x89PNG\r\n\x1a\n",
            &mut accuracy,
            &mut candidate,
            &FxHashSet::default(),
        );
        assert_eq!(candidate.as_deref(), Some("image/png"));
        assert_eq!(accuracy, 50);
    }

    #[test]
    fn test_magic_respects_exclusions() {
        let mut p = provider(PNG_XML);
        let mut excluded = FxHashSet::default();
        excluded.insert("image/png".to_string());
        let mut accuracy = 0;
        let mut candidate = None;
        p.find_by_magic(b"\x89PNG\r\n", &mut accuracy, &mut candidate, &excluded);
        assert_eq!(candidate, None);
    }

    #[test]
    fn test_aliases_and_parents() {
        let mut p = provider(
            r#"<mime-info>
  <mime-type type="text/html">
    <sub-class-of type="text/plain"/>
    <alias type="application/xhtml"/>
    <glob pattern="*.html"/>
  </mime-type>
</mime-info>"#,
        );
        assert_eq!(p.resolve_alias("application/xhtml").as_deref(), Some("text/html"));
        assert_eq!(p.resolve_alias("text/html"), None);
        let mut parents = Vec::new();
        p.add_parents("text/html", &mut parents);
        assert_eq!(parents, ["text/plain"]);
        let mut aliases = Vec::new();
        p.add_aliases("text/html", &mut aliases);
        assert_eq!(aliases, ["application/xhtml"]);
    }

    #[test]
    fn test_later_document_extends_earlier() {
        let mut p = provider(PNG_XML);
        let info = xml_parser::parse(
            br#"<mime-type type="image/png">
  <comment xml:lang="de">PNG-Bild</comment>
  <icon name="image-png"/>
</mime-type>"#,
        )
        .unwrap();
        p.merge(info);
        let mut data = MimeTypeData::new("image/png");
        assert!(p.load_mime_type_data(&mut data));
        assert_eq!(data.comment_for_locale("default"), Some("PNG image"));
        assert_eq!(data.comment_for_locale("de"), Some("PNG-Bild"));
        assert_eq!(data.icon_name.as_deref(), Some("image-png"));
        assert_eq!(data.glob_patterns, ["*.png"]);
    }

    #[test]
    fn test_glob_deleteall_clears_earlier_globs() {
        let mut p = provider(PNG_XML);
        let info = xml_parser::parse(
            br#"<mime-type type="image/png">
  <glob pattern="*.oldpng"/>
  <glob-deleteall/>
  <glob pattern="*.mypng"/>
</mime-type>"#,
        )
        .unwrap();
        p.merge(info);
        // neither the earlier document's pattern nor the one declared
        // before the deleteall in the same document matches
        for dead in ["a.png", "a.oldpng"] {
            let mut result = GlobMatchResult::new();
            p.add_file_name_matches(dead, &mut result, &FxHashSet::default());
            assert!(result.matching_mime_types().is_empty());
        }
        let mut result = GlobMatchResult::new();
        p.add_file_name_matches("a.mypng", &mut result, &FxHashSet::default());
        assert_eq!(result.matching_mime_types(), ["image/png"]);
        let mut data = MimeTypeData::new("image/png");
        assert!(p.load_mime_type_data(&mut data));
        assert_eq!(data.glob_patterns, ["*.mypng"]);
    }

    #[test]
    fn test_from_directory_reads_packages() {
        let dir = tempfile::tempdir().unwrap();
        let packages = dir.path().join("packages");
        std::fs::create_dir_all(&packages).unwrap();
        std::fs::write(packages.join("one.xml"), PNG_XML).unwrap();
        std::fs::write(packages.join("broken.xml"), "<not-xml").unwrap();

        let mut p = XmlProvider::from_directory(dir.path());
        assert!(p.is_valid());
        assert!(p.knows_mime_type("image/png"));
        assert!(!p.knows_mime_type("image/gif"));
    }

    #[test]
    fn test_missing_directory_is_empty_not_error() {
        let p = XmlProvider::from_directory(Path::new("/nonexistent/mime"));
        assert!(!p.is_valid());
    }
}
