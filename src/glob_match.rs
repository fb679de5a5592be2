//! Glob match accumulation and the per-provider pattern collection.
//!
//! [`GlobMatchResult`] is the request-scoped accumulator shared across all
//! providers during a file name lookup. It enforces the priority rules of
//! glob matching: a higher weight supersedes everything recorded so far,
//! and among equal weights a strictly longer pattern wins. Equal weight and
//! length accumulate, producing an ambiguous result that the caller
//! disambiguates with content sniffing.
//!
//! [`AllGlobPatterns`] aggregates a provider's patterns, split for
//! performance into a hash map keyed by extension for the overwhelmingly
//! common `*.ext` shape and two weight-ordered linear lists for everything
//! else.

use crate::glob::{GlobPattern, MatchMode, DEFAULT_WEIGHT};
use rustc_hash::FxHashMap;

/// Accumulator for file name glob matches.
///
/// Repeated [`add_match`](GlobMatchResult::add_match) calls keep the set of
/// mime types matched at the currently-best weight and longest pattern
/// length, plus the full superset of everything that matched at any weight.
#[derive(Debug, Default)]
pub struct GlobMatchResult {
    matching_mime_types: Vec<String>,
    all_matching_mime_types: Vec<String>,
    weight: i32,
    matching_pattern_length: usize,
    known_suffix_length: usize,
}

impl GlobMatchResult {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one pattern hit.
    ///
    /// `known_suffix_length` is the character length of the "true" suffix
    /// for simple `*.`-patterns (6 for `*.tar.gz`), so the winning match
    /// can report `tar.gz` rather than `gz`. Pass 0 for other shapes.
    pub fn add_match(
        &mut self,
        mime_type: &str,
        weight: i32,
        pattern: &str,
        known_suffix_length: usize,
    ) {
        let record_all = |all: &mut Vec<String>| {
            if !all.iter().any(|m| m == mime_type) {
                all.push(mime_type.to_string());
            }
        };

        if weight < self.weight {
            record_all(&mut self.all_matching_mime_types);
            return;
        }
        if weight > self.weight {
            self.matching_mime_types.clear();
            self.weight = weight;
            self.matching_pattern_length = 0;
            self.known_suffix_length = 0;
        }

        let pattern_length = pattern.chars().count();
        if pattern_length < self.matching_pattern_length {
            record_all(&mut self.all_matching_mime_types);
            return;
        }
        if pattern_length > self.matching_pattern_length {
            self.matching_mime_types.clear();
            self.matching_pattern_length = pattern_length;
            self.known_suffix_length = 0;
        }

        if !self.matching_mime_types.iter().any(|m| m == mime_type) {
            self.matching_mime_types.push(mime_type.to_string());
            if pattern.starts_with("*.") {
                self.known_suffix_length = if known_suffix_length > 0 {
                    known_suffix_length
                } else {
                    pattern_length - 2
                };
            }
        }
        record_all(&mut self.all_matching_mime_types);
    }

    /// Mime types matched at the best weight and longest pattern length.
    pub fn matching_mime_types(&self) -> &[String] {
        &self.matching_mime_types
    }

    /// Every mime type that matched at any weight, in recording order
    /// (highest-weight hits come first because providers run their
    /// high-weight lists first).
    pub fn all_matching_mime_types(&self) -> &[String] {
        &self.all_matching_mime_types
    }

    /// The weight of the current best match.
    pub fn weight(&self) -> i32 {
        self.weight
    }

    /// Character length of the best match's known suffix, 0 if the best
    /// match was not a `*.`-style pattern.
    pub fn known_suffix_length(&self) -> usize {
        self.known_suffix_length
    }

    /// The best matches, sorted by name for deterministic results.
    pub fn sorted_matching_mime_types(&self) -> Vec<String> {
        let mut names = self.matching_mime_types.clone();
        names.sort_unstable();
        names
    }
}

/// All glob patterns of one provider, split by shape for fast matching.
#[derive(Debug, Default)]
pub struct AllGlobPatterns {
    /// `*.ext` patterns at default weight, case-insensitive, keyed by the
    /// lowercased extension.
    fast_patterns: FxHashMap<String, Vec<String>>,
    /// Patterns with weight > 50, in insertion order.
    high_weight_globs: Vec<GlobPattern>,
    /// Everything else, in insertion order.
    low_weight_globs: Vec<GlobPattern>,
}

impl AllGlobPatterns {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one pattern, routing it to the fast map or a weight list.
    pub fn add_glob(&mut self, glob: GlobPattern) {
        if glob.weight() == DEFAULT_WEIGHT
            && glob.mode() == MatchMode::CaseInsensitive
            && glob.is_simple_extension()
        {
            let extension = glob.pattern()[2..].to_string();
            let types = self.fast_patterns.entry(extension).or_default();
            if !types.iter().any(|t| t == glob.mime_type()) {
                types.push(glob.mime_type().to_string());
            }
        } else if glob.weight() > DEFAULT_WEIGHT {
            self.high_weight_globs.push(glob);
        } else {
            self.low_weight_globs.push(glob);
        }
    }

    /// Removes every pattern registered for `mime_type` (used when a
    /// `glob-deleteall` directive is seen for the type).
    pub fn remove_mime_type(&mut self, mime_type: &str) {
        for types in self.fast_patterns.values_mut() {
            types.retain(|t| t != mime_type);
        }
        self.fast_patterns.retain(|_, types| !types.is_empty());
        self.high_weight_globs.retain(|g| g.mime_type() != mime_type);
        self.low_weight_globs.retain(|g| g.mime_type() != mime_type);
    }

    /// Runs `file_name` against every pattern, recording hits in `result`.
    ///
    /// All three stages run unconditionally: a longer default-weight
    /// pattern in the low list (`*.tar.bz2`) must still be able to
    /// supersede a fast-path hit (`*.bz2`) through the length tie-break.
    /// `filter` excludes mime types suppressed by a higher-priority
    /// provider or a glob-deleteall directive.
    pub fn matching_globs<F>(&self, file_name: &str, result: &mut GlobMatchResult, filter: F)
    where
        F: Fn(&str) -> bool,
    {
        for glob in &self.high_weight_globs {
            if filter(glob.mime_type()) && glob.matches_file_name(file_name) {
                result.add_match(
                    glob.mime_type(),
                    glob.weight(),
                    glob.pattern(),
                    glob.simple_suffix_len(),
                );
            }
        }

        // The last dot-delimited section; the whole name when there is no
        // dot, which simply misses in the map.
        let extension = file_name
            .rsplit('.')
            .next()
            .unwrap_or(file_name)
            .to_lowercase();
        if let Some(types) = self.fast_patterns.get(&extension) {
            let simple_pattern = format!("*.{}", extension);
            let suffix_len = extension.chars().count();
            for mime_type in types {
                if filter(mime_type) {
                    result.add_match(mime_type, DEFAULT_WEIGHT, &simple_pattern, suffix_len);
                }
            }
        }

        for glob in &self.low_weight_globs {
            if filter(glob.mime_type()) && glob.matches_file_name(file_name) {
                result.add_match(
                    glob.mime_type(),
                    glob.weight(),
                    glob.pattern(),
                    glob.simple_suffix_len(),
                );
            }
        }
    }

    /// True when no patterns are registered.
    pub fn is_empty(&self) -> bool {
        self.fast_patterns.is_empty()
            && self.high_weight_globs.is_empty()
            && self.low_weight_globs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(collection: &mut AllGlobPatterns, pattern: &str, mime: &str, weight: i32) {
        collection.add_glob(GlobPattern::new(
            pattern,
            mime,
            weight,
            MatchMode::CaseInsensitive,
        ));
    }

    fn matches(collection: &AllGlobPatterns, file_name: &str) -> Vec<String> {
        let mut result = GlobMatchResult::new();
        collection.matching_globs(file_name, &mut result, |_| true);
        result.sorted_matching_mime_types()
    }

    #[test]
    fn test_weight_dominance() {
        // Registration order must not matter.
        for flip in [false, true] {
            let mut c = AllGlobPatterns::new();
            if flip {
                add(&mut c, "*.foo", "app/low", 50);
                add(&mut c, "*.foo", "app/high", 80);
            } else {
                add(&mut c, "*.foo", "app/high", 80);
                add(&mut c, "*.foo", "app/low", 50);
            }
            assert_eq!(matches(&c, "x.foo"), vec!["app/high"]);
        }
    }

    #[test]
    fn test_longest_match_tie_break() {
        let mut c = AllGlobPatterns::new();
        add(&mut c, "*.bz2", "app/bzip", 50);
        add(&mut c, "*.tar.bz2", "app/tarbz", 50);
        assert_eq!(matches(&c, "x.tar.bz2"), vec!["app/tarbz"]);
        assert_eq!(matches(&c, "x.bz2"), vec!["app/bzip"]);
    }

    #[test]
    fn test_equal_patterns_accumulate() {
        let mut c = AllGlobPatterns::new();
        add(&mut c, "*.foo", "app/one", 50);
        add(&mut c, "*.foo", "app/two", 50);
        assert_eq!(matches(&c, "x.foo"), vec!["app/one", "app/two"]);
    }

    #[test]
    fn test_all_matching_superset() {
        let mut c = AllGlobPatterns::new();
        add(&mut c, "*.foo", "app/high", 80);
        add(&mut c, "*.foo", "app/low", 50);
        let mut result = GlobMatchResult::new();
        c.matching_globs("x.foo", &mut result, |_| true);
        assert_eq!(result.matching_mime_types(), ["app/high"]);
        assert_eq!(result.all_matching_mime_types(), ["app/high", "app/low"]);
        assert_eq!(result.weight(), 80);
    }

    #[test]
    fn test_known_suffix_length() {
        let mut c = AllGlobPatterns::new();
        add(&mut c, "*.gz", "app/gzip", 50);
        add(&mut c, "*.tar.gz", "app/targz", 50);
        let mut result = GlobMatchResult::new();
        c.matching_globs("a.b.tar.gz", &mut result, |_| true);
        assert_eq!(result.known_suffix_length(), 6); // "tar.gz", not "gz"
    }

    #[test]
    fn test_filter_excludes() {
        let mut c = AllGlobPatterns::new();
        add(&mut c, "*.foo", "app/hidden", 50);
        add(&mut c, "*.foo", "app/visible", 50);
        let mut result = GlobMatchResult::new();
        c.matching_globs("x.foo", &mut result, |m| m != "app/hidden");
        assert_eq!(result.matching_mime_types(), ["app/visible"]);
    }

    #[test]
    fn test_remove_mime_type() {
        let mut c = AllGlobPatterns::new();
        add(&mut c, "*.foo", "app/gone", 50);
        add(&mut c, "README*", "app/gone", 60);
        add(&mut c, "*.foo", "app/kept", 50);
        c.remove_mime_type("app/gone");
        assert_eq!(matches(&c, "x.foo"), vec!["app/kept"]);
        assert_eq!(matches(&c, "README"), Vec::<String>::new());
    }

    #[test]
    fn test_case_sensitive_pattern_not_in_fast_path() {
        let mut c = AllGlobPatterns::new();
        c.add_glob(GlobPattern::new(
            "*.C",
            "text/x-c++src",
            50,
            MatchMode::CaseSensitive,
        ));
        assert_eq!(matches(&c, "prog.C"), vec!["text/x-c++src"]);
        assert_eq!(matches(&c, "prog.c"), Vec::<String>::new());
    }

    #[test]
    fn test_name_without_dot() {
        let mut c = AllGlobPatterns::new();
        add(&mut c, "makefile*", "text/x-makefile", 50);
        assert_eq!(matches(&c, "Makefile"), vec!["text/x-makefile"]);
    }
}
