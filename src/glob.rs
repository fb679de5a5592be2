//! Glob pattern classification and matching for file names.
//!
//! Patterns are classified at construction time so the common shapes match
//! without any wildcard machinery:
//!
//! - `*.ext` — suffix pattern, matched byte-for-byte from the end
//! - `prefix*` — prefix pattern
//! - `Makefile` — literal pattern, exact equality
//! - `[0-9][0-9][0-9].vdr` and `*.anim[1-9j]` — two hard-coded shapes that
//!   show up in every shared-mime-info database and deserve a fast path
//! - anything else — a general pattern compiled to segments with full
//!   `*`, `?` and `[...]` semantics
//!
//! Case-insensitive patterns are lowercased once at construction; the
//! candidate file name is lowercased before comparison.
//!
//! # Example
//!
//! ```
//! use mimey::glob::{GlobPattern, MatchMode};
//!
//! let glob = GlobPattern::new("*.tar.bz2", "application/x-bzip2-compressed-tar",
//!                             50, MatchMode::CaseInsensitive);
//! assert!(glob.matches_file_name("backup.TAR.BZ2"));
//! assert!(!glob.matches_file_name("backup.bz2"));
//! ```

use std::fmt;
use tracing::warn;

/// Default weight for glob patterns without an explicit `weight` attribute.
pub const DEFAULT_WEIGHT: i32 = 50;

/// Match mode for glob patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Case-sensitive matching
    CaseSensitive,
    /// Case-insensitive matching
    CaseInsensitive,
}

/// Pattern shape decided at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternKind {
    /// `*.ext` — exactly one `*` at position 0, no `[` or `?`
    Suffix,
    /// `prefix*` — exactly one `*` at the end, no `[` or `?`
    Prefix,
    /// No wildcards at all
    Literal,
    /// The literal pattern `[0-9][0-9][0-9].vdr`
    Vdr,
    /// The literal pattern `*.anim[1-9j]`
    Anim,
    /// General pattern, compiled to segments
    Other(Vec<GlobSegment>),
    /// Unparseable pattern; never matches
    Invalid,
}

/// A segment of a general glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GlobSegment {
    /// Literal text segment (no wildcards)
    Literal(String),
    /// `*` - matches zero or more of any character
    Star,
    /// `?` - matches exactly one character
    Question,
    /// `[...]` - character class, matches one character from the set
    CharClass {
        chars: Vec<CharClassItem>,
        negated: bool,
    },
}

/// Item in a character class.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CharClassItem {
    Char(char),
    Range(char, char),
}

/// A glob pattern bound to a mime type name, immutable after construction.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    mime_type: String,
    weight: i32,
    mode: MatchMode,
    kind: PatternKind,
}

impl GlobPattern {
    /// Creates a pattern and classifies it.
    ///
    /// Malformed general patterns (unclosed character class, trailing
    /// backslash) are kept but never match; a warning is logged. A glob
    /// definition must not be able to break the matcher.
    pub fn new(pattern: &str, mime_type: &str, weight: i32, mode: MatchMode) -> Self {
        let pattern = match mode {
            MatchMode::CaseSensitive => pattern.to_string(),
            MatchMode::CaseInsensitive => pattern.to_lowercase(),
        };
        let kind = Self::classify(&pattern);
        GlobPattern {
            pattern,
            mime_type: mime_type.to_string(),
            weight,
            mode,
            kind,
        }
    }

    /// The pattern string (lowercased if case-insensitive).
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The mime type name this pattern maps to.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Pattern weight, 1..=100.
    pub fn weight(&self) -> i32 {
        self.weight
    }

    /// Returns the match mode.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Whether this pattern has the exact shape `*.ext` with a single dot
    /// and no further wildcards. Such patterns qualify for the hash-based
    /// fast path in the collection when their weight is the default and
    /// they are case-insensitive.
    pub fn is_simple_extension(&self) -> bool {
        self.pattern.starts_with("*.")
            && self.pattern.len() > 2
            && !self.pattern[2..].contains(['*', '?', '[', '.'])
    }

    /// Length in characters of the suffix reported for a `*.`-style match
    /// (the pattern minus the leading `*.`), or 0 for other shapes.
    pub fn simple_suffix_len(&self) -> usize {
        if self.pattern.starts_with("*.") && !self.pattern[2..].contains(['*', '?', '[']) {
            self.pattern.chars().count() - 2
        } else {
            0
        }
    }

    fn classify(pattern: &str) -> PatternKind {
        if pattern.is_empty() {
            return PatternKind::Invalid;
        }
        if pattern == "[0-9][0-9][0-9].vdr" {
            return PatternKind::Vdr;
        }
        if pattern == "*.anim[1-9j]" {
            return PatternKind::Anim;
        }
        let star_count = pattern.matches('*').count();
        let has_class = pattern.contains('[');
        let has_question = pattern.contains('?');
        if !has_class && !has_question {
            if star_count == 1 {
                if pattern.starts_with('*') && pattern.len() > 1 {
                    return PatternKind::Suffix;
                }
                if pattern.ends_with('*') {
                    return PatternKind::Prefix;
                }
            } else if star_count == 0 {
                return PatternKind::Literal;
            }
        }
        match Self::parse_segments(pattern) {
            Ok(segments) => PatternKind::Other(segments),
            Err(msg) => {
                warn!(pattern, error = %msg, "ignoring malformed glob pattern");
                PatternKind::Invalid
            }
        }
    }

    /// Checks whether the pattern matches the given file name.
    pub fn matches_file_name(&self, file_name: &str) -> bool {
        let lowered;
        let candidate = match self.mode {
            MatchMode::CaseSensitive => file_name,
            MatchMode::CaseInsensitive => {
                lowered = file_name.to_lowercase();
                &lowered
            }
        };
        match &self.kind {
            PatternKind::Suffix => candidate.ends_with(&self.pattern[1..]),
            PatternKind::Prefix => {
                candidate.starts_with(&self.pattern[..self.pattern.len() - 1])
            }
            PatternKind::Literal => candidate == self.pattern,
            PatternKind::Vdr => {
                let chars: Vec<char> = candidate.chars().collect();
                chars.len() == 7
                    && chars[..3].iter().all(|c| c.is_ascii_digit())
                    && candidate.ends_with(".vdr")
            }
            PatternKind::Anim => {
                let chars: Vec<char> = candidate.chars().collect();
                let len = chars.len();
                if len < 6 {
                    return false;
                }
                let last = chars[len - 1];
                let last_ok = (last.is_ascii_digit() && last != '0') || last == 'j';
                last_ok && chars[len - 6..len - 1].iter().collect::<String>() == ".anim"
            }
            PatternKind::Other(segments) => {
                // Limit backtracking steps so a pathological pattern like
                // *a*b*c*d* cannot blow up on a long non-matching name.
                let mut steps_remaining = 100_000;
                Self::match_segments(segments, candidate, 0, 0, &mut steps_remaining)
            }
            PatternKind::Invalid => false,
        }
    }

    /// Recursive backtracking matcher over parsed segments. The candidate
    /// was already case-normalized by the caller, so all comparisons here
    /// are exact.
    fn match_segments(
        segments: &[GlobSegment],
        text: &str,
        text_pos: usize,
        seg_idx: usize,
        steps_remaining: &mut usize,
    ) -> bool {
        if *steps_remaining == 0 {
            return false;
        }
        *steps_remaining -= 1;

        if seg_idx >= segments.len() {
            return text_pos >= text.len();
        }

        match &segments[seg_idx] {
            GlobSegment::Literal(lit) => {
                if text[text_pos..].starts_with(lit.as_str()) {
                    Self::match_segments(
                        segments,
                        text,
                        text_pos + lit.len(),
                        seg_idx + 1,
                        steps_remaining,
                    )
                } else {
                    false
                }
            }

            GlobSegment::Question => {
                if let Some(ch) = text[text_pos..].chars().next() {
                    Self::match_segments(
                        segments,
                        text,
                        text_pos + ch.len_utf8(),
                        seg_idx + 1,
                        steps_remaining,
                    )
                } else {
                    false
                }
            }

            GlobSegment::CharClass { chars, negated } => {
                if let Some(ch) = text[text_pos..].chars().next() {
                    let in_class = chars.iter().any(|item| match item {
                        CharClassItem::Char(c) => ch == *c,
                        CharClassItem::Range(start, end) => ch >= *start && ch <= *end,
                    });
                    if in_class != *negated {
                        Self::match_segments(
                            segments,
                            text,
                            text_pos + ch.len_utf8(),
                            seg_idx + 1,
                            steps_remaining,
                        )
                    } else {
                        false
                    }
                } else {
                    false
                }
            }

            GlobSegment::Star => {
                // Trailing star matches everything remaining.
                if seg_idx + 1 >= segments.len() {
                    return true;
                }
                // Try 0, 1, 2, ... consumed characters, advancing by char
                // boundaries so multi-byte names cannot split a character.
                let mut pos = text_pos;
                loop {
                    if Self::match_segments(segments, text, pos, seg_idx + 1, steps_remaining) {
                        return true;
                    }
                    if pos >= text.len() {
                        break;
                    }
                    match text[pos..].chars().next() {
                        Some(ch) => pos += ch.len_utf8(),
                        None => break,
                    }
                }
                false
            }
        }
    }

    /// Parses a general pattern into segments.
    fn parse_segments(pattern: &str) -> std::result::Result<Vec<GlobSegment>, String> {
        let mut segments = Vec::new();
        let mut chars = pattern.chars().peekable();
        let mut literal_buf = String::new();

        let flush_literal = |buf: &mut String, segs: &mut Vec<GlobSegment>| {
            if !buf.is_empty() {
                segs.push(GlobSegment::Literal(std::mem::take(buf)));
            }
        };

        while let Some(ch) = chars.next() {
            match ch {
                '*' => {
                    flush_literal(&mut literal_buf, &mut segments);
                    segments.push(GlobSegment::Star);
                }

                '?' => {
                    flush_literal(&mut literal_buf, &mut segments);
                    segments.push(GlobSegment::Question);
                }

                '[' => {
                    flush_literal(&mut literal_buf, &mut segments);

                    let mut negated = false;
                    let mut class_items = Vec::new();

                    if let Some(&next_ch) = chars.peek() {
                        if next_ch == '!' || next_ch == '^' {
                            negated = true;
                            chars.next();
                        }
                    }

                    let mut prev_char: Option<char> = None;
                    let mut expect_range_end = false;

                    loop {
                        let class_ch = chars
                            .next()
                            .ok_or_else(|| "unclosed character class".to_string())?;

                        if class_ch == ']' && (!class_items.is_empty() || prev_char.is_some()) {
                            if let Some(ch) = prev_char {
                                class_items.push(CharClassItem::Char(ch));
                            }
                            break;
                        }

                        if class_ch == '-'
                            && prev_char.is_some()
                            && chars.peek().is_some()
                            && chars.peek() != Some(&']')
                        {
                            expect_range_end = true;
                        } else if expect_range_end {
                            expect_range_end = false;
                            if let Some(start) = prev_char.take() {
                                if start > class_ch {
                                    return Err(format!(
                                        "invalid character range: {}-{}",
                                        start, class_ch
                                    ));
                                }
                                class_items.push(CharClassItem::Range(start, class_ch));
                            }
                        } else {
                            if let Some(ch) = prev_char {
                                class_items.push(CharClassItem::Char(ch));
                            }
                            prev_char = Some(class_ch);
                        }
                    }

                    if class_items.is_empty() {
                        return Err("empty character class".to_string());
                    }

                    segments.push(GlobSegment::CharClass {
                        chars: class_items,
                        negated,
                    });
                }

                '\\' => {
                    // Escape: next character is literal
                    match chars.next() {
                        Some(escaped) => literal_buf.push(escaped),
                        None => return Err("trailing backslash in pattern".to_string()),
                    }
                }

                _ => {
                    literal_buf.push(ch);
                }
            }
        }

        flush_literal(&mut literal_buf, &mut segments);
        Ok(segments)
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}
