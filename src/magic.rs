//! Content-sniffing magic rules.
//!
//! A [`MagicRule`] checks for a byte pattern (literal string, regular
//! expression, or numeric word) within an offset range of the input. Rules
//! form a recursive AND/OR tree: a rule with sub-matches requires its own
//! condition AND at least one sub-match; sibling rules within one
//! [`MagicRuleMatcher`] are alternatives (OR).
//!
//! Rules are validated at construction. A malformed definition (bad offset
//! syntax, empty value, unparseable mask) yields an error the caller can
//! log; it never produces a rule that panics during matching.
//!
//! # Example
//!
//! ```
//! use mimey::magic::MagicRule;
//!
//! // PNG signature at offset 0
//! let rule = MagicRule::new("string", b"\\x89PNG", "0", None).unwrap();
//! assert!(rule.matches(b"\x89PNG\r\n\x1a\n"));
//! assert!(!rule.matches(b"GIF89a"));
//! ```

use crate::error::{MimeError, Result};
use memchr::memmem;
use regex::{Regex, RegexBuilder};

/// Priority value meaning "no explicit priority configured".
pub const UNSET_PRIORITY: u32 = 65535;

/// Default priority applied to `<magic>` blocks without an attribute.
pub const DEFAULT_MAGIC_PRIORITY: u32 = 50;

/// The primitive condition a magic rule checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicRuleType {
    /// Literal byte string, optionally masked
    String,
    /// Regular expression over the input decoded as UTF-8
    RegExp,
    /// Single byte
    Byte,
    /// 16-bit word in host byte order
    Host16,
    /// 32-bit word in host byte order
    Host32,
    /// 16-bit big-endian word
    Big16,
    /// 32-bit big-endian word
    Big32,
    /// 16-bit little-endian word
    Little16,
    /// 32-bit little-endian word
    Little32,
}

impl MagicRuleType {
    /// Parses the `type` attribute of a `<match>` element.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(MagicRuleType::String),
            "regexp" => Some(MagicRuleType::RegExp),
            "byte" => Some(MagicRuleType::Byte),
            "host16" => Some(MagicRuleType::Host16),
            "host32" => Some(MagicRuleType::Host32),
            "big16" => Some(MagicRuleType::Big16),
            "big32" => Some(MagicRuleType::Big32),
            "little16" => Some(MagicRuleType::Little16),
            "little32" => Some(MagicRuleType::Little32),
            _ => None,
        }
    }

    fn word_width(self) -> usize {
        match self {
            MagicRuleType::Byte => 1,
            MagicRuleType::Host16 | MagicRuleType::Big16 | MagicRuleType::Little16 => 2,
            MagicRuleType::Host32 | MagicRuleType::Big32 | MagicRuleType::Little32 => 4,
            MagicRuleType::String | MagicRuleType::RegExp => 0,
        }
    }
}

/// One content-sniffing rule, possibly with nested sub-matches.
#[derive(Debug, Clone)]
pub struct MagicRule {
    rule_type: MagicRuleType,
    /// The value as authored (escapes not yet applied)
    value: Vec<u8>,
    start_pos: usize,
    end_pos: usize,
    /// Unescaped byte pattern (string rules)
    pattern: Vec<u8>,
    /// Byte mask, same length as `pattern` (string rules; empty if none)
    mask: Vec<u8>,
    /// Parsed numeric value and mask (numeric rules)
    number: u32,
    number_mask: u32,
    regex: Option<Regex>,
    sub_matches: Vec<MagicRule>,
}

impl MagicRule {
    /// Builds a rule from `<match>` attribute values.
    ///
    /// `offsets` is `"N"` or `"N:M"`; `mask` is a hex string prefixed with
    /// `0x` for string rules, or a number for numeric rules.
    pub fn new(
        type_name: &str,
        value: &[u8],
        offsets: &str,
        mask: Option<&str>,
    ) -> Result<MagicRule> {
        let rule_type = MagicRuleType::from_name(type_name).ok_or_else(|| {
            MimeError::InvalidMagicRule(format!("unknown match type '{}'", type_name))
        })?;
        if value.is_empty() {
            return Err(MimeError::InvalidMagicRule("empty match value".to_string()));
        }

        let (start_pos, end_pos) = parse_offsets(offsets)?;

        let mut rule = MagicRule {
            rule_type,
            value: value.to_vec(),
            start_pos,
            end_pos,
            pattern: Vec::new(),
            mask: Vec::new(),
            number: 0,
            number_mask: 0,
            regex: None,
            sub_matches: Vec::new(),
        };

        match rule_type {
            MagicRuleType::String => {
                rule.pattern = unescape(value);
                if let Some(mask_str) = mask {
                    rule.mask = parse_string_mask(mask_str, rule.pattern.len())?;
                }
            }
            MagicRuleType::RegExp => {
                let source = String::from_utf8_lossy(value);
                let regex = RegexBuilder::new(&source)
                    .multi_line(true)
                    .dot_matches_new_line(true)
                    .build()
                    .map_err(|e| {
                        MimeError::InvalidMagicRule(format!("bad regexp '{}': {}", source, e))
                    })?;
                rule.regex = Some(regex);
            }
            _ => {
                let text = String::from_utf8_lossy(value);
                rule.number = parse_unsigned(&text).ok_or_else(|| {
                    MimeError::InvalidMagicRule(format!("cannot parse number '{}'", text))
                })?;
                rule.number_mask = match mask {
                    Some(mask_str) => parse_unsigned(mask_str).ok_or_else(|| {
                        MimeError::InvalidMagicRule(format!("cannot parse mask '{}'", mask_str))
                    })?,
                    None => match rule_type.word_width() {
                        1 => 0xff,
                        2 => 0xffff,
                        _ => 0xffff_ffff,
                    },
                };
            }
        }

        Ok(rule)
    }

    /// The primitive condition type.
    pub fn rule_type(&self) -> MagicRuleType {
        self.rule_type
    }

    /// The value string as authored.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Start of the offset range.
    pub fn start_pos(&self) -> usize {
        self.start_pos
    }

    /// End of the offset range (inclusive).
    pub fn end_pos(&self) -> usize {
        self.end_pos
    }

    /// Nested sub-matches; at least one must match when non-empty.
    pub fn sub_matches(&self) -> &[MagicRule] {
        &self.sub_matches
    }

    /// Appends a nested sub-match.
    pub fn add_sub_match(&mut self, rule: MagicRule) {
        self.sub_matches.push(rule);
    }

    /// Prepends a nested sub-match, for callers that assemble rule trees
    /// in reverse document order.
    pub(crate) fn prepend_sub_match(&mut self, rule: MagicRule) {
        self.sub_matches.insert(0, rule);
    }

    /// Evaluates the rule against `data`: the primitive condition must
    /// match AND, when sub-matches exist, at least one of them must match.
    pub fn matches(&self, data: &[u8]) -> bool {
        let own = match self.rule_type {
            MagicRuleType::String => {
                let range_length = self.end_pos - self.start_pos + 1;
                let mask = if self.mask.is_empty() {
                    None
                } else {
                    Some(self.mask.as_slice())
                };
                match_substring(data, self.start_pos, range_length, &self.pattern, mask)
            }
            MagicRuleType::RegExp => self.match_regexp(data),
            _ => self.match_number(data),
        };
        own && (self.sub_matches.is_empty() || self.sub_matches.iter().any(|r| r.matches(data)))
    }

    fn match_regexp(&self, data: &[u8]) -> bool {
        let regex = match &self.regex {
            Some(r) => r,
            None => return false,
        };
        // endPos == startPos means "to end of input"
        let window = if self.end_pos > self.start_pos {
            &data[..self.end_pos.min(data.len())]
        } else {
            data
        };
        let text = String::from_utf8_lossy(window);
        let mut start = self.start_pos.min(text.len());
        while start > 0 && !text.is_char_boundary(start) {
            start -= 1;
        }
        regex.find_at(&text, start).is_some()
    }

    fn match_number(&self, data: &[u8]) -> bool {
        match self.rule_type {
            MagicRuleType::Byte => self.scan_words(data, 1, |b| b[0] as u32),
            MagicRuleType::Host16 => {
                self.scan_words(data, 2, |b| u16::from_ne_bytes([b[0], b[1]]) as u32)
            }
            MagicRuleType::Big16 => {
                self.scan_words(data, 2, |b| u16::from_be_bytes([b[0], b[1]]) as u32)
            }
            MagicRuleType::Little16 => {
                self.scan_words(data, 2, |b| u16::from_le_bytes([b[0], b[1]]) as u32)
            }
            MagicRuleType::Host32 => {
                self.scan_words(data, 4, |b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            }
            MagicRuleType::Big32 => {
                self.scan_words(data, 4, |b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            MagicRuleType::Little32 => {
                self.scan_words(data, 4, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            MagicRuleType::String | MagicRuleType::RegExp => false,
        }
    }

    /// Scans every 1-byte-aligned position in the offset range for a word
    /// whose masked value equals the masked rule value.
    fn scan_words(&self, data: &[u8], width: usize, read: impl Fn(&[u8]) -> u32) -> bool {
        if data.len() < width {
            return false;
        }
        let wanted = self.number & self.number_mask;
        let last = self.end_pos.min(data.len() - width);
        let mut pos = self.start_pos;
        while pos <= last {
            if (read(&data[pos..pos + width]) & self.number_mask) == wanted {
                return true;
            }
            pos += 1;
        }
        false
    }
}

/// A named group of alternative magic rules with one priority.
#[derive(Debug, Clone)]
pub struct MagicRuleMatcher {
    mime_type: String,
    priority: u32,
    rules: Vec<MagicRule>,
}

impl MagicRuleMatcher {
    /// Creates a matcher with no rules and an unset priority.
    pub fn new(mime_type: &str) -> Self {
        MagicRuleMatcher {
            mime_type: mime_type.to_string(),
            priority: UNSET_PRIORITY,
            rules: Vec::new(),
        }
    }

    /// The mime type reported when the matcher matches.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The configured priority, or [`UNSET_PRIORITY`].
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Sets the priority. Values above 100 are clamped so an
    /// over-specified definition cannot outrank every other rule.
    pub fn set_priority(&mut self, priority: u32) {
        self.priority = priority.min(100);
    }

    /// Appends one alternative rule.
    pub fn add_rule(&mut self, rule: MagicRule) {
        self.rules.push(rule);
    }

    /// The top-level rules.
    pub fn rules(&self) -> &[MagicRule] {
        &self.rules
    }

    /// True if ANY top-level rule matches (evaluation stops at the first).
    pub fn matches(&self, data: &[u8]) -> bool {
        self.rules.iter().any(|rule| rule.matches(data))
    }
}

/// Searches for `value` within `data[range_start .. range_start +
/// range_length + len(value) - 1]`: the window is widened so the value may
/// *start* anywhere inside the offset range. With a mask, both the window
/// bytes and the value are masked before comparison.
///
/// Shared between XML-built rules and the binary cache reader, which stores
/// every rule (including numeric ones) as a pre-rendered byte string.
pub(crate) fn match_substring(
    data: &[u8],
    range_start: usize,
    range_length: usize,
    value: &[u8],
    mask: Option<&[u8]>,
) -> bool {
    if value.is_empty() {
        return false;
    }
    match mask {
        None => {
            if data.len() < range_start + value.len() {
                return false;
            }
            let searched = (data.len() - range_start).min(range_length + value.len() - 1);
            memmem::find(&data[range_start..range_start + searched], value).is_some()
        }
        Some(mask) => {
            if mask.len() != value.len() {
                return false;
            }
            for i in range_start..range_start + range_length {
                if i + value.len() > data.len() {
                    break;
                }
                let hit = value
                    .iter()
                    .zip(mask)
                    .enumerate()
                    .all(|(idx, (v, m))| (data[i + idx] & m) == (v & m));
                if hit {
                    return true;
                }
            }
            false
        }
    }
}

/// Parses `"N"` or `"N:M"` offset syntax.
fn parse_offsets(offsets: &str) -> Result<(usize, usize)> {
    let bad = || MimeError::InvalidMagicRule(format!("invalid offset '{}'", offsets));
    match offsets.split_once(':') {
        Some((start, end)) => {
            let start: usize = start.trim().parse().map_err(|_| bad())?;
            let end: usize = end.trim().parse().map_err(|_| bad())?;
            if end < start {
                return Err(bad());
            }
            Ok((start, end))
        }
        None => {
            let start: usize = offsets.trim().parse().map_err(|_| bad())?;
            Ok((start, start))
        }
    }
}

/// Parses an unsigned integer with C-style base detection: `0x` hex,
/// leading `0` octal, decimal otherwise.
fn parse_unsigned(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        u32::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

/// Decodes a `0x`-prefixed hex mask; must cover exactly `pattern_len` bytes.
fn parse_string_mask(mask: &str, pattern_len: usize) -> Result<Vec<u8>> {
    let hex = mask
        .strip_prefix("0x")
        .or_else(|| mask.strip_prefix("0X"))
        .ok_or_else(|| {
            MimeError::InvalidMagicRule(format!("string mask '{}' must start with 0x", mask))
        })?;
    if hex.len() != pattern_len * 2 {
        return Err(MimeError::InvalidMagicRule(format!(
            "mask '{}' does not cover the {}-byte value",
            mask, pattern_len
        )));
    }
    let mut bytes = Vec::with_capacity(pattern_len);
    for chunk in hex.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(chunk).map_err(|_| {
            MimeError::InvalidMagicRule(format!("mask '{}' is not valid hex", mask))
        })?;
        let byte = u8::from_str_radix(pair, 16).map_err(|_| {
            MimeError::InvalidMagicRule(format!("mask '{}' is not valid hex", mask))
        })?;
        bytes.push(byte);
    }
    Ok(bytes)
}

/// Applies the escape sequences allowed in `<match value="...">`:
/// `\xHH` hex, `\NNN` octal (up to 3 digits, first <= 3 for 3-digit runs),
/// `\n`, `\r`, `\t`, and `\c` for any other character c.
fn unescape(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    let mut i = 0;
    while i < value.len() {
        let b = value[i];
        if b != b'\\' || i + 1 >= value.len() {
            out.push(b);
            i += 1;
            continue;
        }
        i += 1;
        let esc = value[i];
        match esc {
            b'x' => {
                let mut byte = 0u8;
                let mut consumed = 0;
                while consumed < 2 && i + 1 < value.len() {
                    let digit = match value[i + 1] {
                        d @ b'0'..=b'9' => d - b'0',
                        d @ b'a'..=b'f' => d - b'a' + 10,
                        d @ b'A'..=b'F' => d - b'A' + 10,
                        _ => break,
                    };
                    byte = (byte << 4) | digit;
                    i += 1;
                    consumed += 1;
                }
                out.push(byte);
                i += 1;
            }
            b'0'..=b'7' => {
                let mut byte = esc - b'0';
                if i + 1 < value.len() && (b'0'..=b'7').contains(&value[i + 1]) {
                    let first = esc;
                    i += 1;
                    byte = (byte << 3) | (value[i] - b'0');
                    if i + 1 < value.len()
                        && (b'0'..=b'7').contains(&value[i + 1])
                        && first <= b'3'
                    {
                        i += 1;
                        byte = (byte << 3) | (value[i] - b'0');
                    }
                }
                out.push(byte);
                i += 1;
            }
            b'n' => {
                out.push(b'\n');
                i += 1;
            }
            b'r' => {
                out.push(b'\r');
                i += 1;
            }
            b't' => {
                out.push(b'\t');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}
