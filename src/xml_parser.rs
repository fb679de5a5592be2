//! Streaming parser for shared-mime-info XML definition files.
//!
//! The parser walks the document with an explicit state machine rather than
//! a schema: each start element is classified against the current state, so
//! anything but `<match>` inside `<magic>` is a hard error while an unknown
//! tag inside `<mime-type>` (acronyms, tree magic, vendor extensions) is
//! silently tolerated. Invalid magic rules are logged and dropped together
//! with their nested children; the rest of the document still loads.
//!
//! The output is a flat [`ParsedMimeInfo`] bag; the XML provider merges it
//! into its lookup structures.

use crate::error::{MimeError, Result};
use crate::glob::DEFAULT_WEIGHT;
use crate::magic::{MagicRule, MagicRuleMatcher, DEFAULT_MAGIC_PRIORITY};
use crate::mime_type::MimeTypeData;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

/// One glob pattern declaration.
#[derive(Debug, Clone)]
pub(crate) struct ParsedGlob {
    pub mime_type: String,
    pub pattern: String,
    pub weight: i32,
    pub case_sensitive: bool,
}

/// Everything one definition document declares.
#[derive(Debug, Default)]
pub(crate) struct ParsedMimeInfo {
    pub mime_types: Vec<MimeTypeData>,
    pub globs: Vec<ParsedGlob>,
    /// `(alias, canonical)` pairs.
    pub aliases: Vec<(String, String)>,
    /// `(child, parent)` pairs from `sub-class-of`.
    pub parents: Vec<(String, String)>,
    pub magic_matchers: Vec<MagicRuleMatcher>,
    /// Types that declared `<glob-deleteall/>`.
    pub glob_delete_all: Vec<String>,
}

/// Parser states. Unknown elements inside a `<mime-type>` map to
/// `OtherMimeTypeSubTag`, which accepts the same children as the known
/// sub-tags; anywhere else an unexpected element is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Beginning,
    InMimeInfo,
    InMimeType,
    InComment,
    InGenericIcon,
    InIcon,
    InGlobPattern,
    InGlobDeleteAll,
    InSubClass,
    InAlias,
    InMagic,
    InMagicMatchRule,
    InOtherMimeTypeSubTag,
    Error,
}

fn next_state(current: ParseState, element: &[u8]) -> ParseState {
    use ParseState::*;
    match current {
        Beginning => match element {
            b"mime-info" => InMimeInfo,
            b"mime-type" => InMimeType,
            _ => Error,
        },
        InMimeInfo => {
            if element == b"mime-type" {
                InMimeType
            } else {
                Error
            }
        }
        InMimeType | InComment | InGenericIcon | InIcon | InGlobPattern | InGlobDeleteAll
        | InSubClass | InAlias | InOtherMimeTypeSubTag | InMagicMatchRule => match element {
            b"mime-type" => InMimeType,
            b"comment" => InComment,
            b"generic-icon" => InGenericIcon,
            b"icon" => InIcon,
            b"glob" => InGlobPattern,
            b"glob-deleteall" => InGlobDeleteAll,
            b"sub-class-of" => InSubClass,
            b"alias" => InAlias,
            b"magic" => InMagic,
            b"match" => InMagicMatchRule,
            _ => InOtherMimeTypeSubTag,
        },
        InMagic => {
            if element == b"match" {
                InMagicMatchRule
            } else {
                Error
            }
        }
        Error => Error,
    }
}

/// A `<match>` element seen during parsing. The rule is `None` when its
/// attributes did not form a valid rule; children of an invalid rule are
/// dropped during assembly.
struct RuleNode {
    rule: Option<MagicRule>,
    parent: Option<usize>,
}

struct DocumentParser<'a> {
    source: &'a [u8],
    state: ParseState,
    out: ParsedMimeInfo,
    /// The `<mime-type>` currently open.
    current: MimeTypeData,
    /// Locale of the `<comment>` currently open.
    comment_locale: String,
    /// Priority of the `<magic>` block currently open.
    magic_priority: u32,
    /// All `<match>` elements of the current `<magic>` block, in document
    /// order, with parent links.
    rule_arena: Vec<RuleNode>,
    /// Indices of the `<match>` elements still open.
    rule_stack: Vec<usize>,
}

/// Parses one definition document.
pub(crate) fn parse(source: &[u8]) -> Result<ParsedMimeInfo> {
    let mut parser = DocumentParser {
        source,
        state: ParseState::Beginning,
        out: ParsedMimeInfo::default(),
        current: MimeTypeData::default(),
        comment_locale: String::new(),
        magic_priority: DEFAULT_MAGIC_PRIORITY,
        rule_arena: Vec::new(),
        rule_stack: Vec::new(),
    };
    parser.run()?;
    Ok(parser.out)
}

impl<'a> DocumentParser<'a> {
    fn run(&mut self) -> Result<()> {
        let mut reader = Reader::from_reader(self.source);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        loop {
            let event = reader.read_event_into(&mut buf);
            // points just past the event (or at the failure), so errors
            // report the line the offending element sits on
            let position = reader.buffer_position() as usize;
            match event {
                Ok(Event::Start(element)) => self.handle_start(&element, position)?,
                Ok(Event::Empty(element)) => {
                    self.handle_start(&element, position)?;
                    self.handle_end(element.name().as_ref());
                }
                Ok(Event::End(element)) => self.handle_end(element.name().as_ref()),
                Ok(Event::Text(text)) => {
                    if self.state == ParseState::InComment {
                        let text = text.unescape().map_err(|e| {
                            self.parse_error(position, format!("bad comment text: {}", e))
                        })?;
                        self.current
                            .locale_comments
                            .insert(self.comment_locale.clone(), text.into_owned());
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(self.parse_error(position, e.to_string())),
            }
            buf.clear();
        }
        Ok(())
    }

    fn handle_start(&mut self, element: &BytesStart<'_>, position: usize) -> Result<()> {
        self.state = next_state(self.state, element.name().as_ref());
        match self.state {
            ParseState::InMimeType => {
                let name = attr(element, "type").unwrap_or_default();
                if name.is_empty() {
                    return Err(self.parse_error(
                        position,
                        "mime-type element without 'type' attribute".to_string(),
                    ));
                }
                self.current = MimeTypeData::new(name);
            }
            ParseState::InComment => {
                self.comment_locale =
                    attr(element, "xml:lang").unwrap_or_else(|| "default".to_string());
            }
            ParseState::InGenericIcon => {
                self.current.generic_icon_name = attr(element, "name");
            }
            ParseState::InIcon => {
                self.current.icon_name = attr(element, "name");
            }
            ParseState::InGlobPattern => {
                let pattern = attr(element, "pattern").unwrap_or_default();
                if !pattern.is_empty() {
                    // an absent or zero weight both mean "unspecified"
                    let weight = attr(element, "weight")
                        .and_then(|w| w.parse().ok())
                        .filter(|&w| w != 0)
                        .unwrap_or(DEFAULT_WEIGHT);
                    let case_sensitive =
                        attr(element, "case-sensitive").as_deref() == Some("true");
                    self.out.globs.push(ParsedGlob {
                        mime_type: self.current.name.clone(),
                        pattern: pattern.clone(),
                        weight,
                        case_sensitive,
                    });
                    if !self.current.glob_patterns.contains(&pattern) {
                        self.current.glob_patterns.push(pattern);
                    }
                }
            }
            ParseState::InGlobDeleteAll => {
                // discards the patterns declared before this point, even
                // within the same document
                self.current.glob_patterns.clear();
                let name = self.current.name.clone();
                self.out.globs.retain(|g| g.mime_type != name);
                self.current.has_glob_delete_all = true;
                self.out.glob_delete_all.push(name);
            }
            ParseState::InSubClass => {
                if let Some(parent) = attr(element, "type") {
                    if !parent.is_empty() {
                        self.out.parents.push((self.current.name.clone(), parent));
                    }
                }
            }
            ParseState::InAlias => {
                if let Some(alias) = attr(element, "type") {
                    if !alias.is_empty() {
                        self.out.aliases.push((alias, self.current.name.clone()));
                    }
                }
            }
            ParseState::InMagic => {
                self.magic_priority = match attr(element, "priority") {
                    Some(text) => text.parse().map_err(|_| {
                        self.parse_error(position, format!("bad magic priority '{}'", text))
                    })?,
                    None => DEFAULT_MAGIC_PRIORITY,
                };
                self.rule_arena.clear();
                self.rule_stack.clear();
            }
            ParseState::InMagicMatchRule => {
                let type_name = attr(element, "type").unwrap_or_default();
                let value = attr(element, "value").unwrap_or_default();
                let offsets = attr(element, "offset").unwrap_or_default();
                let mask = attr(element, "mask");
                let rule =
                    match MagicRule::new(&type_name, value.as_bytes(), &offsets, mask.as_deref()) {
                        Ok(rule) => Some(rule),
                        Err(e) => {
                            warn!(mime_type = %self.current.name, "dropping magic rule: {}", e);
                            None
                        }
                    };
                let index = self.rule_arena.len();
                self.rule_arena.push(RuleNode {
                    rule,
                    parent: self.rule_stack.last().copied(),
                });
                self.rule_stack.push(index);
            }
            ParseState::Error => {
                return Err(self.parse_error(
                    position,
                    format!(
                        "unexpected element '{}'",
                        String::from_utf8_lossy(element.name().as_ref())
                    ),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_end(&mut self, element: &[u8]) {
        match element {
            b"mime-info" => self.state = ParseState::Beginning,
            b"mime-type" => {
                let mut data = std::mem::take(&mut self.current);
                data.promote_primary_pattern();
                self.out.mime_types.push(data);
                self.state = ParseState::InMimeInfo;
            }
            b"match" => {
                self.rule_stack.pop();
                self.state = ParseState::InMagic;
            }
            b"magic" => {
                let mut matcher = MagicRuleMatcher::new(&self.current.name);
                matcher.set_priority(self.magic_priority);
                for rule in self.assemble_rules() {
                    matcher.add_rule(rule);
                }
                self.out.magic_matchers.push(matcher);
                self.state = ParseState::InMimeType;
            }
            _ => {}
        }
    }

    /// Builds the rule tree from the flat arena. Walking in reverse
    /// document order guarantees a node's children are already attached
    /// when the node itself moves into its parent; prepending keeps
    /// siblings in document order. Children of invalid rules are dropped.
    fn assemble_rules(&mut self) -> Vec<MagicRule> {
        let mut top_level = Vec::new();
        for index in (0..self.rule_arena.len()).rev() {
            let Some(rule) = self.rule_arena[index].rule.take() else {
                continue;
            };
            match self.rule_arena[index].parent {
                None => top_level.insert(0, rule),
                Some(parent) => {
                    if let Some(parent_rule) = self.rule_arena[parent].rule.as_mut() {
                        parent_rule.prepend_sub_match(rule);
                    }
                }
            }
        }
        self.rule_arena.clear();
        top_level
    }

    fn parse_error(&self, position: usize, message: String) -> MimeError {
        MimeError::Parse {
            line: line_at(self.source, position),
            message,
        }
    }
}

/// Unescaped attribute value, `None` when absent or malformed.
fn attr(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

/// 1-based line number of byte `position`.
fn line_at(source: &[u8], position: usize) -> u64 {
    let end = position.min(source.len());
    memchr::memchr_iter(b'\n', &source[..end]).count() as u64 + 1
}
