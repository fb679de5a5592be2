//! Mimey - MIME Type Resolution for File Names and Content
//!
//! Mimey resolves MIME types the way desktop environments do: glob
//! patterns over file names, magic byte rules over content, and the
//! inheritance/alias graph of the shared-mime-info database. It reads the
//! compiled `mime.cache` format directly via mmap, falls back to parsing
//! the XML definition sources, and accepts extra definitions at runtime.
//!
//! # Quick Start
//!
//! ```rust
//! use mimey::MimeDatabase;
//!
//! // A database over explicit mime directories; `MimeDatabase::new()`
//! // uses the standard XDG locations instead.
//! let db = MimeDatabase::with_cache_dirs(Vec::new());
//!
//! // Definitions can also be registered at runtime
//! db.add_definition_data(
//!     "my-app",
//!     br#"<mime-info>
//!       <mime-type type="application/x-report">
//!         <comment>Report file</comment>
//!         <sub-class-of type="text/plain"/>
//!         <glob pattern="*.report"/>
//!         <magic priority="60">
//!           <match type="string" value="REPORT1" offset="0"/>
//!         </magic>
//!       </mime-type>
//!     </mime-info>"#,
//! )?;
//!
//! // By file name: every candidate at the best glob weight
//! assert_eq!(db.mime_type_for_file_name("q3.report"), ["application/x-report"]);
//!
//! // By content: the type plus the accuracy of the match
//! let (mime, accuracy) = db.mime_type_for_data(b"REPORT1 2026-08");
//! assert_eq!(mime.name(), "application/x-report");
//! assert_eq!(accuracy, 60);
//!
//! // Inheritance
//! assert!(db.inherits("application/x-report", "text/plain"));
//! # Ok::<(), mimey::MimeError>(())
//! ```
//!
//! # Resolution Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Providers (in precedence order)            │
//! ├─────────────────────────────────────────────┤
//! │  1. Runtime definitions (newest first)      │
//! │  2. mime directories:                       │
//! │       mime.cache  (mmap, binary tables)     │
//! │       packages/*.xml  (fallback parse)      │
//! └─────────────────────────────────────────────┘
//!          ↓ per query
//! ┌─────────────────────────────────────────────┐
//! │  File name: literals → suffix tree → globs  │
//! │  Content:   magic rules → text heuristic    │
//! │  Combined:  unique glob wins, else sniff    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! A type defined by an earlier provider completely shadows later
//! definitions of the same name, globs and magic rules included.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
/// Memory-mapped `mime.cache` access
pub mod cache_buffer;
/// The aggregating database and its query surface
pub mod database;
/// Error types for mime database operations
pub mod error;
/// Glob pattern compilation and matching
pub mod glob;
/// Glob match accumulation across providers
pub mod glob_match;
/// Magic byte rules for content sniffing
pub mod magic;
/// MIME type handles and metadata
pub mod mime_type;

mod binary_provider;
mod provider;
mod xml_parser;
mod xml_provider;

// Re-exports for the common case

/// The MIME resolution database
pub use crate::database::MimeDatabase;

/// Error and result types
pub use crate::error::{MimeError, Result};

/// MIME type handle
pub use crate::mime_type::MimeType;

/// Well-known type names
pub use crate::mime_type::{
    DEFAULT_MIME_TYPE, DIRECTORY_MIME_TYPE, TEXT_MIME_TYPE, ZEROSIZE_MIME_TYPE,
};

/// Glob pattern building blocks
pub use crate::glob::{GlobPattern, MatchMode, DEFAULT_WEIGHT};

/// Accumulated glob match state
pub use crate::glob_match::GlobMatchResult;

/// Magic rule building blocks
pub use crate::magic::{MagicRule, MagicRuleMatcher, MagicRuleType};
