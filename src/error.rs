//! Error types for the mimey library.

use std::fmt;

/// Result type alias for mime database operations
pub type Result<T> = std::result::Result<T, MimeError>;

/// Main error type for mime database operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeError {
    /// Glob pattern errors (malformed character class, trailing backslash)
    InvalidGlob(String),

    /// Magic rule errors (bad offset syntax, empty value, unparseable mask)
    InvalidMagicRule(String),

    /// I/O errors
    Io(String),

    /// Binary cache format errors (bad version, truncated tables)
    Cache(String),

    /// XML definition parse errors, with the line the parser stopped at
    Parse {
        /// 1-based line number in the source document
        line: u64,
        /// Description of what went wrong
        message: String,
    },
}

impl fmt::Display for MimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MimeError::InvalidGlob(msg) => write!(f, "Invalid glob pattern: {}", msg),
            MimeError::InvalidMagicRule(msg) => write!(f, "Invalid magic rule: {}", msg),
            MimeError::Io(msg) => write!(f, "I/O error: {}", msg),
            MimeError::Cache(msg) => write!(f, "Cache format error: {}", msg),
            MimeError::Parse { line, message } => {
                write!(f, "Parse error at line {}: {}", line, message)
            }
        }
    }
}

impl std::error::Error for MimeError {}

impl From<std::io::Error> for MimeError {
    fn from(err: std::io::Error) -> Self {
        MimeError::Io(err.to_string())
    }
}
