//! Memory-mapped `mime.cache` buffer support.
//!
//! This module provides safe, validated access to the binary cache file
//! produced by `update-mime-database`. It handles file opening, header
//! validation, and bounds-checked primitive reads; the semantic walks over
//! the individual tables (glob lists, suffix tree, magic rules) live in the
//! binary provider.
//!
//! # Safety
//!
//! While memory-mapped files are inherently unsafe (file contents can
//! change), this module provides a safe API by:
//! - Validating the version header and table offsets on open
//! - Checking file size constraints
//! - Using bounds-checked accessors that return `Option` on overrun
//!
//! All multi-byte fields in the format are big-endian.
//!
//! # Example
//!
//! ```no_run
//! use mimey::cache_buffer::CacheBuffer;
//!
//! let cache = CacheBuffer::open("/usr/share/mime/mime.cache")?;
//! println!("Size: {} bytes", cache.size());
//! # Ok::<(), mimey::MimeError>(())
//! ```

use crate::error::{MimeError, Result};
use memchr::memchr;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::path::Path;

/// The only supported major version.
pub const MAJOR_VERSION: u16 = 1;

/// Supported minor versions (inclusive range).
pub const MINOR_VERSION_MIN: u16 = 1;
/// Supported minor versions (inclusive range).
pub const MINOR_VERSION_MAX: u16 = 2;

// Header field positions. The first four bytes hold the two u16 version
// fields; everything after is a u32 offset to one of the tables.
pub(crate) const POS_ALIAS_LIST: usize = 4;
pub(crate) const POS_PARENT_LIST: usize = 8;
pub(crate) const POS_LITERAL_LIST: usize = 12;
pub(crate) const POS_REVERSE_SUFFIX_TREE: usize = 16;
pub(crate) const POS_GLOB_LIST: usize = 20;
pub(crate) const POS_MAGIC_LIST: usize = 24;
pub(crate) const POS_ICONS_LIST: usize = 32;
pub(crate) const POS_GENERIC_ICONS_LIST: usize = 36;

const HEADER_SIZE: usize = 40;

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// A validated `mime.cache` buffer, memory-mapped or in memory.
///
/// Dropping the buffer unmaps the file. The buffer is `Send` but should not
/// be shared across threads without synchronization; the database keeps all
/// providers behind one lock.
pub struct CacheBuffer {
    data: Backing,
}

impl CacheBuffer {
    /// Opens and memory-maps a `mime.cache` file, validating the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is smaller than the
    /// 40-byte header, has an unsupported version, or has a table offset
    /// pointing outside the file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        let buffer = CacheBuffer {
            data: Backing::Mapped(mmap),
        };
        buffer.validate()?;
        Ok(buffer)
    }

    /// Wraps an in-memory cache image, validating the header.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let buffer = CacheBuffer {
            data: Backing::Owned(bytes),
        };
        buffer.validate()?;
        Ok(buffer)
    }

    fn validate(&self) -> Result<()> {
        let size = self.size();
        if size < HEADER_SIZE {
            return Err(MimeError::Cache(format!(
                "file too small: {} bytes (need at least {})",
                size, HEADER_SIZE
            )));
        }
        // get_u16 cannot fail below; the size check above covers the header
        let major = self.get_u16(0).unwrap_or(0);
        let minor = self.get_u16(2).unwrap_or(0);
        if major != MAJOR_VERSION || !(MINOR_VERSION_MIN..=MINOR_VERSION_MAX).contains(&minor) {
            return Err(MimeError::Cache(format!(
                "unsupported version {}.{}",
                major, minor
            )));
        }
        for pos in [
            POS_ALIAS_LIST,
            POS_PARENT_LIST,
            POS_LITERAL_LIST,
            POS_REVERSE_SUFFIX_TREE,
            POS_GLOB_LIST,
            POS_MAGIC_LIST,
            POS_ICONS_LIST,
            POS_GENERIC_ICONS_LIST,
        ] {
            let offset = self.get_u32(pos).unwrap_or(0) as usize;
            if offset >= size {
                return Err(MimeError::Cache(format!(
                    "table offset {} at header position {} is out of range",
                    offset, pos
                )));
            }
        }
        Ok(())
    }

    /// The whole buffer.
    pub fn as_slice(&self) -> &[u8] {
        match &self.data {
            Backing::Mapped(mmap) => &mmap[..],
            Backing::Owned(bytes) => bytes,
        }
    }

    /// Size of the buffer in bytes.
    pub fn size(&self) -> usize {
        self.as_slice().len()
    }

    /// Reads a big-endian u16, `None` if out of range.
    pub fn get_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.get_slice(offset, 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a big-endian u32, `None` if out of range.
    pub fn get_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.get_slice(offset, 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads the u32 table offset stored at header position `pos`.
    pub(crate) fn table_offset(&self, pos: usize) -> Option<usize> {
        self.get_u32(pos).map(|v| v as usize)
    }

    /// Gets a slice at a specific offset with bounds checking.
    ///
    /// Returns `None` if the offset plus length would exceed the buffer.
    pub fn get_slice(&self, offset: usize, length: usize) -> Option<&[u8]> {
        let end = offset.checked_add(length)?;
        self.as_slice().get(offset..end)
    }

    /// Reads the NUL-terminated UTF-8 string at `offset`.
    ///
    /// Returns `None` when the offset is out of range, no terminator is
    /// found, or the bytes are not valid UTF-8.
    pub fn get_str(&self, offset: usize) -> Option<&str> {
        let tail = self.as_slice().get(offset..)?;
        let nul = memchr(0, tail)?;
        std::str::from_utf8(&tail[..nul]).ok()
    }
}

impl fmt::Debug for CacheBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuffer")
            .field("size", &self.size())
            .field("version_major", &self.get_u16(0))
            .field("version_minor", &self.get_u16(2))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// A minimal valid image: version 1.2, every table offset pointing at
    /// an empty (count = 0) list appended after the header.
    pub(crate) fn minimal_image() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&2u16.to_be_bytes());
        // eight used table offsets plus the unused namespace slot at 28
        let empty_list = HEADER_SIZE as u32;
        for pos in (4..HEADER_SIZE).step_by(4) {
            let value = if pos == 28 { 0 } else { empty_list };
            data.extend_from_slice(&value.to_be_bytes());
        }
        data.extend_from_slice(&0u32.to_be_bytes());
        data
    }

    fn create_test_file(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_empty_file() {
        let file = create_test_file(&[]);
        let result = CacheBuffer::open(file.path());
        assert!(matches!(result, Err(MimeError::Cache(_))));
    }

    #[test]
    fn test_file_too_small() {
        let file = create_test_file(&[0; 10]);
        let result = CacheBuffer::open(file.path());
        assert!(matches!(result, Err(MimeError::Cache(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = minimal_image();
        data[0..2].copy_from_slice(&2u16.to_be_bytes());
        assert!(matches!(
            CacheBuffer::from_bytes(data),
            Err(MimeError::Cache(_))
        ));

        let mut data = minimal_image();
        data[2..4].copy_from_slice(&3u16.to_be_bytes());
        assert!(matches!(
            CacheBuffer::from_bytes(data),
            Err(MimeError::Cache(_))
        ));
    }

    #[test]
    fn test_table_offset_out_of_range() {
        let mut data = minimal_image();
        data[POS_GLOB_LIST..POS_GLOB_LIST + 4].copy_from_slice(&0xffff_u32.to_be_bytes());
        assert!(matches!(
            CacheBuffer::from_bytes(data),
            Err(MimeError::Cache(_))
        ));
    }

    #[test]
    fn test_valid_image_opens() {
        let data = minimal_image();
        let file = create_test_file(&data);
        let cache = CacheBuffer::open(file.path()).expect("valid image");
        assert_eq!(cache.size(), data.len());
        assert_eq!(cache.get_u16(0), Some(1));
        assert_eq!(cache.get_u16(2), Some(2));
        assert_eq!(cache.table_offset(POS_GLOB_LIST), Some(HEADER_SIZE));
        assert_eq!(cache.get_u32(HEADER_SIZE), Some(0));
    }

    #[test]
    fn test_bounds_checked_reads() {
        let cache = CacheBuffer::from_bytes(minimal_image()).unwrap();
        let size = cache.size();
        assert!(cache.get_u32(size).is_none());
        assert!(cache.get_u32(size - 3).is_none());
        assert!(cache.get_u16(size - 1).is_none());
        assert!(cache.get_slice(0, size + 1).is_none());
        assert!(cache.get_slice(usize::MAX, 2).is_none());
    }

    #[test]
    fn test_get_str() {
        let mut data = minimal_image();
        let offset = data.len();
        data.extend_from_slice(b"text/plain\0");
        let cache = CacheBuffer::from_bytes(data).unwrap();
        assert_eq!(cache.get_str(offset), Some("text/plain"));
        // unterminated tail
        assert_eq!(cache.get_str(offset + 11), None);
        assert_eq!(cache.get_str(usize::MAX), None);
    }

    #[test]
    fn test_nonexistent_file() {
        let result = CacheBuffer::open("/nonexistent/path/to/mime.cache");
        assert!(matches!(result, Err(MimeError::Io(_))));
    }
}
