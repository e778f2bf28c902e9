//! File records
//!
//! A [`Record`] is the indexed metadata for one regular file. Records are
//! immutable once built and carry no identity beyond their path; the store
//! assigns its own surrogate key.

use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Indexed metadata for one file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    path: String,
    size: u64,
    modified_at: i64,
    extension: String,
}

impl Record {
    /// Build a record, deriving the extension from the path
    pub fn new(path: impl Into<String>, size: u64, modified_at: i64) -> Self {
        let path = path.into();
        let extension = extension_of(file_name(&path));
        Self {
            path,
            size,
            modified_at,
            extension,
        }
    }

    /// Build a record from already-stored columns
    ///
    /// Used by the store when reading rows back; the extension is trusted.
    pub(crate) fn from_parts(path: String, size: u64, modified_at: i64, extension: String) -> Self {
        Self {
            path,
            size,
            modified_at,
            extension,
        }
    }

    /// Extract a record from filesystem metadata
    ///
    /// Fails if the modification time is unavailable on this platform.
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> io::Result<Self> {
        let modified = metadata.modified()?;
        Ok(Self::new(
            path.to_string_lossy().into_owned(),
            metadata.len(),
            system_time_to_millis(modified),
        ))
    }

    /// Absolute path, the unique key
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Modification time, milliseconds since the Unix epoch
    pub fn modified_at(&self) -> i64 {
        self.modified_at
    }

    /// Lowercase extension without the dot, possibly empty
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// Derive the lowercase extension of a file name
///
/// The extension is everything after the last `.`, unless that dot is the
/// first or last character of the name.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => name[idx + 1..].to_lowercase(),
        _ => String::new(),
    }
}

/// Final path segment, accepting either separator
fn file_name(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path)
}

fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
    }
}
