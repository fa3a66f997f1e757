//! Metadata values for backend objects.
//!
//! [`EntryInfo`] is what a backend reports for an object. [`RestMetaData`]
//! is the view handed to the WebDAV engine; besides real backend metadata it
//! covers files that were opened for creation but not yet flushed, which
//! have no remote counterpart to stat.

use dav_server::fs::{DavMetaData, FsError};
use std::time::SystemTime;

/// Default permission for files created through the adapter.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default permission for directories created through the adapter.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Metadata of a backend object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Base name of the object (`""` for the root).
    pub name: String,
    /// Content length in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Whether the object is a directory.
    pub is_dir: bool,
    /// Permission bits.
    pub mode: u32,
}

impl EntryInfo {
    /// Metadata for a file, stamped with the current time.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            modified: SystemTime::now(),
            is_dir: false,
            mode: DEFAULT_FILE_MODE,
        }
    }

    /// Metadata for a directory, stamped with the current time.
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            modified: SystemTime::now(),
            is_dir: true,
            mode: DEFAULT_DIR_MODE,
        }
    }

    #[must_use]
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = modified;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// Stand-in metadata for a file opened with create intent and not yet flushed.
///
/// Always reports zero length and a regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub name: String,
    pub mode: u32,
    pub created: SystemTime,
}

impl PendingFile {
    pub fn new(name: impl Into<String>, mode: u32) -> Self {
        Self {
            name: name.into(),
            mode,
            created: SystemTime::now(),
        }
    }
}

/// Metadata handed to the WebDAV engine.
#[derive(Debug, Clone)]
pub enum RestMetaData {
    /// Metadata reported by the backend.
    Entry(EntryInfo),
    /// Synthetic metadata for a created-but-unflushed file.
    Pending(PendingFile),
}

impl RestMetaData {
    /// Base name of the object.
    pub fn name(&self) -> &str {
        match self {
            RestMetaData::Entry(e) => &e.name,
            RestMetaData::Pending(p) => &p.name,
        }
    }

    /// Permission bits.
    pub fn mode(&self) -> u32 {
        match self {
            RestMetaData::Entry(e) => e.mode,
            RestMetaData::Pending(p) => p.mode,
        }
    }

    /// Returns true for synthetic metadata.
    pub fn is_pending(&self) -> bool {
        matches!(self, RestMetaData::Pending(_))
    }
}

impl From<EntryInfo> for RestMetaData {
    fn from(info: EntryInfo) -> Self {
        RestMetaData::Entry(info)
    }
}

impl From<PendingFile> for RestMetaData {
    fn from(pending: PendingFile) -> Self {
        RestMetaData::Pending(pending)
    }
}

impl DavMetaData for RestMetaData {
    fn len(&self) -> u64 {
        match self {
            RestMetaData::Entry(e) => e.size,
            RestMetaData::Pending(_) => 0,
        }
    }

    fn modified(&self) -> Result<SystemTime, FsError> {
        let time = match self {
            RestMetaData::Entry(e) => e.modified,
            RestMetaData::Pending(p) => p.created,
        };
        Ok(time)
    }

    fn is_dir(&self) -> bool {
        match self {
            RestMetaData::Entry(e) => e.is_dir,
            RestMetaData::Pending(_) => false,
        }
    }

    fn is_file(&self) -> bool {
        !self.is_dir()
    }

    fn is_symlink(&self) -> bool {
        false
    }

    fn created(&self) -> Result<SystemTime, FsError> {
        // Backends don't report a creation time
        self.modified()
    }

    fn executable(&self) -> Result<bool, FsError> {
        Ok(self.is_file() && self.mode() & 0o111 != 0)
    }
}
