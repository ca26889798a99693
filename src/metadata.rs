//! File metadata types exchanged between callers and backends.

use rustix::fs::{FileType, Mode, RawMode};
use std::time::SystemTime;

/// The subset of `struct stat` a storage backend can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// File type and permission bits, as in `st_mode`.
    pub mode: RawMode,
    /// Number of hard links.
    pub nlink: u64,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Size in bytes.
    pub size: u64,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
}

impl Default for FileStat {
    fn default() -> Self {
        Self {
            mode: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 0,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
        }
    }
}

impl FileStat {
    /// Stat of a regular file with the given permissions and size.
    pub fn regular(permissions: Mode, size: u64) -> Self {
        Self {
            mode: FileType::RegularFile.as_raw_mode() | permissions.bits(),
            size,
            ..Self::default()
        }
    }

    /// Stat of a directory with the given permissions.
    pub fn directory(permissions: Mode) -> Self {
        Self {
            mode: FileType::Directory.as_raw_mode() | permissions.bits(),
            nlink: 2,
            ..Self::default()
        }
    }

    /// The file type encoded in `mode`.
    pub fn file_type(&self) -> FileType {
        FileType::from_raw_mode(self.mode)
    }

    /// The permission bits encoded in `mode`.
    pub fn permissions(&self) -> Mode {
        Mode::from_raw_mode(self.mode)
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }
}

/// One directory entry returned by readdir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name. Relative to the directory, or absolute from the
    /// storage root when it starts with `/`.
    pub name: String,
    /// Entry type, when the backend knows it without a stat.
    pub file_type: Option<FileType>,
}

impl DirEntry {
    /// Create an entry of unknown type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: None,
        }
    }

    /// Set the entry type.
    pub fn with_type(mut self, file_type: FileType) -> Self {
        self.file_type = Some(file_type);
        self
    }
}

/// How setxattr treats an existing attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum XattrFlags {
    /// Create or replace.
    #[default]
    Any,
    /// Fail if the attribute exists.
    Create,
    /// Fail if the attribute does not exist.
    Replace,
}

/// Outcome of a bring-online request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatus {
    /// Request token, used to poll and release.
    pub token: String,
    /// Whether the file is already online.
    pub online: bool,
}

/// Outcome of a bring-online request covering several files.
///
/// `E` is the error type of the layer that produced it: backends fill it
/// with [`BackendError`](crate::BackendError), the dispatch engine hands
/// out [`Error`](crate::Error).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageBatch<E> {
    /// Token of the request, used to poll, release and abort. `None` when
    /// the request never reached a backend.
    pub token: Option<String>,
    /// One entry per requested URL, in request order: whether that file is
    /// online, or why it could not be staged.
    pub files: Vec<Result<bool, E>>,
}

impl<E> StageBatch<E> {
    /// Whether every file of the batch is online.
    pub fn all_online(&self) -> bool {
        self.files.iter().all(|file| matches!(file, Ok(true)))
    }
}
