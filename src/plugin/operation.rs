//! Operation kinds used for capability matching.

use std::fmt;

/// The kind of operation a caller wants to perform on a URL.
///
/// Backends receive this in [`Backend::check_url`](super::Backend::check_url)
/// and answer whether they can serve the URL for it. Handle-based calls
/// (read, write, seek, close, readdir, closedir) have no kind of their own:
/// they are covered by [`Operation::Open`] and [`Operation::Opendir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// access(2)
    Access,
    /// chmod(2)
    Chmod,
    /// rename(2)
    Rename,
    /// symlink(2)
    Symlink,
    /// stat(2)
    Stat,
    /// lstat(2)
    Lstat,
    /// mkdir(2)
    Mkdir,
    /// Recursive mkdir (`mkdir -p`).
    MkdirRecursive,
    /// rmdir(2)
    Rmdir,
    /// opendir, readdir and closedir.
    Opendir,
    /// open, read, write, lseek and close.
    Open,
    /// getxattr(2)
    Getxattr,
    /// setxattr(2)
    Setxattr,
    /// listxattr(2)
    Listxattr,
    /// readlink(2)
    Readlink,
    /// unlink(2)
    Unlink,
    /// Staging: bring online, poll and release.
    BringOnline,
}

impl Operation {
    /// Every operation kind.
    pub const ALL: [Operation; 17] = [
        Operation::Access,
        Operation::Chmod,
        Operation::Rename,
        Operation::Symlink,
        Operation::Stat,
        Operation::Lstat,
        Operation::Mkdir,
        Operation::MkdirRecursive,
        Operation::Rmdir,
        Operation::Opendir,
        Operation::Open,
        Operation::Getxattr,
        Operation::Setxattr,
        Operation::Listxattr,
        Operation::Readlink,
        Operation::Unlink,
        Operation::BringOnline,
    ];

    /// Short lowercase name, used in logs and error prefixes.
    pub const fn name(self) -> &'static str {
        match self {
            Operation::Access => "access",
            Operation::Chmod => "chmod",
            Operation::Rename => "rename",
            Operation::Symlink => "symlink",
            Operation::Stat => "stat",
            Operation::Lstat => "lstat",
            Operation::Mkdir => "mkdir",
            Operation::MkdirRecursive => "mkdir_p",
            Operation::Rmdir => "rmdir",
            Operation::Opendir => "opendir",
            Operation::Open => "open",
            Operation::Getxattr => "getxattr",
            Operation::Setxattr => "setxattr",
            Operation::Listxattr => "listxattr",
            Operation::Readlink => "readlink",
            Operation::Unlink => "unlink",
            Operation::BringOnline => "bring_online",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
