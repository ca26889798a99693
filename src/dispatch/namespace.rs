//! URL-addressed namespace operations.

use super::{Context, batch_head, finish, spread, wrap};
use crate::error::{BackendResult, Error, Result};
use crate::metadata::{FileStat, XattrFlags};
use crate::observability;
use crate::plugin::{Backend, Operation};
use rustix::fs::{Access, Mode};
use rustix::io::Errno;

impl Context {
    /// stat(2)
    pub fn stat(&self, url: &str) -> Result<FileStat> {
        self.dispatch_url("stat", Operation::Stat, url, |backend| backend.stat(url))
    }

    /// lstat(2)
    pub fn lstat(&self, url: &str) -> Result<FileStat> {
        self.dispatch_url("lstat", Operation::Lstat, url, |backend| backend.lstat(url))
    }

    /// access(2)
    pub fn access(&self, url: &str, mode: Access) -> Result<()> {
        self.dispatch_url("access", Operation::Access, url, |backend| {
            backend.access(url, mode)
        })
    }

    /// chmod(2)
    pub fn chmod(&self, url: &str, mode: Mode) -> Result<()> {
        self.dispatch_url("chmod", Operation::Chmod, url, |backend| {
            backend.chmod(url, mode)
        })
    }

    /// readlink(2)
    pub fn readlink(&self, url: &str) -> Result<String> {
        self.dispatch_url("readlink", Operation::Readlink, url, |backend| {
            backend.readlink(url)
        })
    }

    /// mkdir(2)
    pub fn mkdir(&self, url: &str, mode: Mode) -> Result<()> {
        self.dispatch_url("mkdir", Operation::Mkdir, url, |backend| {
            backend.mkdir(url, mode, false)
        })
    }

    /// Create a directory and any missing parent.
    ///
    /// An existing directory is not an error.
    pub fn mkdir_p(&self, url: &str, mode: Mode) -> Result<()> {
        self.dispatch_url("mkdir_p", Operation::MkdirRecursive, url, |backend| {
            match backend.mkdir(url, mode, true) {
                Err(err) if err.errno() == Errno::EXIST => Ok(()),
                other => other,
            }
        })
    }

    /// rmdir(2)
    pub fn rmdir(&self, url: &str) -> Result<()> {
        self.dispatch_url("rmdir", Operation::Rmdir, url, |backend| backend.rmdir(url))
    }

    /// unlink(2)
    pub fn unlink(&self, url: &str) -> Result<()> {
        self.dispatch_url("unlink", Operation::Unlink, url, |backend| backend.unlink(url))
    }

    /// Unlink several URLs, returning one result per URL in the same order.
    ///
    /// The backend is chosen from the first URL and serves the whole list.
    /// If it has no bulk action, it unlinks each URL on its own. If no
    /// backend claims the first URL, every URL gets that error.
    pub fn unlink_list(&self, urls: &[&str]) -> Vec<Result<()>> {
        let _span = observability::instrument_dispatch("unlink_list", batch_head(urls));
        let plugin = match self.resolve_batch("unlink_list", Operation::Unlink, urls) {
            Ok(plugin) => plugin,
            Err(results) => return results,
        };
        observability::record_dispatch("unlink_list", plugin.name());
        let _timer = observability::DispatchTimer::start("unlink_list");

        let backend = plugin.backend();
        match backend.unlink_list(urls) {
            Some(results) => spread("unlink_list", plugin.name(), urls.len(), Ok(results)),
            None => {
                tracing::trace!(plugin = plugin.name(), count = urls.len(), "unlinking one by one");
                urls.iter()
                    .map(|url| finish("unlink_list", wrap("unlink_list", backend.unlink(url))))
                    .collect()
            }
        }
    }

    /// rename(2). Both URLs must be served by the same backend.
    pub fn rename(&self, old_url: &str, new_url: &str) -> Result<()> {
        self.dispatch_pair("rename", Operation::Rename, old_url, new_url, |backend| {
            backend.rename(old_url, new_url)
        })
    }

    /// symlink(2). Both URLs must be served by the same backend.
    pub fn symlink(&self, target_url: &str, link_url: &str) -> Result<()> {
        self.dispatch_pair("symlink", Operation::Symlink, target_url, link_url, |backend| {
            backend.symlink(target_url, link_url)
        })
    }

    fn dispatch_pair(
        &self,
        operation: &'static str,
        kind: Operation,
        first: &str,
        second: &str,
        action: impl FnOnce(&dyn Backend) -> BackendResult<()>,
    ) -> Result<()> {
        let _span = observability::instrument_dispatch(operation, first);
        let result = self.resolve_url(first, kind).and_then(|source| {
            let destination = self.resolve_url(second, kind)?;
            if source.name() != destination.name() {
                return Err(Error::CrossBackend {
                    operation,
                    source_plugin: source.name().to_string(),
                    destination_plugin: destination.name().to_string(),
                });
            }
            observability::record_dispatch(operation, source.name());
            let _timer = observability::DispatchTimer::start(operation);
            wrap(operation, action(source.backend()))
        });
        finish(operation, result)
    }

    /// getxattr(2)
    pub fn getxattr(&self, url: &str, name: &str) -> Result<Vec<u8>> {
        self.dispatch_url("getxattr", Operation::Getxattr, url, |backend| {
            backend.getxattr(url, name)
        })
    }

    /// setxattr(2)
    pub fn setxattr(&self, url: &str, name: &str, value: &[u8], flags: XattrFlags) -> Result<()> {
        self.dispatch_url("setxattr", Operation::Setxattr, url, |backend| {
            backend.setxattr(url, name, value, flags)
        })
    }

    /// listxattr(2)
    pub fn listxattr(&self, url: &str) -> Result<Vec<String>> {
        self.dispatch_url("listxattr", Operation::Listxattr, url, |backend| {
            backend.listxattr(url)
        })
    }
}
