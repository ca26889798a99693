//! Directory listing.

use super::{Context, finish, wrap};
use crate::error::{Error, Result};
use crate::fdesc::{DescriptorKey, FileHandle};
use crate::metadata::{DirEntry, FileStat};
use crate::plugin::Operation;

impl Context {
    /// Open a directory for listing. Returns the key of the new handle.
    pub fn opendir(&self, url: &str) -> Result<DescriptorKey> {
        let handle = self.dispatch_url_on("opendir", Operation::Opendir, url, |plugin| {
            let mut handle = plugin.backend().opendir(url)?;
            handle.retain_library(plugin.library());
            Ok(handle)
        })?;
        self.store_handle("opendir", handle, url, false)
    }

    /// Next entry, or `None` at the end of the listing.
    pub fn readdir(&self, key: DescriptorKey) -> Result<Option<DirEntry>> {
        let handle = self.directory("readdir", key)?;
        self.dispatch_handle("readdir", &handle, |backend| {
            wrap("readdir", backend.readdir(&handle))
        })
    }

    /// Next entry together with its metadata.
    ///
    /// Without a native action this is readdir followed by a stat of the
    /// entry's URL, which is dispatched like any other stat.
    pub fn readdir_plus(&self, key: DescriptorKey) -> Result<Option<(DirEntry, FileStat)>> {
        let handle = self.directory("readdir_plus", key)?;
        let native = self.dispatch_handle("readdir_plus", &handle, |backend| {
            match backend.readdir_plus(&handle) {
                Some(result) => wrap("readdir_plus", result).map(Native::Entry),
                None => Ok(Native::Unsupported),
            }
        })?;
        match native {
            Native::Entry(entry) => Ok(entry),
            Native::Unsupported => self.emulate_readdir_plus(&handle),
        }
    }

    fn emulate_readdir_plus(&self, handle: &FileHandle) -> Result<Option<(DirEntry, FileStat)>> {
        let Some(entry) = self.dispatch_handle("readdir_plus", handle, |backend| {
            wrap("readdir_plus", backend.readdir(handle))
        })?
        else {
            return Ok(None);
        };
        let dir_url = handle.path().ok_or_else(|| {
            Error::BadFileDescriptor(format!(
                "directory handle of {} has no url",
                handle.owner()
            ))
        })?;
        let url = child_url(dir_url, &entry.name);
        tracing::trace!(%url, "emulating readdir_plus with stat");
        let stat = self.stat(&url)?;
        Ok(Some((entry, stat)))
    }

    /// closedir(3).
    ///
    /// The key stays valid if the backend's closedir fails.
    pub fn closedir(&self, key: DescriptorKey) -> Result<()> {
        let handle = self.directory("closedir", key)?;
        self.dispatch_handle("closedir", &handle, |backend| {
            wrap("closedir", backend.closedir(&handle))
        })?;
        finish("closedir", self.directories().remove(key)).map(drop)
    }
}

enum Native {
    Entry(Option<(DirEntry, FileStat)>),
    Unsupported,
}

/// URL of a directory entry.
///
/// Relative names are appended to the directory URL. Names starting with
/// `/` are taken from the root of the directory's `scheme://host`.
pub(crate) fn child_url(dir_url: &str, name: &str) -> String {
    if name.starts_with('/') {
        return format!("{}{}", url_root(dir_url), name);
    }
    format!("{}/{}", dir_url.trim_end_matches('/'), name)
}

/// `scheme://host` part of `url`, or an empty string for plain paths.
fn url_root(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return "";
    };
    let authority = scheme_end + 3;
    match url[authority..].find('/') {
        Some(slash) => &url[..authority + slash],
        None => url,
    }
}
