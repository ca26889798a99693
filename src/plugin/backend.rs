//! The contract every storage backend implements.

use super::Operation;
use crate::error::{BackendError, BackendResult};
use crate::fdesc::FileHandle;
use crate::metadata::{DirEntry, FileStat, StageBatch, StageStatus, XattrFlags};
use rustix::fs::{Access, Mode, OFlags};
use std::io::SeekFrom;
use std::time::Duration;

/// Priority for backends that only move data.
pub const PRIORITY_DATA: i32 = 0;
/// Priority for backends that provide namespace operations (catalogs).
pub const PRIORITY_CATALOG: i32 = 100;
/// Priority for caching backends, consulted before everything else.
pub const PRIORITY_CACHE: i32 = 200;

/// A storage backend: capability predicate plus one action per operation.
///
/// Only [`name`](Self::name) and [`check_url`](Self::check_url) are required.
/// Every other action has a default body that reports the action as not
/// implemented (`ENOSYS`), so a backend overrides exactly what it supports.
///
/// A few actions return `Option`: `None` means "no native implementation"
/// and lets the dispatch engine fall back to an emulation built from the
/// simpler actions (positioned I/O from seek + read/write, `readdir_plus`
/// from readdir + stat, bulk unlink from single unlinks).
///
/// Backends are shared between threads and the dispatch engine never
/// serialises calls into them; any internal state needs its own locking.
pub trait Backend: Send + Sync {
    /// Unique backend name. Handles created by this backend carry it.
    fn name(&self) -> &str;

    /// Backends with a higher priority are asked first.
    fn priority(&self) -> i32 {
        PRIORITY_DATA
    }

    /// Whether this backend can serve `url` for `operation`.
    ///
    /// Called for every URL-addressed dispatch, so it must be cheap. An error
    /// aborts the lookup instead of moving on to the next backend.
    fn check_url(&self, url: &str, operation: Operation) -> BackendResult<bool>;

    /// Release backend resources. Called once, when the registry is torn down.
    fn teardown(&self) {}

    /// access(2)
    fn access(&self, _url: &str, _mode: Access) -> BackendResult<()> {
        Err(BackendError::unsupported("access"))
    }

    /// chmod(2)
    fn chmod(&self, _url: &str, _mode: Mode) -> BackendResult<()> {
        Err(BackendError::unsupported("chmod"))
    }

    /// rename(2). Both URLs are served by this backend.
    fn rename(&self, _old_url: &str, _new_url: &str) -> BackendResult<()> {
        Err(BackendError::unsupported("rename"))
    }

    /// symlink(2). Both URLs are served by this backend.
    fn symlink(&self, _target_url: &str, _link_url: &str) -> BackendResult<()> {
        Err(BackendError::unsupported("symlink"))
    }

    /// stat(2)
    fn stat(&self, _url: &str) -> BackendResult<FileStat> {
        Err(BackendError::unsupported("stat"))
    }

    /// lstat(2)
    fn lstat(&self, _url: &str) -> BackendResult<FileStat> {
        Err(BackendError::unsupported("lstat"))
    }

    /// readlink(2)
    fn readlink(&self, _url: &str) -> BackendResult<String> {
        Err(BackendError::unsupported("readlink"))
    }

    /// mkdir(2). With `recursive` set, missing parents are created too.
    fn mkdir(&self, _url: &str, _mode: Mode, _recursive: bool) -> BackendResult<()> {
        Err(BackendError::unsupported("mkdir"))
    }

    /// rmdir(2)
    fn rmdir(&self, _url: &str) -> BackendResult<()> {
        Err(BackendError::unsupported("rmdir"))
    }

    /// unlink(2)
    fn unlink(&self, _url: &str) -> BackendResult<()> {
        Err(BackendError::unsupported("unlink"))
    }

    /// Unlink several URLs in one request, one result per URL.
    fn unlink_list(&self, _urls: &[&str]) -> Option<Vec<BackendResult<()>>> {
        None
    }

    /// Open a directory for listing.
    fn opendir(&self, _url: &str) -> BackendResult<FileHandle> {
        Err(BackendError::unsupported("opendir"))
    }

    /// Next entry of an open directory, `None` at the end.
    fn readdir(&self, _dir: &FileHandle) -> BackendResult<Option<DirEntry>> {
        Err(BackendError::unsupported("readdir"))
    }

    /// Next entry together with its metadata.
    fn readdir_plus(
        &self,
        _dir: &FileHandle,
    ) -> Option<BackendResult<Option<(DirEntry, FileStat)>>> {
        None
    }

    /// Close a directory handle.
    fn closedir(&self, _dir: &FileHandle) -> BackendResult<()> {
        Err(BackendError::unsupported("closedir"))
    }

    /// open(2)
    fn open(&self, _url: &str, _flags: OFlags, _mode: Mode) -> BackendResult<FileHandle> {
        Err(BackendError::unsupported("open"))
    }

    /// read(2) at the handle's current position.
    fn read(&self, _file: &FileHandle, _buf: &mut [u8]) -> BackendResult<usize> {
        Err(BackendError::unsupported("read"))
    }

    /// write(2) at the handle's current position.
    fn write(&self, _file: &FileHandle, _buf: &[u8]) -> BackendResult<usize> {
        Err(BackendError::unsupported("write"))
    }

    /// Native pread(2).
    fn pread(
        &self,
        _file: &FileHandle,
        _buf: &mut [u8],
        _offset: u64,
    ) -> Option<BackendResult<usize>> {
        None
    }

    /// Native pwrite(2).
    fn pwrite(&self, _file: &FileHandle, _buf: &[u8], _offset: u64) -> Option<BackendResult<usize>> {
        None
    }

    /// lseek(2). Returns the new absolute position.
    fn lseek(&self, _file: &FileHandle, _pos: SeekFrom) -> BackendResult<u64> {
        Err(BackendError::unsupported("lseek"))
    }

    /// close(2)
    fn close(&self, _file: &FileHandle) -> BackendResult<()> {
        Err(BackendError::unsupported("close"))
    }

    /// getxattr(2)
    fn getxattr(&self, _url: &str, _name: &str) -> BackendResult<Vec<u8>> {
        Err(BackendError::unsupported("getxattr"))
    }

    /// listxattr(2)
    fn listxattr(&self, _url: &str) -> BackendResult<Vec<String>> {
        Err(BackendError::unsupported("listxattr"))
    }

    /// setxattr(2)
    fn setxattr(
        &self,
        _url: &str,
        _name: &str,
        _value: &[u8],
        _flags: XattrFlags,
    ) -> BackendResult<()> {
        Err(BackendError::unsupported("setxattr"))
    }

    /// Ask the storage to stage a file from tape to disk.
    fn bring_online(
        &self,
        _url: &str,
        _pin_time: Duration,
        _timeout: Duration,
        _asynchronous: bool,
    ) -> BackendResult<StageStatus> {
        Err(BackendError::unsupported("bring_online"))
    }

    /// Check a staging request. Returns true once the file is online.
    fn bring_online_poll(&self, _url: &str, _token: &str) -> BackendResult<bool> {
        Err(BackendError::unsupported("bring_online_poll"))
    }

    /// Release the pin taken by a staging request.
    fn release_file(&self, _url: &str, _token: &str) -> BackendResult<()> {
        Err(BackendError::unsupported("release_file"))
    }

    /// Stage several files in one request.
    ///
    /// The list actions below all follow the same shape: an `Err` fails the
    /// whole batch, an `Ok` carries one result per URL in request order.
    fn bring_online_list(
        &self,
        _urls: &[&str],
        _pin_time: Duration,
        _timeout: Duration,
        _asynchronous: bool,
    ) -> BackendResult<StageBatch<BackendError>> {
        Err(BackendError::unsupported("bring_online_list"))
    }

    /// Check a batch staging request, one online flag per URL.
    fn bring_online_poll_list(
        &self,
        _urls: &[&str],
        _token: &str,
    ) -> BackendResult<Vec<BackendResult<bool>>> {
        Err(BackendError::unsupported("bring_online_poll_list"))
    }

    /// Release the pins of a batch staging request.
    fn release_file_list(
        &self,
        _urls: &[&str],
        _token: &str,
    ) -> BackendResult<Vec<BackendResult<()>>> {
        Err(BackendError::unsupported("release_file_list"))
    }

    /// Cancel pending staging requests.
    fn abort_files(&self, _urls: &[&str], _token: &str) -> BackendResult<Vec<BackendResult<()>>> {
        Err(BackendError::unsupported("abort_files"))
    }
}
