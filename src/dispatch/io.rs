//! File I/O: open, read/write, positioned I/O and close.
//!
//! Backends without native pread/pwrite get them emulated as seek followed
//! by read/write, with the handle's positional lock held across the pair.
//! Emulated positioned calls on one handle therefore never interleave; calls
//! on different handles never wait for each other. Plain read/write/lseek do
//! not take the lock.

use super::{Context, finish, wrap};
use crate::error::{BackendResult, Error, Result};
use crate::fdesc::{DescriptorKey, FileHandle};
use crate::observability;
use crate::plugin::{Backend, Operation};
use rustix::fs::{Mode, OFlags};
use std::io::SeekFrom;
use std::sync::Arc;

impl Context {
    /// open(2). Returns the key of the new file handle.
    pub fn open(&self, url: &str, flags: OFlags, mode: Mode) -> Result<DescriptorKey> {
        let handle = self.dispatch_url_on("open", Operation::Open, url, |plugin| {
            let mut handle = plugin.backend().open(url, flags, mode)?;
            handle.retain_library(plugin.library());
            Ok(handle)
        })?;
        self.store_handle("open", handle, url, true)
    }

    /// Put a freshly opened handle into its table.
    ///
    /// If the table is full the handle is closed again before the error is
    /// returned.
    pub(super) fn store_handle(
        &self,
        operation: &'static str,
        mut handle: FileHandle,
        url: &str,
        is_file: bool,
    ) -> Result<DescriptorKey> {
        handle.set_path_if_missing(url);
        let handle = Arc::new(handle);
        let table = if is_file {
            self.files()
        } else {
            self.directories()
        };
        match table.insert(handle.clone()) {
            Ok(key) => Ok(key),
            Err(err) => {
                tracing::debug!(operation, error = %err, "no room for handle, closing it");
                let closed = self.dispatch_handle(operation, &handle, |backend| {
                    let result = if is_file {
                        backend.close(&handle)
                    } else {
                        backend.closedir(&handle)
                    };
                    wrap(operation, result)
                });
                if let Err(close_err) = closed {
                    tracing::warn!(operation, error = %close_err, "closing rejected handle failed");
                }
                Err(err)
            }
        }
    }

    /// read(2) at the current position. Returns the number of bytes read.
    ///
    /// An empty buffer is rejected with [`Error::InvalidArgument`].
    pub fn read(&self, key: DescriptorKey, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return finish("read", Err(empty_buffer()));
        }
        let handle = self.file("read", key)?;
        self.dispatch_handle("read", &handle, |backend| {
            let n = wrap("read", backend.read(&handle, buf))?;
            advance(&handle, n);
            Ok(n)
        })
    }

    /// write(2) at the current position. Returns the number of bytes written.
    ///
    /// An empty buffer is rejected with [`Error::InvalidArgument`].
    pub fn write(&self, key: DescriptorKey, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return finish("write", Err(empty_buffer()));
        }
        let handle = self.file("write", key)?;
        self.dispatch_handle("write", &handle, |backend| {
            let n = wrap("write", backend.write(&handle, buf))?;
            advance(&handle, n);
            Ok(n)
        })
    }

    /// pread(2): read at `offset`.
    pub fn pread(&self, key: DescriptorKey, buf: &mut [u8], offset: u64) -> Result<usize> {
        let handle = self.file("pread", key)?;
        self.dispatch_handle("pread", &handle, |backend| {
            if let Some(result) = backend.pread(&handle, buf, offset) {
                return wrap("pread", result);
            }
            emulate("pread", backend, &handle, offset, buf.len(), |backend| {
                backend.read(&handle, buf)
            })
        })
    }

    /// pwrite(2): write at `offset`.
    pub fn pwrite(&self, key: DescriptorKey, buf: &[u8], offset: u64) -> Result<usize> {
        let handle = self.file("pwrite", key)?;
        self.dispatch_handle("pwrite", &handle, |backend| {
            if let Some(result) = backend.pwrite(&handle, buf, offset) {
                return wrap("pwrite", result);
            }
            emulate("pwrite", backend, &handle, offset, buf.len(), |backend| {
                backend.write(&handle, buf)
            })
        })
    }

    /// lseek(2). Returns the new absolute position.
    pub fn lseek(&self, key: DescriptorKey, pos: SeekFrom) -> Result<u64> {
        let handle = self.file("lseek", key)?;
        self.dispatch_handle("lseek", &handle, |backend| {
            let offset = wrap("lseek", backend.lseek(&handle, pos))?;
            handle.set_offset(offset);
            Ok(offset)
        })
    }

    /// close(2).
    ///
    /// The key stays valid if the backend's close fails, so the caller may
    /// retry.
    pub fn close(&self, key: DescriptorKey) -> Result<()> {
        let handle = self.file("close", key)?;
        self.dispatch_handle("close", &handle, |backend| {
            wrap("close", backend.close(&handle))
        })?;
        finish("close", self.files().remove(key)).map(drop)
    }
}

fn empty_buffer() -> Error {
    Error::InvalidArgument("empty buffer".to_string())
}

fn advance(handle: &FileHandle, n: usize) {
    handle.set_offset(handle.offset().saturating_add(n as u64));
}

/// Seek to `offset` and run `transfer` while holding the handle's lock.
fn emulate(
    operation: &'static str,
    backend: &dyn Backend,
    handle: &FileHandle,
    offset: u64,
    len: usize,
    transfer: impl FnOnce(&dyn Backend) -> BackendResult<usize>,
) -> Result<usize> {
    observability::trace_emulated_io(operation, handle.owner(), offset, len);
    observability::record_emulated_io(operation);

    let _positional = handle.lock_positional();
    let actual = wrap(operation, backend.lseek(handle, SeekFrom::Start(offset)))?;
    if actual != offset {
        return Err(Error::Overflow {
            operation,
            requested: offset,
            actual,
        });
    }
    let n = wrap(operation, transfer(backend))?;
    handle.set_offset(offset.saturating_add(n as u64));
    Ok(n)
}
