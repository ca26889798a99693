//! The dispatch engine.
//!
//! A [`Context`] owns one [`Registry`] and the descriptor tables for files
//! and directories. Every public operation is one of two shapes:
//!
//! - **URL-addressed** (stat, mkdir, rename, open, ...): the registry picks
//!   the first backend, in priority order, whose predicate accepts the URL for
//!   the operation kind, and the matching action runs.
//! - **Handle-addressed** (read, lseek, readdir, close, ...): the key is looked
//!   up in the descriptor table and the backend is found again by the
//!   handle's owner name. No predicate runs.
//!
//! Backend errors come back as [`Error::Backend`], tagged with the name of
//! the public operation that produced them.

mod directory;
mod io;
mod namespace;
mod staging;

use crate::config::DispatchConfig;
use crate::error::{BackendError, BackendResult, Error, Result};
use crate::fdesc::{DescriptorKey, DescriptorTable, FileHandle};
use crate::observability::{self, DispatchTimer};
use crate::plugin::{Backend, Operation, PluginDescriptor, Registry};
use rustix::io::Errno;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// One storage session: backends, open files and open directories.
///
/// A context is `Send + Sync`; share it between threads behind an `Arc`.
/// Dropping it tears the backends down.
///
/// # Example
///
/// ```rust
/// use gridio::{Context, DispatchConfig, Error};
///
/// let context = Context::new(DispatchConfig::in_process());
/// let err = context.stat("nothing://claims/this").unwrap_err();
/// assert!(matches!(err, Error::ProtocolNotSupported { .. }));
/// ```
pub struct Context {
    registry: Registry,
    files: OnceLock<DescriptorTable>,
    directories: OnceLock<DescriptorTable>,
}

impl Context {
    /// Create a context. Backends are discovered on first use.
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            registry: Registry::new(config),
            files: OnceLock::new(),
            directories: OnceLock::new(),
        }
    }

    /// The context configuration.
    pub fn config(&self) -> &DispatchConfig {
        self.registry.config()
    }

    /// The backend registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register an in-process backend.
    pub fn register_backend(&self, backend: impl Backend + 'static) {
        self.registry.register(Box::new(backend));
    }

    /// Table of open files, created on first use.
    pub fn files(&self) -> &DescriptorTable {
        self.files
            .get_or_init(|| DescriptorTable::new("file", self.config().max_open_files))
    }

    /// Table of open directories, created on first use.
    pub fn directories(&self) -> &DescriptorTable {
        self.directories
            .get_or_init(|| DescriptorTable::new("directory", self.config().max_open_files))
    }

    /// Drop every open handle and tear the backends down.
    ///
    /// Handles are released without calling the backends' close actions.
    /// Runs automatically on drop; calling it twice is harmless.
    pub fn teardown(&self) {
        let files = self.files.get().map_or(0, DescriptorTable::clear);
        let directories = self.directories.get().map_or(0, DescriptorTable::clear);
        if files + directories > 0 {
            tracing::debug!(files, directories, "releasing handles left open");
        }
        self.registry.teardown();
    }

    fn resolve_url(&self, url: &str, kind: Operation) -> Result<Arc<PluginDescriptor>> {
        if url.is_empty() {
            return Err(Error::InvalidArgument("empty url".to_string()));
        }
        self.registry.find_for(url, kind)
    }

    fn resolve_handle(&self, handle: &FileHandle) -> Result<Arc<PluginDescriptor>> {
        self.registry
            .find_by_name(handle.owner())
            .map_err(|err| match err {
                Error::NotFound(_) => Error::BadFileDescriptor(format!(
                    "handle owned by unknown plugin {}",
                    handle.owner()
                )),
                other => other,
            })
    }

    /// Resolve the backend for `url` and run `action` against it.
    fn dispatch_url<T>(
        &self,
        operation: &'static str,
        kind: Operation,
        url: &str,
        action: impl FnOnce(&dyn Backend) -> BackendResult<T>,
    ) -> Result<T> {
        self.dispatch_url_on(operation, kind, url, |plugin| action(plugin.backend()))
    }

    /// Like [`dispatch_url`](Self::dispatch_url), with the whole descriptor
    /// handed to `action`.
    fn dispatch_url_on<T>(
        &self,
        operation: &'static str,
        kind: Operation,
        url: &str,
        action: impl FnOnce(&PluginDescriptor) -> BackendResult<T>,
    ) -> Result<T> {
        let _span = observability::instrument_dispatch(operation, url);
        let result = self.resolve_url(url, kind).and_then(|plugin| {
            observability::record_dispatch(operation, plugin.name());
            let _timer = DispatchTimer::start(operation);
            wrap(operation, action(&plugin))
        });
        finish(operation, result)
    }

    /// Backend serving the first URL of a batch.
    ///
    /// On failure the `Err` side already holds the per-URL results: a copy
    /// of the lookup error for every URL, or nothing for an empty batch.
    fn resolve_batch<T: Clone>(
        &self,
        operation: &'static str,
        kind: Operation,
        urls: &[&str],
    ) -> std::result::Result<Arc<PluginDescriptor>, Vec<Result<T>>> {
        let Some(first) = urls.first() else {
            return Err(Vec::new());
        };
        self.resolve_url(first, kind).map_err(|err| {
            record_failure(operation, &err);
            vec![Err(err); urls.len()]
        })
    }

    /// Run a list action against the backend serving the first URL.
    fn dispatch_batch<T: Clone>(
        &self,
        operation: &'static str,
        kind: Operation,
        urls: &[&str],
        action: impl FnOnce(&dyn Backend) -> BackendResult<Vec<BackendResult<T>>>,
    ) -> Vec<Result<T>> {
        let _span = observability::instrument_dispatch(operation, batch_head(urls));
        let plugin = match self.resolve_batch(operation, kind, urls) {
            Ok(plugin) => plugin,
            Err(results) => return results,
        };
        observability::record_dispatch(operation, plugin.name());
        let _timer = DispatchTimer::start(operation);
        spread(operation, plugin.name(), urls.len(), action(plugin.backend()))
    }

    /// Look up an open file, counting a bad key as a failed `operation`.
    fn file(&self, operation: &'static str, key: DescriptorKey) -> Result<Arc<FileHandle>> {
        finish(operation, self.files().get(key))
    }

    /// Look up an open directory, counting a bad key as a failed `operation`.
    fn directory(&self, operation: &'static str, key: DescriptorKey) -> Result<Arc<FileHandle>> {
        finish(operation, self.directories().get(key))
    }

    /// Run `action` against the backend that owns `handle`.
    fn dispatch_handle<T>(
        &self,
        operation: &'static str,
        handle: &FileHandle,
        action: impl FnOnce(&dyn Backend) -> Result<T>,
    ) -> Result<T> {
        let _span = observability::instrument_handle(operation, handle.owner());
        let result = self.resolve_handle(handle).and_then(|plugin| {
            observability::record_dispatch(operation, plugin.name());
            let _timer = DispatchTimer::start(operation);
            action(plugin.backend())
        });
        finish(operation, result)
    }

    /// The open file stored under `key`.
    pub fn file_handle(&self, key: DescriptorKey) -> Result<Arc<FileHandle>> {
        self.files().get(key)
    }

    /// The open directory stored under `key`.
    pub fn directory_handle(&self, key: DescriptorKey) -> Result<Arc<FileHandle>> {
        self.directories().get(key)
    }
}

fn finish<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        record_failure(operation, err);
    }
    result
}

fn record_failure(operation: &'static str, err: &Error) {
    observability::record_dispatch_error(operation);
    observability::trace_dispatch_error(operation, err);
}

/// Wrap a backend error with the operation name.
fn wrap<T>(operation: &'static str, result: BackendResult<T>) -> Result<T> {
    result.map_err(|source| Error::backend(operation, source))
}

/// Turn a backend's batch answer into one result per URL.
///
/// A whole-batch failure, or an answer with the wrong number of entries,
/// is copied into every slot.
fn spread<T: Clone>(
    operation: &'static str,
    plugin: &str,
    count: usize,
    result: BackendResult<Vec<BackendResult<T>>>,
) -> Vec<Result<T>> {
    let err = match result {
        Ok(results) if results.len() == count => {
            return results
                .into_iter()
                .map(|result| finish(operation, wrap(operation, result)))
                .collect();
        }
        Ok(results) => Error::backend(
            operation,
            BackendError::new(
                Errno::IO,
                format!("{plugin} returned {} results for {count} urls", results.len()),
            ),
        ),
        Err(source) => Error::backend(operation, source),
    };
    record_failure(operation, &err);
    vec![Err(err); count]
}

/// First URL of a batch, for span fields.
fn batch_head<'a>(urls: &[&'a str]) -> &'a str {
    urls.first().copied().unwrap_or_default()
}

impl Default for Context {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("files", &self.files.get().map_or(0, DescriptorTable::len))
            .field(
                "directories",
                &self.directories.get().map_or(0, DescriptorTable::len),
            )
            .finish()
    }
}
