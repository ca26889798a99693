//! Plugin descriptors and the module entry point ABI.
//!
//! A backend module is a shared library exporting one symbol:
//!
//! ```c
//! BackendEntry gridio_plugin_init(const void* context);
//! ```
//!
//! The entry point receives a pointer to a [`PluginContext`] and returns the
//! ABI version it was built against together with a boxed
//! [`Backend`](super::Backend) trait object (or a boxed error). Modules are
//! expected to be built with the same gridio version as the host; the ABI
//! version guards against loading a stale module. Use [`define_backend!`]
//! instead of writing the entry point by hand.

use super::{Backend, Operation};
use crate::config::DispatchConfig;
use crate::error::{BackendError, BackendResult};
use libloading::Library;
use rustix::io::Errno;
use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Current ABI version. Modules must match this version to be loaded.
pub const GRIDIO_ABI_VERSION: u32 = 1;

/// Name of the module entry point, null-terminated for symbol lookup.
pub const PLUGIN_INIT_SYMBOL: &[u8] = b"gridio_plugin_init\0";

/// Function pointer type of the module entry point.
///
/// # Safety
///
/// `context` must point to a [`PluginContext`] that outlives the call.
pub type PluginInitFn = unsafe extern "C" fn(context: *const c_void) -> BackendEntry;

/// What the loader hands to a module's entry point.
#[derive(Debug)]
pub struct PluginContext<'a> {
    config: &'a DispatchConfig,
    module_path: &'a Path,
}

impl<'a> PluginContext<'a> {
    /// Create a context for the module at `module_path`.
    pub fn new(config: &'a DispatchConfig, module_path: &'a Path) -> Self {
        Self {
            config,
            module_path,
        }
    }

    /// Configuration of the owning context.
    pub fn config(&self) -> &DispatchConfig {
        self.config
    }

    /// Path of the module being initialised.
    pub fn module_path(&self) -> &Path {
        self.module_path
    }

    /// Type-erased pointer passed through the entry point.
    pub fn as_raw(&self) -> *const c_void {
        self as *const Self as *const c_void
    }

    /// Recover the context inside an entry point.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from [`as_raw`](Self::as_raw) on a context
    /// that is still alive.
    pub unsafe fn from_raw<'b>(ptr: *const c_void) -> Option<&'b PluginContext<'b>> {
        // SAFETY: Caller guarantees ptr is null or a live PluginContext.
        unsafe { (ptr as *const PluginContext<'b>).as_ref() }
    }
}

/// Value returned by a module entry point.
///
/// Exactly one of `backend` and `error` is non-null.
#[repr(C)]
pub struct BackendEntry {
    /// ABI version the module was built with.
    pub abi_version: u32,
    /// `Box<Box<dyn Backend>>` created by [`backend_to_raw`], or null.
    pub backend: *mut c_void,
    /// `Box<BackendError>` describing an initialisation failure, or null.
    pub error: *mut c_void,
}

impl BackendEntry {
    /// Build an entry from an initialisation result.
    pub fn from_result(result: BackendResult<Box<dyn Backend>>) -> Self {
        match result {
            Ok(backend) => Self {
                abi_version: GRIDIO_ABI_VERSION,
                backend: backend_to_raw(backend),
                error: std::ptr::null_mut(),
            },
            Err(err) => Self {
                abi_version: GRIDIO_ABI_VERSION,
                backend: std::ptr::null_mut(),
                error: Box::into_raw(Box::new(err)) as *mut c_void,
            },
        }
    }

    /// Entry reporting that the loader passed no context.
    pub fn null_context() -> Self {
        Self::from_result(Err(BackendError::new(
            Errno::INVAL,
            "entry point called without a plugin context",
        )))
    }

    /// Take ownership of the payload.
    ///
    /// # Safety
    ///
    /// The pointers must have been produced by [`BackendEntry::from_result`]
    /// in a module built against the same gridio version, and must not be
    /// used again afterwards.
    pub unsafe fn into_result(self) -> Option<BackendResult<Box<dyn Backend>>> {
        if !self.backend.is_null() {
            // SAFETY: Caller guarantees backend came from backend_to_raw.
            return Some(Ok(unsafe { backend_from_raw(self.backend) }));
        }
        if !self.error.is_null() {
            // SAFETY: Caller guarantees error is a Box<BackendError>.
            let err = unsafe { Box::from_raw(self.error as *mut BackendError) };
            return Some(Err(*err));
        }
        None
    }
}

/// Convert a backend box to a raw pointer for the entry point ABI.
pub fn backend_to_raw(backend: Box<dyn Backend>) -> *mut c_void {
    // Box the fat pointer so it fits in a thin one.
    let boxed: Box<Box<dyn Backend>> = Box::new(backend);
    Box::into_raw(boxed) as *mut c_void
}

/// Convert a raw pointer back to a backend box.
///
/// # Safety
///
/// The pointer must have been created by `backend_to_raw`.
pub unsafe fn backend_from_raw(ptr: *mut c_void) -> Box<dyn Backend> {
    // SAFETY: Caller guarantees ptr was created by backend_to_raw.
    let boxed: Box<Box<dyn Backend>> = unsafe { Box::from_raw(ptr as *mut Box<dyn Backend>) };
    *boxed
}

/// Where a registered backend came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOrigin {
    /// Loaded from a shared library.
    Module(PathBuf),
    /// Registered in-process.
    Static,
}

/// One registered backend, owned by the [`Registry`](super::Registry).
///
/// Name and priority are read from the backend once, at registration.
/// Teardown runs at most once, either explicitly or when the descriptor is
/// dropped, and always before the module library is unloaded.
pub struct PluginDescriptor {
    name: String,
    priority: i32,
    load_order: usize,
    origin: PluginOrigin,
    torn_down: AtomicBool,
    backend: Box<dyn Backend>,
    // Declared after `backend` so the library outlives the backend's code.
    library: Option<Arc<Library>>,
}

impl PluginDescriptor {
    /// Descriptor for an in-process backend.
    pub fn from_static(backend: Box<dyn Backend>, load_order: usize) -> Self {
        Self::build(backend, None, PluginOrigin::Static, load_order)
    }

    pub(crate) fn from_module(
        backend: Box<dyn Backend>,
        library: Library,
        path: PathBuf,
        load_order: usize,
    ) -> Self {
        Self::build(
            backend,
            Some(Arc::new(library)),
            PluginOrigin::Module(path),
            load_order,
        )
    }

    fn build(
        backend: Box<dyn Backend>,
        library: Option<Arc<Library>>,
        origin: PluginOrigin,
        load_order: usize,
    ) -> Self {
        Self {
            name: backend.name().to_string(),
            priority: backend.priority(),
            load_order,
            origin,
            torn_down: AtomicBool::new(false),
            backend,
            library,
        }
    }

    /// Backend name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend priority; higher is consulted first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Position in registration order, used to break priority ties.
    pub fn load_order(&self) -> usize {
        self.load_order
    }

    /// Where the backend came from.
    pub fn origin(&self) -> &PluginOrigin {
        &self.origin
    }

    /// The backend's action table.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Shared library of a module backend, `None` for in-process ones.
    ///
    /// Handles created by the backend hold a clone so the module stays
    /// loaded until the last of them is dropped.
    pub(crate) fn library(&self) -> Option<Arc<Library>> {
        self.library.clone()
    }

    /// Run the capability predicate.
    pub fn check_url(&self, url: &str, operation: Operation) -> BackendResult<bool> {
        self.backend.check_url(url, operation)
    }

    /// Invoke the backend's teardown if it has not run yet.
    ///
    /// Returns whether this call ran it.
    pub fn teardown(&self) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::debug!(plugin = %self.name, "tearing down plugin");
        self.backend.teardown();
        true
    }

    /// Whether teardown already ran.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}

impl Drop for PluginDescriptor {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("load_order", &self.load_order)
            .field("origin", &self.origin)
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

/// Generate the module entry point for a backend.
///
/// The argument is a function (or non-capturing closure) taking the
/// [`PluginContext`] and returning the boxed backend.
///
/// # Example
///
/// ```ignore
/// use gridio::plugin::{Backend, Operation, PluginContext};
/// use gridio::BackendResult;
///
/// struct TapeBackend;
///
/// impl Backend for TapeBackend {
///     fn name(&self) -> &str { "tape" }
///     fn check_url(&self, url: &str, _op: Operation) -> BackendResult<bool> {
///         Ok(url.starts_with("tape://"))
///     }
/// }
///
/// gridio::define_backend!(|_ctx: &PluginContext<'_>| Ok(Box::new(TapeBackend)));
/// ```
#[macro_export]
macro_rules! define_backend {
    ($init:expr) => {
        /// Backend module entry point.
        ///
        /// # Safety
        ///
        /// `context` must be null or point to a live `PluginContext`.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn gridio_plugin_init(
            context: *const ::std::ffi::c_void,
        ) -> $crate::plugin::BackendEntry {
            let init: fn(
                &$crate::plugin::PluginContext<'_>,
            ) -> $crate::BackendResult<::std::boxed::Box<dyn $crate::plugin::Backend>> = $init;
            // SAFETY: The loader passes a pointer to a live PluginContext.
            match unsafe { $crate::plugin::PluginContext::from_raw(context) } {
                Some(context) => $crate::plugin::BackendEntry::from_result(init(context)),
                None => $crate::plugin::BackendEntry::null_context(),
            }
        }
    };
}
