//! Open file and directory handles.

use libloading::Library;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An open file or directory, bound to the backend that created it.
///
/// Backends build handles in their open/opendir actions and store whatever
/// they need to find the file again as the private descriptor. The owner
/// name is how the dispatch engine finds the backend for every later call
/// on this handle, so a backend must put its own [`name`](crate::plugin::Backend::name)
/// there.
///
/// # Example
///
/// ```rust
/// use gridio::FileHandle;
///
/// struct Cursor { inode: u64 }
///
/// let handle = FileHandle::new("mock", Cursor { inode: 7 });
/// assert_eq!(handle.owner(), "mock");
/// assert_eq!(handle.fdesc::<Cursor>().map(|c| c.inode), Some(7));
/// ```
pub struct FileHandle {
    owner: String,
    path: Option<String>,
    offset: AtomicU64,
    fdesc: Box<dyn Any + Send + Sync>,
    user_data: Option<Box<dyn Any + Send + Sync>>,
    positional: Mutex<()>,
    // Last, so a module's descriptor is dropped before its library can unload.
    library: Option<Arc<Library>>,
}

impl FileHandle {
    /// Create a handle owned by `owner` wrapping the backend's descriptor.
    pub fn new<T: Any + Send + Sync>(owner: impl Into<String>, fdesc: T) -> Self {
        Self {
            owner: owner.into(),
            path: None,
            offset: AtomicU64::new(0),
            fdesc: Box::new(fdesc),
            user_data: None,
            positional: Mutex::new(()),
            library: None,
        }
    }

    /// Attach extension data.
    pub fn with_user_data<U: Any + Send + Sync>(mut self, data: U) -> Self {
        self.user_data = Some(Box::new(data));
        self
    }

    /// Record the URL this handle was opened with.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Name of the backend that owns this handle.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// URL the handle was opened with, if known.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub(crate) fn set_path_if_missing(&mut self, path: &str) {
        if self.path.is_none() {
            self.path = Some(path.to_string());
        }
    }

    /// Keep the module that created this handle loaded while it is alive.
    pub(crate) fn retain_library(&mut self, library: Option<Arc<Library>>) {
        self.library = library;
    }

    /// The backend's private descriptor, if it has type `T`.
    pub fn fdesc<T: Any>(&self) -> Option<&T> {
        self.fdesc.downcast_ref()
    }

    /// Extension data, if present and of type `T`.
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_ref().and_then(|data| data.downcast_ref())
    }

    /// Cached position.
    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    /// Update the cached position.
    pub fn set_offset(&self, offset: u64) {
        self.offset.store(offset, Ordering::Release);
    }

    /// Lock held across the seek and transfer of emulated positioned I/O.
    pub(crate) fn lock_positional(&self) -> MutexGuard<'_, ()> {
        self.positional
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("owner", &self.owner)
            .field("path", &self.path)
            .field("offset", &self.offset())
            .field("user_data", &self.user_data.is_some())
            .finish()
    }
}
