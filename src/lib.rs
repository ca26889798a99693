//! # gridio
//!
//! A protocol-agnostic storage access layer.
//!
//! gridio exposes one POSIX-like call surface (stat, mkdir, open, read,
//! readdir, rename, xattrs, staging, ...) over many storage protocols. Each
//! protocol lives in a backend plugin; the core only decides which backend
//! serves a call and keeps track of what is open.
//!
//! ## Features
//!
//! - **Plugin registry**: backends loaded from a plugin directory or
//!   registered in-process, consulted in priority order
//! - **Dispatch engine**: URL calls routed by capability predicate, handle
//!   calls routed by owner, positioned I/O emulated when a backend lacks it
//! - **Descriptor tables**: generation-tagged slot maps handing out stable
//!   integer keys for open files and directories
//! - **Metadata cache**: a reference-counted cache backends use to avoid
//!   repeated stats
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gridio::prelude::*;
//!
//! let context = Context::new(DispatchConfig::default());
//! let stat = context.stat("file:///etc/hosts")?;
//!
//! let fd = context.open("srm://se.example/pnfs/data", OFlags::RDONLY, Mode::empty())?;
//! let mut buf = [0u8; 4096];
//! let n = context.pread(fd, &mut buf, 1024)?;
//! context.close(fd)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fdesc;
pub mod metadata;
pub mod observability;
pub mod plugin;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::DispatchConfig;
    pub use crate::dispatch::Context;
    pub use crate::error::{BackendError, BackendResult, Error, Result};
    pub use crate::fdesc::{DescriptorKey, FileHandle};
    pub use crate::metadata::{DirEntry, FileStat, StageBatch, StageStatus, XattrFlags};
    pub use crate::plugin::{Backend, Operation};
    pub use rustix::fs::{Access, Mode, OFlags};
}

pub use cache::MetadataCache;
pub use config::DispatchConfig;
pub use dispatch::Context;
pub use error::{BackendError, BackendResult, Error, Result};
pub use fdesc::{DescriptorKey, DescriptorTable, FileHandle};
