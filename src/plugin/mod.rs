//! Backend plugins: the contract, module loading and the registry.
//!
//! Every storage protocol is served by a [`Backend`]. Backends come from two
//! places: shared libraries found in the plugin directory, and in-process
//! registration through [`Registry::register`]. The registry keeps them
//! sorted by priority and hands the first one whose capability predicate
//! accepts a URL to the dispatch engine.
//!
//! # Module structure
//!
//! A backend module is a shared library (`.so` on Linux) that exports a
//! single symbol:
//!
//! ```c
//! BackendEntry gridio_plugin_init(const void* context);
//! ```
//!
//! The entry point is called once per registry, so every context gets its
//! own backend instance and any one-time setup belongs in the backend's
//! constructor.
//!
//! # Example module (Rust)
//!
//! ```ignore
//! use gridio::plugin::{Backend, Operation, PluginContext, PRIORITY_CATALOG};
//! use gridio::BackendResult;
//!
//! struct Catalog;
//!
//! impl Backend for Catalog {
//!     fn name(&self) -> &str { "catalog" }
//!     fn priority(&self) -> i32 { PRIORITY_CATALOG }
//!     fn check_url(&self, url: &str, _op: Operation) -> BackendResult<bool> {
//!         Ok(url.starts_with("lfn:"))
//!     }
//! }
//!
//! gridio::define_backend!(|_ctx: &PluginContext<'_>| Ok(Box::new(Catalog)));
//! ```

mod backend;
mod descriptor;
mod loader;
mod operation;
mod registry;

pub use backend::{Backend, PRIORITY_CACHE, PRIORITY_CATALOG, PRIORITY_DATA};
pub use descriptor::{
    BackendEntry, GRIDIO_ABI_VERSION, PLUGIN_INIT_SYMBOL, PluginContext, PluginDescriptor,
    PluginInitFn, PluginOrigin, backend_from_raw, backend_to_raw,
};
pub use loader::{LoadedModule, PluginError, PluginLoader};
pub use operation::Operation;
pub use registry::{PluginList, Registry, RegistryState};
