//! Dynamic backend loading using libloading.

use super::Backend;
use super::descriptor::{GRIDIO_ABI_VERSION, PLUGIN_INIT_SYMBOL, PluginContext, PluginInitFn};
use crate::config::DispatchConfig;
use crate::error::BackendError;
use libloading::{Library, Symbol};
use std::env::consts::DLL_EXTENSION;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while discovering and loading backend modules.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Failed to load the shared library.
    #[error("failed to load {}: {reason}", path.display())]
    LoadFailed {
        /// Module path.
        path: PathBuf,
        /// Loader diagnostic.
        reason: String,
    },

    /// The module doesn't export the entry point.
    #[error("{} has no gridio_plugin_init entry point", path.display())]
    MissingEntryPoint {
        /// Module path.
        path: PathBuf,
    },

    /// ABI version mismatch.
    #[error("{}: ABI version mismatch: expected {expected}, got {actual}", path.display())]
    AbiMismatch {
        /// Module path.
        path: PathBuf,
        /// Expected ABI version.
        expected: u32,
        /// Actual ABI version found.
        actual: u32,
    },

    /// The entry point ran but reported a failure (or returned nothing).
    #[error("{} failed to initialise: {source}", path.display())]
    InitFailed {
        /// Module path.
        path: PathBuf,
        /// Error reported by the module.
        #[source]
        source: BackendError,
    },

    /// The plugin directory could not be listed.
    #[error("cannot read plugin directory {}: {source}", dir.display())]
    ReadDir {
        /// Directory being scanned.
        dir: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A module that loaded successfully.
pub struct LoadedModule {
    /// The backend returned by the entry point.
    pub backend: Box<dyn Backend>,
    /// Library that owns the backend's code.
    pub library: Library,
    /// Where it was loaded from.
    pub path: PathBuf,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("backend", &self.backend.name())
            .field("path", &self.path)
            .finish()
    }
}

/// Loader for backend modules.
#[derive(Debug, Clone)]
pub struct PluginLoader {
    extension: &'static str,
}

impl PluginLoader {
    /// Create a loader recognising the platform's shared-library extension.
    pub fn new() -> Self {
        Self {
            extension: DLL_EXTENSION,
        }
    }

    /// Whether `path` looks like a backend module.
    pub fn is_module(&self, path: &Path) -> bool {
        path.is_file() && path.extension() == Some(OsStr::new(self.extension))
    }

    /// List the module files of `dir`, sorted by file name.
    ///
    /// Sorting fixes the load order and therefore the tie-break between
    /// backends of equal priority.
    pub fn module_paths(&self, dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
        let read_dir_err = |source| PluginError::ReadDir {
            dir: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_dir_err)? {
            let path = entry.map_err(read_dir_err)?.path();
            if self.is_module(&path) {
                paths.push(path);
            } else {
                tracing::trace!(path = %path.display(), "skipping non-module file");
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Load one module and run its entry point.
    ///
    /// # Safety
    ///
    /// Loading a module executes arbitrary code from the shared library. The
    /// module must export `gridio_plugin_init` as generated by
    /// [`define_backend!`](crate::define_backend) from the same gridio
    /// version as the host.
    pub unsafe fn load_from_path(
        &self,
        path: &Path,
        config: &DispatchConfig,
    ) -> Result<LoadedModule, PluginError> {
        // SAFETY: Loading a dynamic library. Caller ensures the library is trusted.
        let library = unsafe { Library::new(path) }.map_err(|e| PluginError::LoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // SAFETY: The symbol type matches the one emitted by define_backend!.
        let init: PluginInitFn = unsafe {
            let symbol: Symbol<'_, PluginInitFn> =
                library
                    .get(PLUGIN_INIT_SYMBOL)
                    .map_err(|_| PluginError::MissingEntryPoint {
                        path: path.to_path_buf(),
                    })?;
            *symbol
        };

        let context = PluginContext::new(config, path);
        // SAFETY: Caller guarantees the module is valid; the context outlives the call.
        let entry = unsafe { init(context.as_raw()) };
        if entry.abi_version != GRIDIO_ABI_VERSION {
            // The payload layout is unknown, so it is leaked rather than freed.
            return Err(PluginError::AbiMismatch {
                path: path.to_path_buf(),
                expected: GRIDIO_ABI_VERSION,
                actual: entry.abi_version,
            });
        }

        // SAFETY: ABI version matches, so the payload came from BackendEntry::from_result.
        let backend = match unsafe { entry.into_result() } {
            Some(Ok(backend)) => backend,
            Some(Err(source)) => {
                return Err(PluginError::InitFailed {
                    path: path.to_path_buf(),
                    source,
                });
            }
            None => {
                return Err(PluginError::InitFailed {
                    path: path.to_path_buf(),
                    source: BackendError::new(
                        rustix::io::Errno::INVAL,
                        "entry point returned neither a backend nor an error",
                    ),
                });
            }
        };

        Ok(LoadedModule {
            backend,
            library,
            path: path.to_path_buf(),
        })
    }

    /// Load every module of `dir`, stopping at the first failure.
    ///
    /// Backends of the modules loaded before the failure are torn down and
    /// their libraries unloaded before the error is returned.
    ///
    /// # Safety
    ///
    /// See [`load_from_path`](Self::load_from_path).
    pub unsafe fn load_all_from_dir(
        &self,
        dir: &Path,
        config: &DispatchConfig,
    ) -> Result<Vec<LoadedModule>, PluginError> {
        load_each(self.module_paths(dir)?, |path| {
            // SAFETY: Caller guarantees all modules in the directory are trusted.
            unsafe { self.load_from_path(path, config) }
        })
    }
}

/// Run `load` over `paths` in order, all or nothing.
fn load_each(
    paths: Vec<PathBuf>,
    mut load: impl FnMut(&Path) -> Result<LoadedModule, PluginError>,
) -> Result<Vec<LoadedModule>, PluginError> {
    let mut modules: Vec<LoadedModule> = Vec::with_capacity(paths.len());
    for path in paths {
        match load(&path) {
            Ok(module) => {
                tracing::info!(
                    plugin = module.backend.name(),
                    path = %path.display(),
                    "loaded backend module"
                );
                modules.push(module);
            }
            Err(err) => {
                for module in &modules {
                    tracing::debug!(
                        plugin = module.backend.name(),
                        "tearing down after failed module load"
                    );
                    module.backend.teardown();
                }
                return Err(err);
            }
        }
    }
    Ok(modules)
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}
