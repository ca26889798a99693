//! Context configuration.
//!
//! The only knobs the dispatch core needs are where backend modules live,
//! whether to scan for them at all, and how many handles a descriptor table
//! may hold. Everything else belongs to the backends.
//!
//! # Plugin directory
//!
//! The directory scanned for backend modules is chosen in this order:
//!
//! 1. an explicit [`DispatchConfig::with_plugin_dir`] override,
//! 2. the `GRIDIO_PLUGIN_DIR` environment variable,
//! 3. the default baked in at build time from `GRIDIO_PLUGIN_DIR_DEFAULT`,
//!    falling back to `/usr/lib/gridio/plugins`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable overriding the plugin directory.
pub const PLUGIN_DIR_ENV: &str = "GRIDIO_PLUGIN_DIR";

/// Plugin directory used when neither an override nor the environment says otherwise.
pub const DEFAULT_PLUGIN_DIR: &str = match option_env!("GRIDIO_PLUGIN_DIR_DEFAULT") {
    Some(dir) => dir,
    None => "/usr/lib/gridio/plugins",
};

/// Default descriptor table limit: half of the 32-bit slot index space.
pub const DEFAULT_MAX_OPEN_FILES: usize = (u32::MAX / 2) as usize;

/// Where the plugin directory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginDirSource {
    /// Set explicitly on the configuration.
    Override,
    /// Taken from [`PLUGIN_DIR_ENV`].
    Environment,
    /// The build-time default.
    Default,
}

impl std::fmt::Display for PluginDirSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginDirSource::Override => write!(f, "override"),
            PluginDirSource::Environment => write!(f, "{PLUGIN_DIR_ENV}"),
            PluginDirSource::Default => write!(f, "default"),
        }
    }
}

/// Configuration for a [`Context`](crate::Context).
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Explicit plugin directory; wins over the environment.
    pub plugin_dir: Option<PathBuf>,
    /// Scan the plugin directory on first use. When false the registry only
    /// holds statically registered backends.
    pub load_plugins: bool,
    /// Maximum number of live entries per descriptor table.
    pub max_open_files: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            plugin_dir: None,
            load_plugins: true,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
        }
    }
}

impl DispatchConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for an in-process registry: no directory scan.
    pub fn in_process() -> Self {
        Self {
            load_plugins: false,
            ..Self::default()
        }
    }

    /// Scan the given directory instead of the environment or default one.
    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }

    /// Enable or disable the plugin directory scan.
    pub fn with_plugin_loading(mut self, enabled: bool) -> Self {
        self.load_plugins = enabled;
        self
    }

    /// Set the descriptor table limit.
    pub fn with_max_open_files(mut self, limit: usize) -> Self {
        self.max_open_files = limit;
        self
    }

    /// The plugin directory this configuration resolves to right now.
    pub fn plugin_dir(&self) -> (PathBuf, PluginDirSource) {
        resolve_plugin_dir(
            self.plugin_dir.as_deref(),
            std::env::var_os(PLUGIN_DIR_ENV),
        )
    }
}

/// Apply the plugin directory precedence rules.
///
/// An empty environment value counts as unset.
pub fn resolve_plugin_dir(
    explicit: Option<&Path>,
    env: Option<OsString>,
) -> (PathBuf, PluginDirSource) {
    if let Some(dir) = explicit {
        return (dir.to_path_buf(), PluginDirSource::Override);
    }
    match env {
        Some(dir) if !dir.is_empty() => (PathBuf::from(dir), PluginDirSource::Environment),
        _ => (PathBuf::from(DEFAULT_PLUGIN_DIR), PluginDirSource::Default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_dir_wins() {
        let (dir, source) = resolve_plugin_dir(
            Some(Path::new("/opt/plugins")),
            Some(OsString::from("/env/plugins")),
        );
        assert_eq!(dir, PathBuf::from("/opt/plugins"));
        assert_eq!(source, PluginDirSource::Override);
    }

    #[test]
    fn test_env_over_default() {
        let (dir, source) = resolve_plugin_dir(None, Some(OsString::from("/env/plugins")));
        assert_eq!(dir, PathBuf::from("/env/plugins"));
        assert_eq!(source, PluginDirSource::Environment);
    }

    #[test]
    fn test_empty_env_falls_back_to_default() {
        let (dir, source) = resolve_plugin_dir(None, Some(OsString::new()));
        assert_eq!(dir, PathBuf::from(DEFAULT_PLUGIN_DIR));
        assert_eq!(source, PluginDirSource::Default);
    }

    #[test]
    fn test_builder() {
        let config = DispatchConfig::new()
            .with_plugin_dir("/tmp/p")
            .with_max_open_files(4)
            .with_plugin_loading(false);
        assert_eq!(config.plugin_dir().0, PathBuf::from("/tmp/p"));
        assert_eq!(config.max_open_files, 4);
        assert!(!config.load_plugins);
        assert!(!DispatchConfig::in_process().load_plugins);
    }
}
