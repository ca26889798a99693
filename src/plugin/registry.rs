//! Registry of loaded backends.

use super::descriptor::PluginDescriptor;
use super::loader::{LoadedModule, PluginError, PluginLoader};
use super::{Backend, Operation};
use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use crate::observability;
use std::cmp::Reverse;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Snapshot of the registered backends, highest priority first.
pub type PluginList = Arc<[Arc<PluginDescriptor>]>;

/// Observable lifecycle state of a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// Nothing loaded yet; the first lookup triggers discovery.
    Uninitialized,
    /// Discovery succeeded.
    Ready,
    /// Discovery failed; lookups report the cached failure until
    /// [`Registry::rediscover`] is called.
    Failed,
    /// Torn down; no backends remain.
    TornDown,
}

enum Phase {
    Uninitialized,
    Ready,
    Failed(Arc<PluginError>),
    TornDown,
}

struct Inner {
    phase: Phase,
    plugins: PluginList,
    // Registered before discovery; they join the list after the modules.
    pending: Vec<Box<dyn Backend>>,
    next_order: usize,
}

/// Registry for the backends of one context.
///
/// Discovery is lazy: the first lookup scans the plugin directory, loads
/// every module and sorts the result by descending priority (ties keep load
/// order). Discovery runs under the registry lock, so concurrent first
/// callers wait for it instead of loading twice. A failed discovery is
/// sticky.
///
/// Lookups work on a snapshot of the list and run capability predicates
/// without holding the lock.
pub struct Registry {
    config: DispatchConfig,
    loader: PluginLoader,
    inner: Mutex<Inner>,
}

impl Registry {
    /// Create an empty registry. Nothing is loaded until the first lookup.
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            loader: PluginLoader::new(),
            inner: Mutex::new(Inner {
                phase: Phase::Uninitialized,
                plugins: Vec::new().into(),
                pending: Vec::new(),
                next_order: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The configuration discovery runs with.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RegistryState {
        match self.lock().phase {
            Phase::Uninitialized => RegistryState::Uninitialized,
            Phase::Ready => RegistryState::Ready,
            Phase::Failed(_) => RegistryState::Failed,
            Phase::TornDown => RegistryState::TornDown,
        }
    }

    /// Load the backends if needed and return them in priority order.
    ///
    /// The first call performs discovery. Later calls return the cached list,
    /// or the cached failure.
    pub fn discover_and_load(&self) -> Result<PluginList> {
        let mut inner = self.lock();
        match &inner.phase {
            Phase::Ready | Phase::TornDown => return Ok(inner.plugins.clone()),
            Phase::Failed(err) => return Err(Error::Discovery(err.clone())),
            Phase::Uninitialized => {}
        }

        let modules = match self.load_modules() {
            Ok(modules) => modules,
            Err(err) => {
                let err = Arc::new(err);
                tracing::warn!(error = %err, "plugin discovery failed");
                inner.phase = Phase::Failed(err.clone());
                return Err(Error::Discovery(err));
            }
        };

        let mut plugins: Vec<_> = inner.plugins.iter().cloned().collect();
        for module in modules {
            let order = inner.next_order;
            inner.next_order += 1;
            plugins.push(Arc::new(PluginDescriptor::from_module(
                module.backend,
                module.library,
                module.path,
                order,
            )));
        }
        for backend in std::mem::take(&mut inner.pending) {
            let order = inner.next_order;
            inner.next_order += 1;
            plugins.push(Arc::new(PluginDescriptor::from_static(backend, order)));
        }

        inner.plugins = sort_by_priority(plugins);
        inner.phase = Phase::Ready;
        observability::record_plugins_loaded(inner.plugins.len());
        tracing::debug!(
            order = ?inner.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            "backends ready"
        );
        Ok(inner.plugins.clone())
    }

    fn load_modules(&self) -> std::result::Result<Vec<LoadedModule>, PluginError> {
        if !self.config.load_plugins {
            tracing::debug!("plugin directory scan disabled");
            return Ok(Vec::new());
        }
        let (dir, source) = self.config.plugin_dir();
        tracing::debug!(dir = %dir.display(), %source, "discovering backend modules");
        // SAFETY: Whoever configured the plugin directory vouches for its modules.
        unsafe { self.loader.load_all_from_dir(&dir, &self.config) }
    }

    /// Clear a sticky discovery failure and try again.
    ///
    /// Does nothing more than [`discover_and_load`](Self::discover_and_load)
    /// when the registry is not in the failed state.
    pub fn rediscover(&self) -> Result<PluginList> {
        {
            let mut inner = self.lock();
            if let Phase::Failed(err) = &inner.phase {
                tracing::info!(previous = %err, "retrying plugin discovery");
                inner.phase = Phase::Uninitialized;
            }
        }
        self.discover_and_load()
    }

    /// Add an in-process backend.
    ///
    /// Before discovery the backend is queued and joins the list after the
    /// discovered modules; afterwards it is inserted immediately. A torn
    /// down registry accepts nothing: the backend is torn down right away
    /// and dropped.
    pub fn register(&self, backend: Box<dyn Backend>) {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Uninitialized | Phase::Failed(_) => {
                tracing::debug!(plugin = backend.name(), "queued static backend");
                inner.pending.push(backend);
            }
            Phase::TornDown => {
                tracing::warn!(plugin = backend.name(), "registry torn down, rejecting backend");
                drop(inner);
                backend.teardown();
            }
            Phase::Ready => {
                let order = inner.next_order;
                inner.next_order += 1;
                let descriptor = Arc::new(PluginDescriptor::from_static(backend, order));
                tracing::debug!(
                    plugin = descriptor.name(),
                    priority = descriptor.priority(),
                    "registered static backend"
                );
                let mut plugins: Vec<_> = inner.plugins.iter().cloned().collect();
                plugins.push(descriptor);
                inner.plugins = sort_by_priority(plugins);
                observability::record_plugins_loaded(inner.plugins.len());
            }
        }
    }

    /// First backend, in priority order, whose predicate accepts `url`.
    ///
    /// A predicate error aborts the search and is reported as is.
    pub fn find_for(&self, url: &str, operation: Operation) -> Result<Arc<PluginDescriptor>> {
        let plugins = self.discover_and_load()?;
        for plugin in plugins.iter() {
            match plugin.check_url(url, operation) {
                Ok(true) => {
                    tracing::trace!(plugin = plugin.name(), url, %operation, "backend matched");
                    return Ok(plugin.clone());
                }
                Ok(false) => {}
                Err(source) => return Err(Error::backend(operation.name(), source)),
            }
        }
        Err(Error::ProtocolNotSupported {
            operation: operation.name(),
            url: url.to_string(),
        })
    }

    /// Backend registered under `name`.
    pub fn find_by_name(&self, name: &str) -> Result<Arc<PluginDescriptor>> {
        self.discover_and_load()?
            .iter()
            .find(|plugin| plugin.name() == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("plugin {name}")))
    }

    /// Names of the registered backends, highest priority first.
    pub fn plugin_names(&self) -> Result<Vec<String>> {
        Ok(self
            .discover_and_load()?
            .iter()
            .map(|plugin| plugin.name().to_string())
            .collect())
    }

    /// Number of registered backends (zero before discovery).
    pub fn len(&self) -> usize {
        self.lock().plugins.len()
    }

    /// Check if no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tear every backend down and empty the registry.
    ///
    /// Idempotent. Descriptors still referenced by in-flight calls stay alive
    /// until those calls finish, but their teardown has already run.
    pub fn teardown(&self) {
        let (plugins, pending) = {
            let mut inner = self.lock();
            if matches!(inner.phase, Phase::TornDown) && inner.plugins.is_empty() {
                return;
            }
            inner.phase = Phase::TornDown;
            (
                std::mem::replace(&mut inner.plugins, Vec::new().into()),
                std::mem::take(&mut inner.pending),
            )
        };
        tracing::debug!(count = plugins.len() + pending.len(), "tearing down registry");
        observability::record_plugins_loaded(0);
        for plugin in plugins.iter() {
            plugin.teardown();
        }
        for backend in pending {
            backend.teardown();
        }
    }
}

fn sort_by_priority(mut plugins: Vec<Arc<PluginDescriptor>>) -> PluginList {
    plugins.sort_by_key(|plugin| (Reverse(plugin.priority()), plugin.load_order()));
    plugins.into()
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("state", &self.state())
            .field("plugins", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendResult;

    struct Prefix {
        name: &'static str,
        prefix: &'static str,
        priority: i32,
    }

    impl Backend for Prefix {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn check_url(&self, url: &str, _operation: Operation) -> BackendResult<bool> {
            Ok(url.starts_with(self.prefix))
        }
    }

    fn prefix(name: &'static str, prefix: &'static str, priority: i32) -> Box<dyn Backend> {
        Box::new(Prefix {
            name,
            prefix,
            priority,
        })
    }

    #[test]
    fn test_lazy_discovery_in_process() {
        let registry = Registry::new(DispatchConfig::in_process());
        registry.register(prefix("a", "a://", 0));
        assert_eq!(registry.state(), RegistryState::Uninitialized);
        assert_eq!(registry.len(), 0);

        assert_eq!(registry.plugin_names().unwrap(), vec!["a".to_string()]);
        assert_eq!(registry.state(), RegistryState::Ready);
    }

    #[test]
    fn test_priority_then_load_order() {
        let registry = Registry::new(DispatchConfig::in_process());
        registry.register(prefix("low", "x://", 5));
        registry.register(prefix("first-high", "x://", 10));
        registry.register(prefix("second-high", "x://", 10));
        assert_eq!(
            registry.plugin_names().unwrap(),
            vec!["first-high", "second-high", "low"]
        );

        // Registered after discovery: still sorted in.
        registry.register(prefix("top", "x://", 200));
        assert_eq!(registry.plugin_names().unwrap()[0], "top");
    }

    #[test]
    fn test_find_for_and_by_name() {
        let registry = Registry::new(DispatchConfig::in_process());
        registry.register(prefix("file", "file://", 0));
        registry.register(prefix("srm", "srm://", 100));

        assert_eq!(registry.find_for("file:///tmp", Operation::Stat).unwrap().name(), "file");
        let err = registry.find_for("gsiftp://h/x", Operation::Stat).unwrap_err();
        assert!(matches!(err, Error::ProtocolNotSupported { operation: "stat", .. }));

        assert_eq!(registry.find_by_name("srm").unwrap().priority(), 100);
        assert!(matches!(registry.find_by_name("lfc"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let registry = Registry::new(DispatchConfig::in_process());
        registry.register(prefix("a", "a://", 0));
        registry.discover_and_load().unwrap();

        registry.teardown();
        assert_eq!(registry.state(), RegistryState::TornDown);
        assert!(registry.is_empty());
        registry.teardown();
        assert!(registry.find_for("a://x", Operation::Stat).is_err());
    }
}
