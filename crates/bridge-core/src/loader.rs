use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, OnceLock},
};

use bridge_plugin_sdk::{
    DataSource, InstanceSettings, ModuleExports, PluginDescriptor, PluginModule,
    ResolvedDependencies,
};

use crate::{
    error::{BridgeError, BridgeResult},
    registry::CapabilityRegistry,
};

/// Holds the one plugin instance of a host. Filled once, never replaced.
///
/// Loads are serialized: a caller that arrives while another load runs
/// waits for it and only sees `AlreadyLoaded` if that load succeeded.
#[derive(Default)]
pub struct PluginSlot {
    loading: Mutex<()>,
    instance: OnceLock<Arc<dyn DataSource>>,
}

impl PluginSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<dyn DataSource>> {
        self.instance.get().cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.instance.get().is_some()
    }

    fn install(&self, instance: Arc<dyn DataSource>) -> BridgeResult<()> {
        self.instance
            .set(instance)
            .map_err(|_| BridgeError::AlreadyLoaded)
    }
}

impl std::fmt::Debug for PluginSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSlot")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Resolves a module's dependencies, runs its factory and instantiates the
/// exported data source into the shared slot.
#[derive(Clone, Debug)]
pub struct ModuleLoader {
    registry: Arc<CapabilityRegistry>,
    slot: Arc<PluginSlot>,
}

impl ModuleLoader {
    pub fn new(registry: Arc<CapabilityRegistry>, slot: Arc<PluginSlot>) -> Self {
        Self { registry, slot }
    }

    /// One-shot module load.
    ///
    /// Rejects with `AlreadyLoaded` once a module has loaded successfully;
    /// the factory is not run in that case. A failed load leaves the slot
    /// empty and may be retried. Concurrent calls wait for a running load.
    pub fn define<S, F>(
        &self,
        dependency_names: &[S],
        factory: F,
    ) -> BridgeResult<Arc<dyn DataSource>>
    where
        S: AsRef<str>,
        F: FnOnce(ResolvedDependencies) -> anyhow::Result<ModuleExports>,
    {
        // the lock guards no data, so a poisoned lock is still usable
        let _guard = self
            .slot
            .loading
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.slot.is_loaded() {
            return Err(BridgeError::AlreadyLoaded);
        }
        let instance = self.run_factory(dependency_names, factory)?;
        self.slot.install(instance.clone())?;
        tracing::info!("plugin instance created");
        Ok(instance)
    }

    /// Loads a typed module: `define(manifest.dependencies, module.build)`.
    pub fn load(&self, module: Box<dyn PluginModule>) -> BridgeResult<Arc<dyn DataSource>> {
        let manifest = module.manifest();
        tracing::info!(
            plugin = %manifest.id,
            version = %manifest.version,
            dependencies = manifest.dependencies.len(),
            "loading plugin module"
        );
        self.define(manifest.dependencies.as_slice(), move |deps| module.build(deps))
    }

    fn run_factory<S, F>(
        &self,
        dependency_names: &[S],
        factory: F,
    ) -> BridgeResult<Arc<dyn DataSource>>
    where
        S: AsRef<str>,
        F: FnOnce(ResolvedDependencies) -> anyhow::Result<ModuleExports>,
    {
        let deps = self.registry.resolve_all(dependency_names);
        let exports = catch_unwind(AssertUnwindSafe(|| factory(deps)))
            .map_err(|payload| BridgeError::ModuleLoad(panic_message(payload.as_ref())))?
            .map_err(BridgeError::module_load)?;
        instantiate(&exports.plugin)
    }
}

/// Constructs the descriptor's data source with empty settings.
pub fn instantiate(descriptor: &PluginDescriptor) -> BridgeResult<Arc<dyn DataSource>> {
    catch_unwind(AssertUnwindSafe(|| {
        descriptor.construct(InstanceSettings::default())
    }))
    .map_err(|payload| BridgeError::ModuleLoad(panic_message(payload.as_ref())))?
    .map_err(BridgeError::module_load)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("factory panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("factory panicked: {msg}")
    } else {
        "factory panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_plugin_sdk::{
        capability::DATA_MODEL_API, DataResponse, QueryEnvelope, QueryResult,
    };

    struct Tagged(&'static str);

    #[async_trait]
    impl DataSource for Tagged {
        async fn query(&self, _request: QueryEnvelope) -> anyhow::Result<QueryResult> {
            let mut result = QueryResult::default();
            result.insert(self.0, DataResponse::ok(Vec::new()));
            Ok(result)
        }
    }

    fn loader() -> (ModuleLoader, Arc<PluginSlot>) {
        let slot = Arc::new(PluginSlot::new());
        let loader = ModuleLoader::new(Arc::new(CapabilityRegistry::with_host_stubs()), slot.clone());
        (loader, slot)
    }

    fn exports(tag: &'static str) -> ModuleExports {
        ModuleExports {
            plugin: PluginDescriptor::new(move |_| Ok(Tagged(tag))),
        }
    }

    #[test]
    fn unknown_dependencies_do_not_fail_define() {
        let (loader, slot) = loader();
        let mut seen = Vec::new();
        loader
            .define(&["react", DATA_MODEL_API, "@company/internal"], |deps| {
                seen = deps.iter().map(|(name, cap)| (name.to_string(), cap.is_inert())).collect();
                let inert = deps.get(0).and_then(|c| c.as_inert()).unwrap();
                assert!(std::ptr::eq(inert.member("createElement").call(&[]), inert));
                Ok(exports("first"))
            })
            .unwrap();
        assert_eq!(
            seen,
            vec![
                ("react".to_string(), true),
                (DATA_MODEL_API.to_string(), false),
                ("@company/internal".to_string(), true),
            ]
        );
        assert!(slot.is_loaded());
    }

    #[tokio::test]
    async fn second_define_is_rejected_and_instance_kept() {
        let (loader, slot) = loader();
        loader.define::<&str, _>(&[], |_| Ok(exports("first"))).unwrap();

        let mut ran = false;
        let err = loader
            .define::<&str, _>(&[], |_| {
                ran = true;
                Ok(exports("second"))
            })
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::AlreadyLoaded));
        assert!(!ran);

        let result = slot.get().unwrap().query(QueryEnvelope::default()).await.unwrap();
        assert!(result.get("first").is_some());
    }

    #[test]
    fn factory_errors_become_module_load_errors() {
        let (loader, slot) = loader();
        let err = loader
            .define::<&str, _>(&[], |_| anyhow::bail!("bad bundle"))
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::ModuleLoad(ref msg) if msg.contains("bad bundle")));
        assert!(!slot.is_loaded());

        // a failed load does not consume the slot
        loader.define::<&str, _>(&[], |_| Ok(exports("retry"))).unwrap();
        assert!(slot.is_loaded());
    }

    #[test]
    fn factory_panics_are_contained() {
        let (loader, slot) = loader();
        let err = loader
            .define::<&str, _>(&[], |_| -> anyhow::Result<ModuleExports> { panic!("boom") })
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::ModuleLoad(ref msg) if msg.contains("boom")));
        assert!(!slot.is_loaded());
    }

    #[test]
    fn constructor_failure_is_a_load_error() {
        let (loader, slot) = loader();
        let err = loader
            .define::<&str, _>(&[], |_| {
                Ok(ModuleExports {
                    plugin: PluginDescriptor::new(|_| -> anyhow::Result<Tagged> {
                        anyhow::bail!("missing url")
                    }),
                })
            })
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::ModuleLoad(_)));
        assert!(!slot.is_loaded());
    }

    #[test]
    fn concurrent_define_waits_for_a_failing_load() {
        let (loader, slot) = loader();
        let barrier = std::sync::Barrier::new(2);

        let (first, second) = std::thread::scope(|scope| {
            let first = scope.spawn(|| {
                loader
                    .define::<&str, _>(&[], |_| {
                        // the load lock is held from here on
                        barrier.wait();
                        anyhow::bail!("first load fails")
                    })
                    .err()
            });
            barrier.wait();
            let second = loader.define::<&str, _>(&[], |_| Ok(exports("second")));
            (first.join().unwrap(), second.is_ok())
        });

        assert!(matches!(
            first,
            Some(BridgeError::ModuleLoad(ref msg)) if msg.contains("first load fails")
        ));
        assert!(second);
        assert!(slot.is_loaded());
    }
}
