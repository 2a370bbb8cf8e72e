use std::{collections::BTreeMap, sync::Arc};

use bridge_plugin_sdk::{
    capability::{DATA_MODEL_API, REACTIVE_UTILITIES, RUNTIME_API, UI_WIDGETS_API},
    Capability, Inert, ResolvedDependencies,
};

use crate::stubs::{StubDataModel, StubReactive, StubRuntime, StubUiWidgets};

/// Immutable table from dependency name to host capability.
#[derive(Clone, Debug)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, Capability>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::with_host_stubs()
    }
}

impl CapabilityRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// The four host APIs a plugin module may request.
    pub fn with_host_stubs() -> Self {
        Self::empty()
            .with(DATA_MODEL_API, Capability::DataModel(Arc::new(StubDataModel)))
            .with(RUNTIME_API, Capability::Runtime(Arc::new(StubRuntime)))
            .with(UI_WIDGETS_API, Capability::UiWidgets(Arc::new(StubUiWidgets)))
            .with(REACTIVE_UTILITIES, Capability::Reactive(Arc::new(StubReactive)))
    }

    pub fn with(mut self, name: impl Into<String>, capability: Capability) -> Self {
        self.entries.insert(name.into(), capability);
        self
    }

    /// Case-exact lookup.
    pub fn resolve(&self, name: &str) -> Option<Capability> {
        self.entries.get(name).cloned()
    }

    /// Resolves a module's declared names in order. Unknown names get the
    /// shared inert object, so this never fails.
    pub fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> ResolvedDependencies {
        let entries = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                let capability = self.resolve(name).unwrap_or_else(|| {
                    tracing::warn!(
                        dependency = name,
                        "unknown host dependency; substituting inert fallback"
                    );
                    Capability::Inert(Inert::shared())
                });
                (name.to_string(), capability)
            })
            .collect();
        ResolvedDependencies::new(entries)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_stubs_cover_known_names() {
        let registry = CapabilityRegistry::with_host_stubs();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(
            names,
            vec![DATA_MODEL_API, REACTIVE_UTILITIES, RUNTIME_API, UI_WIDGETS_API]
        );
        assert_eq!(registry.resolve(RUNTIME_API).unwrap().kind(), RUNTIME_API);
    }

    #[test]
    fn lookup_is_case_exact() {
        let registry = CapabilityRegistry::with_host_stubs();
        assert!(registry.resolve("Runtime-API").is_none());
        assert!(registry.resolve("runtime-api ").is_none());
    }

    #[test]
    fn unknown_names_resolve_to_inert_in_order() {
        let registry = CapabilityRegistry::with_host_stubs();
        let deps = registry.resolve_all(&["react", DATA_MODEL_API, "lodash"]);
        assert_eq!(deps.len(), 3);
        assert!(deps.get(0).unwrap().is_inert());
        assert_eq!(deps.get(1).unwrap().kind(), DATA_MODEL_API);
        let inert = deps.get(2).and_then(Capability::as_inert).unwrap();
        assert!(std::ptr::eq(inert.member("anything"), inert));
        assert!(std::ptr::eq(inert.call(&[]), inert));
    }

    #[test]
    fn empty_registry_resolves_everything_inert() {
        let deps = CapabilityRegistry::empty().resolve_all(&[DATA_MODEL_API]);
        assert!(deps.get(0).unwrap().is_inert());
    }
}
