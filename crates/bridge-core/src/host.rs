use std::sync::Arc;

use crate::{
    dispatch::Dispatcher,
    loader::{ModuleLoader, PluginSlot},
    registry::CapabilityRegistry,
};

/// Explicit context tying a registry to one plugin slot. Each host is
/// independent, so tests can build as many as they like.
#[derive(Clone, Debug, Default)]
pub struct PluginHost {
    registry: Arc<CapabilityRegistry>,
    slot: Arc<PluginSlot>,
}

impl PluginHost {
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            slot: Arc::new(PluginSlot::new()),
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn loader(&self) -> ModuleLoader {
        ModuleLoader::new(self.registry.clone(), self.slot.clone())
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.slot.clone())
    }
}
