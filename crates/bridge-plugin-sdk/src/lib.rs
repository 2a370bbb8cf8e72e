pub mod capability;
pub mod data;
pub mod manifest;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::{json, Value};

pub use capability::{Capability, Inert, ResolvedDependencies};
pub use data::{
    DataFrame, DataResponse, Field, FieldType, FrameOptions, HealthCheck, HealthStatus,
    InstanceSettings, QueryEnvelope, QueryResult, Target, TimeRange,
};
pub use manifest::PluginManifest;

/// A running data source.
///
/// The host shares one instance across every transport and calls it
/// concurrently without locking. Implementations holding mutable state must
/// synchronize it themselves.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    fn default_query(&self) -> Value {
        json!({})
    }

    fn filter_query(&self, _target: &Target) -> bool {
        true
    }

    async fn query(&self, _request: QueryEnvelope) -> anyhow::Result<QueryResult> {
        Ok(QueryResult::default())
    }

    async fn test_datasource(&self) -> anyhow::Result<HealthCheck> {
        Ok(HealthCheck::success("Success"))
    }
}

pub type DataSourceConstructor =
    Box<dyn Fn(InstanceSettings) -> anyhow::Result<Box<dyn DataSource>> + Send + Sync>;

/// Exported plugin metadata: how to construct the module's data source.
pub struct PluginDescriptor {
    constructor: DataSourceConstructor,
}

impl PluginDescriptor {
    pub fn new<F, D>(constructor: F) -> Self
    where
        F: Fn(InstanceSettings) -> anyhow::Result<D> + Send + Sync + 'static,
        D: DataSource,
    {
        Self::from_constructor(Box::new(move |settings| {
            constructor(settings).map(|ds| Box::new(ds) as Box<dyn DataSource>)
        }))
    }

    pub fn from_constructor(constructor: DataSourceConstructor) -> Self {
        Self { constructor }
    }

    /// Editors are a browser concern; accepted and ignored.
    pub fn set_config_editor(self, _editor: &str) -> Self {
        self
    }

    /// Editors are a browser concern; accepted and ignored.
    pub fn set_query_editor(self, _editor: &str) -> Self {
        self
    }

    pub fn construct(&self, settings: InstanceSettings) -> anyhow::Result<Arc<dyn DataSource>> {
        (self.constructor)(settings).map(Arc::from)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor").finish_non_exhaustive()
    }
}

/// What a module factory returns.
#[derive(Debug)]
pub struct ModuleExports {
    pub plugin: PluginDescriptor,
}

/// A loadable plugin module: a manifest naming its host dependencies and a
/// factory that receives them resolved, in declared order.
pub trait PluginModule: Send + 'static {
    fn manifest(&self) -> PluginManifest;
    fn build(self: Box<Self>, deps: ResolvedDependencies) -> anyhow::Result<ModuleExports>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Defaults;

    impl DataSource for Defaults {}

    #[tokio::test]
    async fn base_data_source_defaults() {
        let ds = Defaults;
        assert_eq!(ds.default_query(), json!({}));
        assert!(ds.filter_query(&Target::default()));
        assert!(ds.query(QueryEnvelope::default()).await.unwrap().responses.is_empty());
        assert!(ds.test_datasource().await.unwrap().is_success());
    }

    #[test]
    fn descriptor_editors_are_no_ops() {
        let descriptor = PluginDescriptor::new(|_| Ok(Defaults))
            .set_config_editor("ConfigEditor")
            .set_query_editor("QueryEditor");
        assert!(descriptor.construct(InstanceSettings::default()).is_ok());
    }
}
