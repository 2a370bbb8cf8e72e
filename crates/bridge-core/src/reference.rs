//! Built-in sample plugin. Echoes each target back as a one-frame response
//! and self-tests through the emulated backend.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bridge_plugin_sdk::{
    capability::{
        DataModelApi, FetchRequest, ReactiveUtilities, RuntimeApi, DATA_MODEL_API,
        REACTIVE_UTILITIES, RUNTIME_API, UI_WIDGETS_API,
    },
    DataResponse, DataSource, Field, FieldType, FrameOptions, HealthCheck, InstanceSettings,
    ModuleExports, PluginManifest, PluginModule, QueryEnvelope, QueryResult,
    ResolvedDependencies, Target,
};
use serde_json::{json, Value};

pub const MODULE_ID: &str = "reference";

const DEFAULT_ERROR_MESSAGE: &str = "Cannot connect to API";

#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceModule;

impl PluginModule for ReferenceModule {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            id: MODULE_ID.into(),
            name: "Reference data source".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: Some("Echoes query targets as data frames".into()),
            // `react` is a UI framework the editors import; the host has no
            // use for it and hands back the inert object.
            dependencies: vec![
                DATA_MODEL_API.into(),
                RUNTIME_API.into(),
                UI_WIDGETS_API.into(),
                REACTIVE_UTILITIES.into(),
                "react".into(),
            ],
        }
    }

    fn build(self: Box<Self>, deps: ResolvedDependencies) -> anyhow::Result<ModuleExports> {
        let data = deps
            .data_model()
            .with_context(|| format!("{MODULE_ID} requires `{DATA_MODEL_API}`"))?;
        let runtime = deps
            .runtime()
            .with_context(|| format!("{MODULE_ID} requires `{RUNTIME_API}`"))?;
        let reactive = deps
            .reactive()
            .with_context(|| format!("{MODULE_ID} requires `{REACTIVE_UTILITIES}`"))?;

        let frames = data.clone();
        let plugin = data
            .data_source_plugin(Box::new(
                move |settings: InstanceSettings| -> anyhow::Result<Box<dyn DataSource>> {
                    Ok(Box::new(ReferenceDataSource::new(
                        settings,
                        frames.clone(),
                        runtime.clone(),
                        reactive.clone(),
                    )))
                },
            ))
            .set_config_editor("ConfigEditor")
            .set_query_editor("QueryEditor");
        Ok(ModuleExports { plugin })
    }
}

pub struct ReferenceDataSource {
    base_url: String,
    data: Arc<dyn DataModelApi>,
    runtime: Arc<dyn RuntimeApi>,
    reactive: Arc<dyn ReactiveUtilities>,
}

impl ReferenceDataSource {
    fn new(
        settings: InstanceSettings,
        data: Arc<dyn DataModelApi>,
        runtime: Arc<dyn RuntimeApi>,
        reactive: Arc<dyn ReactiveUtilities>,
    ) -> Self {
        Self {
            base_url: settings.url.unwrap_or_default(),
            data,
            runtime,
            reactive,
        }
    }

    fn frame_for(&self, target: &Target, request: &QueryEnvelope) -> DataResponse {
        let rows = if request.range.is_some() { 2 } else { 1 };
        let mut fields = Vec::with_capacity(3);
        if let Some(range) = &request.range {
            fields.push(Field::new(
                "time",
                FieldType::Time,
                vec![json!(range.from.to_rfc3339()), json!(range.to.to_rfc3339())],
            ));
        }
        fields.push(Field::new(
            "queryText",
            FieldType::String,
            vec![json!(target.query_text); rows],
        ));
        fields.push(Field::new(
            "constant",
            FieldType::Number,
            vec![json!(target.constant); rows],
        ));
        let frame = self.data.create_data_frame(FrameOptions {
            ref_id: Some(target.ref_id.clone()),
            name: None,
            fields,
        });
        DataResponse::ok(vec![frame])
    }
}

#[async_trait]
impl DataSource for ReferenceDataSource {
    fn default_query(&self) -> Value {
        json!({ "queryText": "test", "constant": 6.5 })
    }

    /// Targets without query text are not executed.
    fn filter_query(&self, target: &Target) -> bool {
        target
            .query_text
            .as_deref()
            .is_some_and(|text| !text.is_empty())
    }

    async fn query(&self, request: QueryEnvelope) -> anyhow::Result<QueryResult> {
        let mut result = QueryResult::default();
        for target in request.targets.iter().filter(|t| self.filter_query(t)) {
            result.insert(target.ref_id.clone(), self.frame_for(target, &request));
        }
        Ok(result)
    }

    async fn test_datasource(&self) -> anyhow::Result<HealthCheck> {
        let request = FetchRequest::get(format!("{}/health", self.base_url));
        match self.runtime.backend_srv().fetch(request).await {
            Ok(response) => {
                let settled = self
                    .reactive
                    .last_value_from(serde_json::to_value(&response)?)
                    .await;
                if settled.get("status").and_then(Value::as_u64) == Some(200) {
                    Ok(HealthCheck::success("Success"))
                } else {
                    let message = settled
                        .get("statusText")
                        .and_then(Value::as_str)
                        .unwrap_or(DEFAULT_ERROR_MESSAGE);
                    Ok(HealthCheck::error(message))
                }
            }
            Err(err) if self.runtime.is_fetch_error(&err) => Ok(HealthCheck::error(format!(
                "Fetch error: {}",
                err.status_text.as_deref().unwrap_or(DEFAULT_ERROR_MESSAGE)
            ))),
            Err(err) => Ok(HealthCheck::error(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PluginHost;
    use bridge_plugin_sdk::capability::{BackendSrv, FetchError, FetchResponse};

    fn envelope(value: Value) -> QueryEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn manifest_declares_host_and_foreign_dependencies() {
        let manifest = ReferenceModule.manifest();
        assert!(manifest.requires_dependency(DATA_MODEL_API));
        assert!(manifest.requires_dependency("react"));
        manifest.semver().unwrap();
    }

    #[tokio::test]
    async fn echoes_each_target_with_range() {
        let host = PluginHost::default();
        let instance = host.loader().load(Box::new(ReferenceModule)).unwrap();
        let result = instance
            .query(envelope(json!({
                "targets": [
                    { "refId": "A", "queryText": "t", "constant": 1 },
                    { "refId": "B", "queryText": "u" }
                ],
                "range": { "from": "2024-01-01T00:00:00Z", "to": "2024-01-02T00:00:00Z" }
            })))
            .await
            .unwrap();

        let a = result.get("A").unwrap();
        assert_eq!(a.status, 200);
        let frame = &a.frames[0];
        assert_eq!(frame.ref_id.as_deref(), Some("A"));
        assert_eq!(frame.length, 2);
        let names: Vec<_> = frame.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["time", "queryText", "constant"]);
        assert_eq!(frame.fields[2].values, vec![json!(1.0), json!(1.0)]);

        let b = &result.get("B").unwrap().frames[0];
        assert_eq!(b.fields[2].values, vec![Value::Null, Value::Null]);
    }

    #[tokio::test]
    async fn skips_targets_without_query_text() {
        let host = PluginHost::default();
        let instance = host.loader().load(Box::new(ReferenceModule)).unwrap();
        let result = instance
            .query(envelope(json!({
                "targets": [{ "refId": "A", "queryText": "" }, { "refId": "B", "queryText": "x" }]
            })))
            .await
            .unwrap();
        assert!(result.get("A").is_none());
        assert_eq!(result.get("B").unwrap().frames[0].length, 1);
    }

    #[tokio::test]
    async fn self_test_passes_against_emulated_backend() {
        let host = PluginHost::default();
        let instance = host.loader().load(Box::new(ReferenceModule)).unwrap();
        assert_eq!(
            instance.default_query(),
            json!({ "queryText": "test", "constant": 6.5 })
        );
        assert!(instance.test_datasource().await.unwrap().is_success());
    }

    #[test]
    fn missing_data_model_fails_the_load() {
        let host = PluginHost::new(crate::registry::CapabilityRegistry::empty());
        let err = host.loader().load(Box::new(ReferenceModule)).err().unwrap();
        assert!(err.to_string().contains(DATA_MODEL_API));
    }

    struct Unreachable;

    #[async_trait]
    impl BackendSrv for Unreachable {
        async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse, FetchError> {
            Err(FetchError {
                status: Some(502),
                status_text: Some("Bad Gateway".into()),
            })
        }
    }

    struct FailingRuntime;

    impl RuntimeApi for FailingRuntime {
        fn backend_srv(&self) -> Arc<dyn BackendSrv> {
            Arc::new(Unreachable)
        }
    }

    #[tokio::test]
    async fn self_test_reports_fetch_errors() {
        let ds = ReferenceDataSource::new(
            InstanceSettings::default(),
            Arc::new(crate::stubs::StubDataModel),
            Arc::new(FailingRuntime),
            Arc::new(crate::stubs::StubReactive),
        );
        let health = ds.test_datasource().await.unwrap();
        assert!(!health.is_success());
        assert_eq!(health.message, "Fetch error: Bad Gateway");
    }
}
