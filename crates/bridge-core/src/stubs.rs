//! Minimal stand-ins for the host APIs a plugin module touches at load time.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_plugin_sdk::{
    capability::{
        BackendSrv, DataModelApi, FetchError, FetchRequest, FetchResponse, ReactiveUtilities,
        RuntimeApi, UiWidgetsApi,
    },
    DataFrame, FrameOptions,
};
use serde_json::Value;

#[derive(Debug, Default)]
pub struct StubDataModel;

impl DataModelApi for StubDataModel {
    fn create_data_frame(&self, options: FrameOptions) -> DataFrame {
        let length = options
            .fields
            .first()
            .map(|field| field.values.len())
            .unwrap_or(0);
        DataFrame {
            ref_id: options.ref_id,
            name: options.name,
            fields: options.fields,
            length,
        }
    }
}

#[derive(Debug, Default)]
pub struct StubRuntime;

impl RuntimeApi for StubRuntime {
    fn backend_srv(&self) -> Arc<dyn BackendSrv> {
        Arc::new(StubBackendSrv)
    }
}

/// Answers every request with `{status: 200}` without touching the network.
#[derive(Debug, Default)]
pub struct StubBackendSrv;

#[async_trait]
impl BackendSrv for StubBackendSrv {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        tracing::debug!(url = %request.url, "emulated backend fetch");
        Ok(FetchResponse {
            status: 200,
            status_text: None,
            data: Value::Null,
        })
    }
}

#[derive(Debug, Default)]
pub struct StubUiWidgets;

impl UiWidgetsApi for StubUiWidgets {
    fn input(&self, _props: &Value) -> Option<Value> {
        None
    }

    fn secret_input(&self, _props: &Value) -> Option<Value> {
        None
    }

    fn inline_field(&self, _props: &Value) -> Option<Value> {
        None
    }

    fn stack(&self, _props: &Value) -> Option<Value> {
        None
    }
}

#[derive(Debug, Default)]
pub struct StubReactive;

#[async_trait]
impl ReactiveUtilities for StubReactive {
    async fn last_value_from(&self, input: Value) -> Value {
        input
    }
}
