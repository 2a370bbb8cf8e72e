//! The six `pluginv2` service contracts and the host's implementations.
//!
//! Everything except `Data.QueryData` is a canned answer.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_plugin_sdk::{
    data::{DataSourceRef, RawTimeRange},
    QueryEnvelope, QueryResult, Target, TimeRange,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use super::{
    codec::{ServerStream, Status},
    proto,
};
use crate::{config::QueryMode, dispatch::Dispatcher};

#[async_trait]
pub trait DataService: Send + Sync + 'static {
    async fn query_data(
        &self,
        request: proto::QueryDataRequest,
    ) -> Result<proto::QueryDataResponse, Status>;
}

#[async_trait]
pub trait ResourceService: Send + Sync + 'static {
    async fn call_resource(
        &self,
        request: proto::CallResourceRequest,
    ) -> Result<ServerStream<proto::CallResourceResponse>, Status>;
}

#[async_trait]
pub trait DiagnosticsService: Send + Sync + 'static {
    async fn check_health(
        &self,
        request: proto::CheckHealthRequest,
    ) -> Result<proto::CheckHealthResponse, Status>;

    async fn collect_metrics(
        &self,
        request: proto::CollectMetricsRequest,
    ) -> Result<proto::CollectMetricsResponse, Status>;
}

#[async_trait]
pub trait StreamService: Send + Sync + 'static {
    async fn subscribe_stream(
        &self,
        request: proto::SubscribeStreamRequest,
    ) -> Result<proto::SubscribeStreamResponse, Status>;

    async fn run_stream(
        &self,
        request: proto::RunStreamRequest,
    ) -> Result<ServerStream<proto::StreamPacket>, Status>;

    async fn publish_stream(
        &self,
        request: proto::PublishStreamRequest,
    ) -> Result<proto::PublishStreamResponse, Status>;
}

#[async_trait]
pub trait AdmissionControlService: Send + Sync + 'static {
    async fn validate_admission(
        &self,
        request: proto::AdmissionRequest,
    ) -> Result<proto::ValidationResponse, Status>;

    async fn mutate_admission(
        &self,
        request: proto::AdmissionRequest,
    ) -> Result<proto::MutationResponse, Status>;
}

#[async_trait]
pub trait ResourceConversionService: Send + Sync + 'static {
    async fn convert_objects(
        &self,
        request: proto::ConversionRequest,
    ) -> Result<proto::ConversionResponse, Status>;
}

/// Implementations registered on the RPC server, one per service.
#[derive(Clone)]
pub struct ServiceTable {
    pub data: Arc<dyn DataService>,
    pub resource: Arc<dyn ResourceService>,
    pub diagnostics: Arc<dyn DiagnosticsService>,
    pub stream: Arc<dyn StreamService>,
    pub admission: Arc<dyn AdmissionControlService>,
    pub conversion: Arc<dyn ResourceConversionService>,
}

impl ServiceTable {
    pub fn new(dispatcher: Dispatcher, mode: QueryMode) -> Self {
        Self {
            data: Arc::new(QueryDataHandler { dispatcher, mode }),
            resource: Arc::new(StubResource),
            diagnostics: Arc::new(StubDiagnostics),
            stream: Arc::new(StubStream),
            admission: Arc::new(StubAdmission),
            conversion: Arc::new(StubConversion),
        }
    }
}

pub struct QueryDataHandler {
    dispatcher: Dispatcher,
    mode: QueryMode,
}

#[async_trait]
impl DataService for QueryDataHandler {
    async fn query_data(
        &self,
        request: proto::QueryDataRequest,
    ) -> Result<proto::QueryDataResponse, Status> {
        match self.mode {
            QueryMode::Stub => Ok(canned_query_response()),
            QueryMode::Dispatch => {
                let envelope = envelope_from_request(&request);
                let result = self.dispatcher.dispatch(envelope).await?;
                to_query_data_response(result)
            }
        }
    }
}

fn canned_query_response() -> proto::QueryDataResponse {
    let mut response = proto::QueryDataResponse::default();
    response.responses.insert(
        "A".into(),
        proto::DataResponse {
            status: 200,
            ..Default::default()
        },
    );
    response
}

/// The per-query JSON model panels send along with each `DataQuery`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QueryModel {
    query_text: Option<String>,
    constant: Option<Value>,
}

const REQUEST_ID: &str = "SQR101";
const DEFAULT_INTERVAL: &str = "30s";

/// Builds the panel-style envelope a browser data source expects out of a
/// backend query request.
fn envelope_from_request(request: &proto::QueryDataRequest) -> QueryEnvelope {
    // instance settings on the wire carry no type; a data source's type is its plugin id
    let datasource = request.plugin_context.as_ref().map(|ctx| DataSourceRef {
        kind: ctx.plugin_id.clone(),
        uid: ctx
            .data_source_instance_settings
            .as_ref()
            .map(|settings| settings.uid.clone())
            .unwrap_or_default(),
    });

    let targets = request
        .queries
        .iter()
        .map(|query| {
            let model: QueryModel = serde_json::from_slice(&query.json).unwrap_or_default();
            Target {
                ref_id: query.ref_id.clone(),
                query_text: model.query_text,
                constant: model.constant.as_ref().and_then(number_like),
                datasource: datasource.clone(),
            }
        })
        .collect();

    let first = request.queries.first();
    let interval_ms = first.map(|query| query.interval_ms).filter(|ms| *ms > 0);
    QueryEnvelope {
        targets,
        range: first
            .and_then(|query| query.time_range.as_ref())
            .and_then(time_range),
        app: Some("dashboard".into()),
        request_id: Some(REQUEST_ID.into()),
        timezone: Some("browser".into()),
        interval: Some(interval_ms.map_or_else(|| DEFAULT_INTERVAL.into(), interval_label)),
        interval_ms,
        max_data_points: first.map(|query| query.max_data_points).filter(|n| *n > 0),
    }
}

fn interval_label(ms: i64) -> String {
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{ms}ms")
    }
}

fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn time_range(range: &proto::TimeRange) -> Option<TimeRange> {
    let from = DateTime::<Utc>::from_timestamp_millis(range.from_epoch_ms)?;
    let to = DateTime::<Utc>::from_timestamp_millis(range.to_epoch_ms)?;
    Some(TimeRange {
        from,
        to,
        raw: Some(RawTimeRange {
            from: from.to_rfc3339(),
            to: to.to_rfc3339(),
        }),
    })
}

/// Frames are carried as JSON-encoded bytes.
fn to_query_data_response(result: QueryResult) -> Result<proto::QueryDataResponse, Status> {
    let mut response = proto::QueryDataResponse::default();
    for (ref_id, data) in result.responses {
        let frames = data
            .frames
            .iter()
            .map(serde_json::to_vec)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                Status::internal(format!("failed to encode frames for {ref_id}: {err}"))
            })?;
        response.responses.insert(
            ref_id,
            proto::DataResponse {
                frames,
                error: data.error.unwrap_or_default(),
                json_meta: Vec::new(),
                status: i32::from(data.status),
            },
        );
    }
    Ok(response)
}

pub struct StubResource;

#[async_trait]
impl ResourceService for StubResource {
    async fn call_resource(
        &self,
        request: proto::CallResourceRequest,
    ) -> Result<ServerStream<proto::CallResourceResponse>, Status> {
        tracing::debug!(path = %request.path, method = %request.method, "resource call closed without data");
        Ok(futures::stream::empty().boxed())
    }
}

pub struct StubDiagnostics;

#[async_trait]
impl DiagnosticsService for StubDiagnostics {
    async fn check_health(
        &self,
        _request: proto::CheckHealthRequest,
    ) -> Result<proto::CheckHealthResponse, Status> {
        Ok(proto::CheckHealthResponse {
            status: proto::check_health_response::HealthStatus::Ok as i32,
            message: "OK".into(),
            json_details: Vec::new(),
        })
    }

    async fn collect_metrics(
        &self,
        _request: proto::CollectMetricsRequest,
    ) -> Result<proto::CollectMetricsResponse, Status> {
        Ok(proto::CollectMetricsResponse::default())
    }
}

pub struct StubStream;

#[async_trait]
impl StreamService for StubStream {
    async fn subscribe_stream(
        &self,
        _request: proto::SubscribeStreamRequest,
    ) -> Result<proto::SubscribeStreamResponse, Status> {
        Ok(proto::SubscribeStreamResponse {
            status: proto::StreamStatus::Ok as i32,
            data: Vec::new(),
        })
    }

    async fn run_stream(
        &self,
        request: proto::RunStreamRequest,
    ) -> Result<ServerStream<proto::StreamPacket>, Status> {
        tracing::debug!(path = %request.path, "stream closed without packets");
        Ok(futures::stream::empty().boxed())
    }

    async fn publish_stream(
        &self,
        _request: proto::PublishStreamRequest,
    ) -> Result<proto::PublishStreamResponse, Status> {
        Ok(proto::PublishStreamResponse {
            status: proto::StreamStatus::Ok as i32,
            data: Vec::new(),
        })
    }
}

pub struct StubAdmission;

#[async_trait]
impl AdmissionControlService for StubAdmission {
    async fn validate_admission(
        &self,
        _request: proto::AdmissionRequest,
    ) -> Result<proto::ValidationResponse, Status> {
        Ok(proto::ValidationResponse {
            allowed: true,
            ..Default::default()
        })
    }

    async fn mutate_admission(
        &self,
        _request: proto::AdmissionRequest,
    ) -> Result<proto::MutationResponse, Status> {
        Ok(proto::MutationResponse {
            allowed: true,
            ..Default::default()
        })
    }
}

pub struct StubConversion;

#[async_trait]
impl ResourceConversionService for StubConversion {
    async fn convert_objects(
        &self,
        request: proto::ConversionRequest,
    ) -> Result<proto::ConversionResponse, Status> {
        Ok(proto::ConversionResponse {
            uid: request.uid,
            ..Default::default()
        })
    }
}
