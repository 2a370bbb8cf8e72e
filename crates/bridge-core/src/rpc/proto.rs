//! `pluginv2` messages from the host's `backend.proto`.
//!
//! Declared with prost derives so the build does not need `protoc`. Field
//! numbers must match the upstream definition.

use std::collections::HashMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppInstanceSettings {
    #[prost(bytes = "vec", tag = "3")]
    pub json_data: Vec<u8>,
    #[prost(map = "string, string", tag = "4")]
    pub decrypted_secure_json_data: HashMap<String, String>,
    #[prost(int64, tag = "5")]
    pub last_updated_ms: i64,
    #[prost(string, tag = "6")]
    pub api_version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataSourceInstanceSettings {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub url: String,
    #[prost(string, tag = "4")]
    pub user: String,
    #[prost(string, tag = "5")]
    pub database: String,
    #[prost(bool, tag = "6")]
    pub basic_auth_enabled: bool,
    #[prost(string, tag = "7")]
    pub basic_auth_user: String,
    #[prost(bytes = "vec", tag = "8")]
    pub json_data: Vec<u8>,
    #[prost(map = "string, string", tag = "9")]
    pub decrypted_secure_json_data: HashMap<String, String>,
    #[prost(int64, tag = "10")]
    pub last_updated_ms: i64,
    #[prost(string, tag = "11")]
    pub uid: String,
    #[prost(string, tag = "12")]
    pub api_version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct User {
    #[prost(string, tag = "1")]
    pub login: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub email: String,
    #[prost(string, tag = "4")]
    pub role: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PluginContext {
    #[prost(int64, tag = "1")]
    pub org_id: i64,
    #[prost(string, tag = "2")]
    pub plugin_id: String,
    #[prost(message, optional, tag = "3")]
    pub user: Option<User>,
    #[prost(message, optional, tag = "4")]
    pub app_instance_settings: Option<AppInstanceSettings>,
    #[prost(message, optional, tag = "5")]
    pub data_source_instance_settings: Option<DataSourceInstanceSettings>,
    #[prost(string, tag = "6")]
    pub plugin_version: String,
    #[prost(string, tag = "7")]
    pub user_agent: String,
    #[prost(map = "string, string", tag = "8")]
    pub grafana_config: HashMap<String, String>,
    #[prost(string, tag = "9")]
    pub api_version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StringList {
    #[prost(string, repeated, tag = "1")]
    pub values: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallResourceRequest {
    #[prost(message, optional, tag = "1")]
    pub plugin_context: Option<PluginContext>,
    #[prost(string, tag = "2")]
    pub path: String,
    #[prost(string, tag = "3")]
    pub method: String,
    #[prost(string, tag = "4")]
    pub url: String,
    #[prost(map = "string, message", tag = "5")]
    pub headers: HashMap<String, StringList>,
    #[prost(bytes = "vec", tag = "6")]
    pub body: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallResourceResponse {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(map = "string, message", tag = "2")]
    pub headers: HashMap<String, StringList>,
    #[prost(bytes = "vec", tag = "3")]
    pub body: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimeRange {
    #[prost(int64, tag = "1")]
    pub from_epoch_ms: i64,
    #[prost(int64, tag = "2")]
    pub to_epoch_ms: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataQuery {
    #[prost(string, tag = "1")]
    pub ref_id: String,
    #[prost(int64, tag = "2")]
    pub max_data_points: i64,
    #[prost(int64, tag = "3")]
    pub interval_ms: i64,
    #[prost(message, optional, tag = "4")]
    pub time_range: Option<TimeRange>,
    #[prost(bytes = "vec", tag = "5")]
    pub json: Vec<u8>,
    #[prost(string, tag = "6")]
    pub query_type: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryDataRequest {
    #[prost(message, optional, tag = "1")]
    pub plugin_context: Option<PluginContext>,
    #[prost(map = "string, string", tag = "2")]
    pub headers: HashMap<String, String>,
    #[prost(message, repeated, tag = "3")]
    pub queries: Vec<DataQuery>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryDataResponse {
    #[prost(map = "string, message", tag = "1")]
    pub responses: HashMap<String, DataResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataResponse {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub frames: Vec<Vec<u8>>,
    #[prost(string, tag = "2")]
    pub error: String,
    #[prost(bytes = "vec", tag = "3")]
    pub json_meta: Vec<u8>,
    #[prost(int32, tag = "4")]
    pub status: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CollectMetricsRequest {
    #[prost(message, optional, tag = "1")]
    pub plugin_context: Option<PluginContext>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CollectMetricsResponse {
    #[prost(message, optional, tag = "1")]
    pub metrics: Option<collect_metrics_response::Payload>,
}

pub mod collect_metrics_response {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Payload {
        #[prost(bytes = "vec", tag = "1")]
        pub prometheus: Vec<u8>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckHealthRequest {
    #[prost(message, optional, tag = "1")]
    pub plugin_context: Option<PluginContext>,
    #[prost(map = "string, string", tag = "2")]
    pub headers: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckHealthResponse {
    #[prost(enumeration = "check_health_response::HealthStatus", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(bytes = "vec", tag = "3")]
    pub json_details: Vec<u8>,
}

pub mod check_health_response {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum HealthStatus {
        Unknown = 0,
        Ok = 1,
        Error = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeStreamRequest {
    #[prost(message, optional, tag = "1")]
    pub plugin_context: Option<PluginContext>,
    #[prost(string, tag = "2")]
    pub path: String,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeStreamResponse {
    #[prost(enumeration = "StreamStatus", tag = "1")]
    pub status: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublishStreamRequest {
    #[prost(message, optional, tag = "1")]
    pub plugin_context: Option<PluginContext>,
    #[prost(string, tag = "2")]
    pub path: String,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublishStreamResponse {
    #[prost(enumeration = "StreamStatus", tag = "1")]
    pub status: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

/// Shared by the subscribe and publish responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum StreamStatus {
    Ok = 0,
    NotFound = 1,
    PermissionDenied = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunStreamRequest {
    #[prost(message, optional, tag = "1")]
    pub plugin_context: Option<PluginContext>,
    #[prost(string, tag = "2")]
    pub path: String,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamPacket {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupVersionKind {
    #[prost(string, tag = "1")]
    pub group: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(string, tag = "3")]
    pub kind: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AdmissionRequest {
    #[prost(message, optional, tag = "1")]
    pub plugin_context: Option<PluginContext>,
    #[prost(enumeration = "admission_request::Operation", tag = "2")]
    pub operation: i32,
    #[prost(message, optional, tag = "3")]
    pub kind: Option<GroupVersionKind>,
    #[prost(bytes = "vec", tag = "4")]
    pub object_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub old_object_bytes: Vec<u8>,
}

pub mod admission_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Operation {
        Create = 0,
        Update = 1,
        Delete = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusResult {
    #[prost(string, tag = "1")]
    pub status: String,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(string, tag = "3")]
    pub reason: String,
    #[prost(int32, tag = "4")]
    pub code: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidationResponse {
    #[prost(bool, tag = "1")]
    pub allowed: bool,
    #[prost(message, optional, tag = "2")]
    pub result: Option<StatusResult>,
    #[prost(map = "string, string", tag = "3")]
    pub warnings: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MutationResponse {
    #[prost(bool, tag = "1")]
    pub allowed: bool,
    #[prost(message, optional, tag = "2")]
    pub result: Option<StatusResult>,
    #[prost(map = "string, string", tag = "3")]
    pub warnings: HashMap<String, String>,
    #[prost(bytes = "vec", tag = "4")]
    pub object_bytes: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawObject {
    #[prost(bytes = "vec", tag = "1")]
    pub raw: Vec<u8>,
    #[prost(string, tag = "2")]
    pub content_type: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConversionRequest {
    #[prost(message, optional, tag = "1")]
    pub plugin_context: Option<PluginContext>,
    #[prost(string, tag = "2")]
    pub uid: String,
    #[prost(message, repeated, tag = "3")]
    pub objects: Vec<RawObject>,
    #[prost(message, optional, tag = "4")]
    pub target_kind: Option<GroupVersionKind>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConversionResponse {
    #[prost(string, tag = "1")]
    pub uid: String,
    #[prost(message, repeated, tag = "2")]
    pub objects: Vec<RawObject>,
    #[prost(message, optional, tag = "3")]
    pub result: Option<StatusResult>,
}
