use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    data::{DataFrame, FieldType, FrameOptions},
    DataSourceConstructor, PluginDescriptor,
};

pub const DATA_MODEL_API: &str = "data-model-api";
pub const RUNTIME_API: &str = "runtime-api";
pub const UI_WIDGETS_API: &str = "ui-widgets-api";
pub const REACTIVE_UTILITIES: &str = "reactive-utilities";

/// Frame construction, field types and the data source plugin descriptor.
pub trait DataModelApi: Send + Sync {
    fn create_data_frame(&self, options: FrameOptions) -> DataFrame;

    fn field_types(&self) -> &'static [FieldType] {
        &FieldType::ALL
    }

    /// Wraps a data source constructor into the descriptor a module exports.
    fn data_source_plugin(&self, constructor: DataSourceConstructor) -> PluginDescriptor {
        PluginDescriptor::from_constructor(constructor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub status: Option<u16>,
    pub status_text: Option<String>,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.status_text) {
            (Some(status), Some(text)) => write!(f, "fetch failed with {status}: {text}"),
            (Some(status), None) => write!(f, "fetch failed with {status}"),
            (None, Some(text)) => write!(f, "fetch failed: {text}"),
            (None, None) => f.write_str("fetch failed"),
        }
    }
}

impl std::error::Error for FetchError {}

#[async_trait]
pub trait BackendSrv: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

pub trait RuntimeApi: Send + Sync {
    fn backend_srv(&self) -> Arc<dyn BackendSrv>;

    fn is_fetch_error(&self, err: &(dyn std::error::Error + 'static)) -> bool {
        err.is::<FetchError>()
    }
}

/// Editor widgets. Rendering is out of scope for a headless host, so every
/// widget may return `None`.
pub trait UiWidgetsApi: Send + Sync {
    fn input(&self, props: &Value) -> Option<Value>;
    fn secret_input(&self, props: &Value) -> Option<Value>;
    fn inline_field(&self, props: &Value) -> Option<Value>;
    fn stack(&self, props: &Value) -> Option<Value>;
}

#[async_trait]
pub trait ReactiveUtilities: Send + Sync {
    /// Settles an observable-like value into its last emission.
    async fn last_value_from(&self, input: Value) -> Value;
}

/// Null object handed out for dependency names the host does not know.
///
/// Every member read and every call yields the same value, so a module can
/// probe it arbitrarily deep without failing at load time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Inert;

pub static INERT: Inert = Inert;

impl Inert {
    pub fn shared() -> &'static Inert {
        &INERT
    }

    pub fn member(&self, _name: &str) -> &Inert {
        self
    }

    pub fn call(&self, _args: &[Value]) -> &Inert {
        self
    }

    /// Writes are accepted and discarded.
    pub fn set(&self, _name: &str, _value: Value) -> bool {
        true
    }
}

/// A resolved dependency as handed to a module factory.
#[derive(Clone)]
pub enum Capability {
    DataModel(Arc<dyn DataModelApi>),
    Runtime(Arc<dyn RuntimeApi>),
    UiWidgets(Arc<dyn UiWidgetsApi>),
    Reactive(Arc<dyn ReactiveUtilities>),
    Inert(&'static Inert),
}

impl Capability {
    pub fn kind(&self) -> &'static str {
        match self {
            Capability::DataModel(_) => DATA_MODEL_API,
            Capability::Runtime(_) => RUNTIME_API,
            Capability::UiWidgets(_) => UI_WIDGETS_API,
            Capability::Reactive(_) => REACTIVE_UTILITIES,
            Capability::Inert(_) => "inert",
        }
    }

    pub fn is_inert(&self) -> bool {
        matches!(self, Capability::Inert(_))
    }

    pub fn as_inert(&self) -> Option<&'static Inert> {
        match self {
            Capability::Inert(inert) => Some(*inert),
            _ => None,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.kind()).finish()
    }
}

/// Dependencies in the order a module declared them.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDependencies {
    entries: Vec<(String, Capability)>,
}

impl ResolvedDependencies {
    pub fn new(entries: Vec<(String, Capability)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Capability> {
        self.entries.get(index).map(|(_, cap)| cap)
    }

    pub fn by_name(&self, name: &str) -> Option<&Capability> {
        self.entries
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, cap)| cap)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Capability)> {
        self.entries.iter().map(|(name, cap)| (name.as_str(), cap))
    }

    pub fn inert_names(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, cap)| cap.is_inert())
            .map(|(name, _)| name)
    }

    pub fn data_model(&self) -> Option<Arc<dyn DataModelApi>> {
        self.entries.iter().find_map(|(_, cap)| match cap {
            Capability::DataModel(api) => Some(api.clone()),
            _ => None,
        })
    }

    pub fn runtime(&self) -> Option<Arc<dyn RuntimeApi>> {
        self.entries.iter().find_map(|(_, cap)| match cap {
            Capability::Runtime(api) => Some(api.clone()),
            _ => None,
        })
    }

    pub fn ui_widgets(&self) -> Option<Arc<dyn UiWidgetsApi>> {
        self.entries.iter().find_map(|(_, cap)| match cap {
            Capability::UiWidgets(api) => Some(api.clone()),
            _ => None,
        })
    }

    pub fn reactive(&self) -> Option<Arc<dyn ReactiveUtilities>> {
        self.entries.iter().find_map(|(_, cap)| match cap {
            Capability::Reactive(api) => Some(api.clone()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inert_member_and_call_return_itself() {
        let inert = Inert::shared();
        assert!(std::ptr::eq(inert.member("anything"), inert));
        assert!(std::ptr::eq(inert.call(&[]), inert));
        let deep = inert
            .member("a")
            .member("b")
            .call(&[json!(1), json!("x")])
            .member("c");
        assert!(std::ptr::eq(deep, inert));
        assert!(inert.set("x", json!(true)));
    }

    #[test]
    fn resolved_dependencies_keep_declared_order() {
        let deps = ResolvedDependencies::new(vec![
            ("react".into(), Capability::Inert(Inert::shared())),
            ("lodash".into(), Capability::Inert(Inert::shared())),
        ]);
        assert_eq!(deps.len(), 2);
        let names: Vec<_> = deps.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["react", "lodash"]);
        assert!(deps.get(1).unwrap().is_inert());
        assert!(deps.by_name("missing").is_none());
        assert!(deps.data_model().is_none());
        assert_eq!(deps.inert_names().count(), 2);
    }

    #[test]
    fn fetch_error_is_detected_through_dyn_error() {
        struct Runtime;
        impl RuntimeApi for Runtime {
            fn backend_srv(&self) -> Arc<dyn BackendSrv> {
                unreachable!()
            }
        }
        let err = FetchError {
            status: Some(502),
            status_text: Some("Bad Gateway".into()),
        };
        assert!(Runtime.is_fetch_error(&err));
        let other = std::io::Error::other("boom");
        assert!(!Runtime.is_fetch_error(&other));
        assert_eq!(err.to_string(), "fetch failed with 502: Bad Gateway");
    }
}
