use std::sync::Arc;

use bridge_plugin_sdk::{HealthCheck, QueryEnvelope, QueryResult};

use crate::{
    error::{BridgeError, BridgeResult},
    loader::PluginSlot,
};

/// Single entry point both transports use to reach the plugin.
///
/// Calls are forwarded as-is, without caching, retries or locking. The
/// plugin's `DataSource` impl is responsible for being safe to call
/// concurrently.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    slot: Arc<PluginSlot>,
}

impl Dispatcher {
    pub fn new(slot: Arc<PluginSlot>) -> Self {
        Self { slot }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.is_loaded()
    }

    pub async fn dispatch(&self, envelope: QueryEnvelope) -> BridgeResult<QueryResult> {
        let Some(instance) = self.slot.get() else {
            tracing::warn!("query received before a plugin instance exists");
            metrics::counter!("bridge_queries_total", "outcome" => "not_initialized").increment(1);
            return Err(BridgeError::NotInitialized);
        };
        let targets = envelope.targets.len();
        match instance.query(envelope).await {
            Ok(result) => {
                tracing::debug!(targets, responses = result.responses.len(), "query completed");
                metrics::counter!("bridge_queries_total", "outcome" => "ok").increment(1);
                Ok(result)
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), targets, "plugin query failed");
                metrics::counter!("bridge_queries_total", "outcome" => "error").increment(1);
                Err(BridgeError::query(err))
            }
        }
    }

    /// Runs the plugin's own connectivity self-test.
    pub async fn check_health(&self) -> BridgeResult<HealthCheck> {
        let instance = self.slot.get().ok_or(BridgeError::NotInitialized)?;
        instance.test_datasource().await.map_err(BridgeError::query)
    }
}
