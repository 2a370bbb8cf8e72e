pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod http;
pub mod loader;
pub mod reference;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod stubs;

pub use dispatch::Dispatcher;
pub use error::{BridgeError, BridgeResult};
pub use host::PluginHost;

/// Returns the crate version baked in at compile time.
pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
