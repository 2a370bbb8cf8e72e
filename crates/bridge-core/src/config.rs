use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Root configuration structure deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub http: HttpConfig,
    pub plugin: PluginConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub bind: String,
    pub discovery_file: PathBuf,
    pub query_mode: QueryMode,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:0".into(),
            discovery_file: PathBuf::from("./dist/standalone.txt"),
            query_mode: QueryMode::Stub,
        }
    }
}

/// How `Data.QueryData` is answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Forward to the loaded plugin. Frames travel as JSON bytes, which
    /// only bridge-aware callers decode.
    Dispatch,
    /// Canned response: `"A"` with no frames and status 200.
    #[default]
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:8080".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub module: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            module: "reference".into(),
        }
    }
}

impl Config {
    /// Validates structural invariants and provides actionable error messages.
    pub fn validate(&self) -> Result<()> {
        self.rpc.validate()?;
        self.http.validate()?;
        if self.plugin.module.trim().is_empty() {
            bail!("plugin.module must not be empty");
        }
        Ok(())
    }
}

impl RpcConfig {
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()
            .with_context(|| format!("invalid rpc bind address `{}`", self.bind))?;
        if self.discovery_file.as_os_str().is_empty() {
            bail!("rpc.discovery_file must not be empty");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        parse_bind_addr(&self.bind)
    }
}

impl HttpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled {
            self.bind_addr()
                .with_context(|| format!("invalid http bind address `{}`", self.bind))?;
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        parse_bind_addr(&self.bind)
    }
}

/// Accepts `host:port` or the `:port` shorthand for all interfaces.
pub fn parse_bind_addr(bind: &str) -> Result<SocketAddr> {
    if bind.starts_with(':') {
        let addr = format!("0.0.0.0{bind}");
        Ok(SocketAddr::from_str(&addr)?)
    } else {
        Ok(SocketAddr::from_str(bind)?)
    }
}
