use std::{io, net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use tokio::{sync::watch, task::JoinSet};

use crate::{
    config::Config,
    dispatch::Dispatcher,
    http::HttpEndpoint,
    rpc::{RpcServer, ServiceTable},
};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Unwraps one accept result. On error (EMFILE, ENFILE, ...) it logs and
/// pauses before handing control back to the accept loop.
pub(crate) async fn accepted<T>(listener: &'static str, accept: io::Result<T>) -> Option<T> {
    match accept {
        Ok(accepted) => Some(accepted),
        Err(err) => {
            tracing::warn!(listener, error = %err, "accept failed; backing off");
            tokio::time::sleep(ACCEPT_BACKOFF).await;
            None
        }
    }
}

/// Both transports wired to one dispatcher.
pub struct Server {
    config: Config,
    dispatcher: Dispatcher,
}

/// Listeners that are up and serving, with the RPC port announced.
pub struct RunningServer {
    rpc_addr: SocketAddr,
    http_addr: Option<SocketAddr>,
    tasks: JoinSet<Result<()>>,
}

impl Server {
    pub fn new(config: Config, dispatcher: Dispatcher) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, dispatcher })
    }

    /// Binds every listener before any of them starts, so a bind failure
    /// leaves nothing announced.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> Result<RunningServer> {
        let services = ServiceTable::new(self.dispatcher.clone(), self.config.rpc.query_mode);
        let rpc = RpcServer::bind(&self.config.rpc, services).await?;
        let http = if self.config.http.enabled {
            let addr = self.config.http.bind_addr()?;
            Some(HttpEndpoint::bind(addr, self.dispatcher.clone()).await?)
        } else {
            None
        };
        let http_addr = http.as_ref().map(HttpEndpoint::local_addr).transpose()?;

        let mut tasks = JoinSet::new();
        if let Some(endpoint) = http {
            tasks.spawn(endpoint.run(shutdown.clone()));
        }
        let running = rpc.start(shutdown).await?;
        let rpc_addr = running.local_addr();
        tasks.spawn(running.wait());

        tracing::info!(
            rpc = %rpc_addr,
            http = http_addr.map(|addr| addr.to_string()).unwrap_or_else(|| "disabled".into()),
            query_mode = ?self.config.rpc.query_mode,
            "bridge listening"
        );
        Ok(RunningServer {
            rpc_addr,
            http_addr,
            tasks,
        })
    }

    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let running = self.start(shutdown_rx).await?;

        tracing::info!("awaiting shutdown signal (Ctrl+C)");
        tokio::signal::ctrl_c()
            .await
            .context("failed to install ctrl-c handler")?;
        tracing::info!("shutdown signal received; stopping listeners");
        shutdown_tx.send(true).ok();

        running.join().await;
        Ok(())
    }
}

impl RunningServer {
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Waits for every listener task to finish.
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(error = %format!("{err:#}"), "listener failed"),
                Err(err) => tracing::error!(error = %err, "listener task aborted"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{HttpConfig, RpcConfig},
        host::PluginHost,
        reference::ReferenceModule,
    };

    fn config(dir: &tempfile::TempDir, http_enabled: bool) -> Config {
        Config {
            rpc: RpcConfig {
                bind: "127.0.0.1:0".into(),
                discovery_file: dir.path().join("standalone.txt"),
                ..RpcConfig::default()
            },
            http: HttpConfig {
                enabled: http_enabled,
                bind: "127.0.0.1:0".into(),
            },
            ..Config::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_accepts_back_off_before_retrying() {
        let before = tokio::time::Instant::now();
        let emfile = io::Error::from_raw_os_error(24);
        assert!(accepted::<()>("rpc", Err(emfile)).await.is_none());
        assert!(before.elapsed() >= ACCEPT_BACKOFF);

        let before = tokio::time::Instant::now();
        assert_eq!(accepted("http", Ok(7)).await, Some(7));
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = Config::default();
        config.plugin.module = " ".into();
        let host = PluginHost::default();
        assert!(Server::new(config, host.dispatcher()).is_err());
    }

    #[tokio::test]
    async fn starts_both_listeners_and_announces_rpc_port() {
        let dir = tempfile::tempdir().unwrap();
        let host = PluginHost::default();
        host.loader().load(Box::new(ReferenceModule)).unwrap();
        let config = config(&dir, true);
        let discovery = config.rpc.discovery_file.clone();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let running = Server::new(config, host.dispatcher())
            .unwrap()
            .start(shutdown_rx)
            .await
            .unwrap();

        let announced = std::fs::read_to_string(discovery).unwrap();
        assert_eq!(announced, format!(":{}", running.rpc_addr().port()));
        let http_addr = running.http_addr().unwrap();
        tokio::net::TcpStream::connect(http_addr).await.unwrap();

        shutdown_tx.send(true).unwrap();
        running.join().await;
    }

    #[tokio::test]
    async fn http_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let host = PluginHost::default();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let running = Server::new(config(&dir, false), host.dispatcher())
            .unwrap()
            .start(shutdown_rx)
            .await
            .unwrap();
        assert!(running.http_addr().is_none());
        shutdown_tx.send(true).unwrap();
        running.join().await;
    }
}
