//! Plaintext gRPC endpoint speaking the `pluginv2` backend protocol.

pub mod codec;
pub mod proto;
pub mod router;
pub mod services;

use std::{
    convert::Infallible,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use hyper::{body::Incoming, server::conn::http2, service::service_fn, Request};
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinHandle,
};
use tracing::Instrument;

use crate::{config::RpcConfig, discovery, server};

pub use services::ServiceTable;

/// A bound but not yet serving RPC listener.
pub struct RpcServer {
    listener: TcpListener,
    services: Arc<ServiceTable>,
    discovery_file: PathBuf,
}

/// Handle to a serving RPC listener whose port has been announced.
pub struct RunningRpc {
    addr: SocketAddr,
    task: JoinHandle<Result<()>>,
}

impl RpcServer {
    pub async fn bind(config: &RpcConfig, services: ServiceTable) -> Result<Self> {
        let addr = config.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind rpc listener on {addr}"))?;
        Ok(Self {
            listener,
            services: Arc::new(services),
            discovery_file: config.discovery_file.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("rpc listener has no local address")
    }

    /// Starts accepting, confirms the port answers, then writes the
    /// discovery file. The file only ever names a port that is serving.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> Result<RunningRpc> {
        let addr = self.local_addr()?;
        let task = tokio::spawn(serve(self.listener, self.services, shutdown));

        probe(addr).await?;
        discovery::write_discovery_file(&self.discovery_file, addr.port()).await?;
        tracing::info!(
            addr = %addr,
            discovery_file = %self.discovery_file.display(),
            "rpc server ready"
        );
        Ok(RunningRpc { addr, task })
    }
}

impl RunningRpc {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn wait(self) -> Result<()> {
        self.task.await.context("rpc server task aborted")?
    }
}

async fn serve(
    listener: TcpListener,
    services: Arc<ServiceTable>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                tracing::info!("rpc server shutting down");
                break;
            }
            accept = listener.accept() => {
                let Some((stream, peer_addr)) = server::accepted("rpc", accept).await else {
                    continue;
                };
                let services = services.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let services = services.clone();
                        async move {
                            let span = tracing::info_span!("rpc", path = %req.uri().path());
                            let response = router::route(&services, req).instrument(span).await;
                            Ok::<_, Infallible>(response)
                        }
                    });
                    if let Err(err) = http2::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        tracing::debug!(error = %err, peer = %peer_addr, "rpc connection closed with error");
                    }
                });
            }
        }
    }
    Ok(())
}

/// Connects once to the listening port so the announcement never races the
/// accept loop.
async fn probe(addr: SocketAddr) -> Result<()> {
    let target = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port())
        }
        _ => addr,
    };
    TcpStream::connect(target)
        .await
        .with_context(|| format!("rpc listener on {target} did not accept a probe connection"))?;
    Ok(())
}
