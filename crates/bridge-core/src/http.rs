//! JSON-over-HTTP verification endpoint: `POST /query` straight into the
//! dispatcher.

use std::{convert::Infallible, fmt, net::SocketAddr, time::Instant};

use anyhow::{Context, Result};
use bridge_plugin_sdk::{QueryEnvelope, QueryResult};
use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Body, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::{net::TcpListener, sync::watch};
use tracing::Instrument;

use crate::{
    dispatch::Dispatcher,
    error::{BridgeError, BridgeResult},
    server,
};

pub const QUERY_PATH: &str = "/query";

pub struct HttpEndpoint {
    listener: TcpListener,
    dispatcher: Dispatcher,
}

impl HttpEndpoint {
    pub async fn bind(addr: SocketAddr, dispatcher: Dispatcher) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind http endpoint on {addr}"))?;
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("http endpoint has no local address")
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(addr = %addr, path = QUERY_PATH, "http endpoint ready");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    tracing::info!("http endpoint shutting down");
                    break;
                }
                accept = self.listener.accept() => {
                    let Some((stream, peer_addr)) = server::accepted("http", accept).await else {
                        continue;
                    };
                    let dispatcher = self.dispatcher.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req: Request<Incoming>| {
                            let dispatcher = dispatcher.clone();
                            async move { Ok::<_, Infallible>(handle_request(&dispatcher, req).await) }
                        });
                        if let Err(err) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            tracing::debug!(error = %err, peer = %peer_addr, "http connection closed with error");
                        }
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

/// Handles one request end to end. Every failure, parse or dispatch, comes
/// back as a structured JSON error.
pub async fn handle_request<B>(dispatcher: &Dispatcher, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: fmt::Display,
{
    let start = Instant::now();
    let span = tracing::info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        status = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    );
    let response = respond(dispatcher, req).instrument(span.clone()).await;
    span.record("status", response.status().as_u16());
    span.record("duration_ms", start.elapsed().as_millis() as u64);
    response
}

async fn respond<B>(dispatcher: &Dispatcher, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: fmt::Display,
{
    if req.uri().path() != QUERY_PATH {
        return error_response(StatusCode::NOT_FOUND, format!("no endpoint at {}", req.uri().path()));
    }
    if req.method() != Method::POST {
        let mut response = error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{} is not supported on {QUERY_PATH}", req.method()),
        );
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static("POST"));
        return response;
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {err}"),
            )
        }
    };

    match run_query(dispatcher, &body).await {
        Ok(result) => json_response(StatusCode::OK, &result),
        Err(err) => {
            if !matches!(err, BridgeError::MalformedRequest(_)) {
                tracing::warn!(error = %err, "query request failed");
            }
            error_response(err.http_status(), err.to_string())
        }
    }
}

async fn run_query(dispatcher: &Dispatcher, body: &[u8]) -> BridgeResult<QueryResult> {
    let envelope: QueryEnvelope = serde_json::from_slice(body)
        .map_err(|_| BridgeError::MalformedRequest(String::from_utf8_lossy(body).into_owned()))?;
    dispatcher.dispatch(envelope).await
}

fn error_response(status: StatusCode, message: String) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ErrorBody {
            status: "error",
            message,
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, Bytes::from(body)),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize response body");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(br#"{"status":"error","message":"internal error"}"#),
            )
        }
    };
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{host::PluginHost, reference::ReferenceModule};
    use async_trait::async_trait;
    use bridge_plugin_sdk::{DataSource, PluginDescriptor};
    use serde_json::{json, Value};

    fn post(path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::post(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body.to_owned())))
            .unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    const ENVELOPE: &str = r#"{
        "targets": [{ "refId": "A", "queryText": "test", "constant": 6.5 }],
        "range": { "from": "2024-01-01T00:00:00Z", "to": "2024-01-02T00:00:00Z" }
    }"#;

    #[tokio::test]
    async fn malformed_body_is_bad_request_with_raw_body() {
        let host = PluginHost::default();
        let response = handle_request(&host.dispatcher(), post(QUERY_PATH, "not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Invalid JSONnot json");
    }

    #[tokio::test]
    async fn query_before_load_is_structured_unavailable() {
        let host = PluginHost::default();
        let response = handle_request(&host.dispatcher(), post(QUERY_PATH, ENVELOPE)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("no plugin instance"));
    }

    #[tokio::test]
    async fn query_after_load_returns_result() {
        let host = PluginHost::default();
        host.loader().load(Box::new(ReferenceModule)).unwrap();
        let response = handle_request(&host.dispatcher(), post(QUERY_PATH, ENVELOPE)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let frame = &body["responses"]["A"]["frames"][0];
        assert_eq!(frame["refId"], "A");
        assert_eq!(frame["length"], 2);
    }

    struct Broken;

    #[async_trait]
    impl DataSource for Broken {
        async fn query(&self, _request: QueryEnvelope) -> anyhow::Result<QueryResult> {
            anyhow::bail!("upstream exploded")
        }
    }

    #[tokio::test]
    async fn plugin_failure_is_internal_error() {
        let host = PluginHost::default();
        host.loader()
            .define(&[] as &[&str], |_deps| {
                Ok(bridge_plugin_sdk::ModuleExports {
                    plugin: PluginDescriptor::new(|_settings| Ok(Broken)),
                })
            })
            .unwrap();
        let response = handle_request(&host.dispatcher(), post(QUERY_PATH, ENVELOPE)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("upstream exploded"));
    }

    #[tokio::test]
    async fn other_paths_and_methods_are_rejected() {
        let host = PluginHost::default();
        let dispatcher = host.dispatcher();

        let response = handle_request(&dispatcher, post("/elsewhere", ENVELOPE)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["status"], "error");

        let get = Request::get(QUERY_PATH).body(Full::new(Bytes::new())).unwrap();
        let response = handle_request(&dispatcher, get).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "POST");
    }

    #[tokio::test]
    async fn serves_queries_over_a_real_socket() {
        let host = PluginHost::default();
        host.loader().load(Box::new(ReferenceModule)).unwrap();
        let endpoint = HttpEndpoint::bind("127.0.0.1:0".parse().unwrap(), host.dispatcher())
            .await
            .unwrap();
        let addr = endpoint.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(endpoint.run(shutdown_rx));

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(conn);
        let request = Request::post(QUERY_PATH)
            .header(header::HOST, addr.to_string())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from_static(ENVELOPE.as_bytes())))
            .unwrap();
        let response = sender.send_request(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["responses"]["A"]["status"], json!(200));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
