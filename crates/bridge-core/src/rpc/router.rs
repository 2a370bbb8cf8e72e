use std::{fmt, future::Future};

use bytes::Bytes;
use futures::StreamExt;
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Body;
use prost::Message;

use super::{
    codec::{
        decode_message, grpc_response, http_error, is_grpc, status_response, stream_body, Code,
        GrpcBody, ServerStream, Status,
    },
    services::ServiceTable,
};

/// Dispatches one gRPC call by its `/<package>.<Service>/<Method>` path.
pub async fn route<B>(services: &ServiceTable, req: Request<B>) -> Response<GrpcBody>
where
    B: Body,
    B::Error: fmt::Display,
{
    if req.method() != Method::POST {
        return http_error(StatusCode::METHOD_NOT_ALLOWED);
    }
    if !is_grpc(req.headers()) {
        return http_error(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    let path = req.uri().path().to_owned();
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            return status_response(&Status::internal(format!(
                "failed to read request body: {err}"
            )))
        }
    };

    match path.as_str() {
        "/pluginv2.Data/QueryData" => {
            unary("Data/QueryData", body, |r| services.data.query_data(r)).await
        }
        "/pluginv2.Resource/CallResource" => {
            server_streaming("Resource/CallResource", body, |r| {
                services.resource.call_resource(r)
            })
            .await
        }
        "/pluginv2.Diagnostics/CheckHealth" => {
            unary("Diagnostics/CheckHealth", body, |r| {
                services.diagnostics.check_health(r)
            })
            .await
        }
        "/pluginv2.Diagnostics/CollectMetrics" => {
            unary("Diagnostics/CollectMetrics", body, |r| {
                services.diagnostics.collect_metrics(r)
            })
            .await
        }
        "/pluginv2.Stream/SubscribeStream" => {
            unary("Stream/SubscribeStream", body, |r| {
                services.stream.subscribe_stream(r)
            })
            .await
        }
        "/pluginv2.Stream/RunStream" => {
            server_streaming("Stream/RunStream", body, |r| services.stream.run_stream(r)).await
        }
        "/pluginv2.Stream/PublishStream" => {
            unary("Stream/PublishStream", body, |r| {
                services.stream.publish_stream(r)
            })
            .await
        }
        "/pluginv2.AdmissionControl/ValidateAdmission" => {
            unary("AdmissionControl/ValidateAdmission", body, |r| {
                services.admission.validate_admission(r)
            })
            .await
        }
        "/pluginv2.AdmissionControl/MutateAdmission" => {
            unary("AdmissionControl/MutateAdmission", body, |r| {
                services.admission.mutate_admission(r)
            })
            .await
        }
        "/pluginv2.ResourceConversion/ConvertObjects" => {
            unary("ResourceConversion/ConvertObjects", body, |r| {
                services.conversion.convert_objects(r)
            })
            .await
        }
        _ => {
            record("unknown", Code::Unimplemented);
            tracing::debug!(path = %path, "unknown rpc method");
            status_response(&Status::unimplemented(format!("unknown method {path}")))
        }
    }
}

async fn unary<Req, Resp, F, Fut>(
    method: &'static str,
    body: Bytes,
    call: F,
) -> Response<GrpcBody>
where
    Req: Message + Default,
    Resp: Message + Send + 'static,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = Result<Resp, Status>>,
{
    let outcome = match decode_message::<Req>(body) {
        Ok(request) => call(request).await,
        Err(status) => Err(status),
    };
    match outcome {
        Ok(response) => {
            record(method, Code::Ok);
            let single = futures::stream::once(async move { Ok(response) }).boxed();
            grpc_response(stream_body(single))
        }
        Err(status) => failed(method, &status),
    }
}

async fn server_streaming<Req, Resp, F, Fut>(
    method: &'static str,
    body: Bytes,
    call: F,
) -> Response<GrpcBody>
where
    Req: Message + Default,
    Resp: Message + Send + 'static,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = Result<ServerStream<Resp>, Status>>,
{
    let outcome = match decode_message::<Req>(body) {
        Ok(request) => call(request).await,
        Err(status) => Err(status),
    };
    match outcome {
        Ok(messages) => {
            record(method, Code::Ok);
            grpc_response(stream_body(messages))
        }
        Err(status) => failed(method, &status),
    }
}

fn failed(method: &'static str, status: &Status) -> Response<GrpcBody> {
    record(method, status.code());
    tracing::warn!(method, code = status.code().as_str(), message = status.message(), "rpc failed");
    status_response(status)
}

fn record(method: &'static str, code: Code) {
    metrics::counter!("bridge_rpc_calls_total", "method" => method, "code" => code.as_str())
        .increment(1);
}
