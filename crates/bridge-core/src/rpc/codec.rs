//! gRPC wire framing and status handling on top of hyper.
//!
//! Each message travels as a 5-byte prefix (compression flag, big-endian
//! length) followed by the protobuf payload. The call outcome is carried in
//! the `grpc-status` / `grpc-message` trailers.

use std::{convert::Infallible, fmt};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{stream::BoxStream, StreamExt};
use http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, StreamBody};
use hyper::body::Frame;
use prost::Message;

use crate::error::BridgeError;

pub const GRPC_CONTENT_TYPE: &str = "application/grpc";
const PREFIX_LEN: usize = 5;

pub type GrpcBody = UnsyncBoxBody<Bytes, Infallible>;

/// Server-streaming response as handed back by a service method.
pub type ServerStream<M> = BoxStream<'static, Result<M, Status>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Ok = 0,
    Unknown = 2,
    InvalidArgument = 3,
    FailedPrecondition = 9,
    Unimplemented = 12,
    Internal = 13,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::FailedPrecondition => "failed_precondition",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn write_to(&self, headers: &mut HeaderMap) {
        headers.insert("grpc-status", HeaderValue::from(self.code as i32));
        if !self.message.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&percent_encode(&self.message)) {
                headers.insert("grpc-message", value);
            }
        }
    }

    pub fn trailers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        self.write_to(&mut headers);
        headers
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl From<BridgeError> for Status {
    fn from(err: BridgeError) -> Self {
        let code = match err {
            BridgeError::NotInitialized | BridgeError::AlreadyLoaded => Code::FailedPrecondition,
            BridgeError::MalformedRequest(_) => Code::InvalidArgument,
            BridgeError::ModuleLoad(_) | BridgeError::Query(_) | BridgeError::Io(_) => {
                Code::Internal
            }
        };
        Status::new(code, err.to_string())
    }
}

/// `grpc-message` is percent-encoded: anything outside printable ASCII, and
/// `%` itself, is escaped.
fn percent_encode(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for byte in message.bytes() {
        if (0x20..=0x7e).contains(&byte) && byte != b'%' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

pub fn encode_message<M: Message>(message: &M) -> Bytes {
    let len = message.encoded_len();
    let mut buf = BytesMut::with_capacity(PREFIX_LEN + len);
    buf.put_u8(0);
    buf.put_u32(len as u32);
    buf.extend_from_slice(&message.encode_to_vec());
    buf.freeze()
}

/// Decodes a unary request body: exactly one uncompressed frame.
pub fn decode_message<M: Message + Default>(mut body: Bytes) -> Result<M, Status> {
    if body.len() < PREFIX_LEN {
        return Err(Status::invalid_argument("truncated grpc frame"));
    }
    let compressed = body.get_u8();
    let len = body.get_u32() as usize;
    if compressed != 0 {
        return Err(Status::unimplemented("compressed requests are not supported"));
    }
    if body.len() != len {
        return Err(Status::invalid_argument(format!(
            "grpc frame declares {len} bytes but carries {}",
            body.len()
        )));
    }
    M::decode(body).map_err(|err| Status::invalid_argument(format!("invalid payload: {err}")))
}

/// Body that emits one data frame per message and finishes with the status
/// trailers. Dropping the body drops the message stream.
pub fn stream_body<M>(messages: ServerStream<M>) -> GrpcBody
where
    M: Message + Send + 'static,
{
    let frames = futures::stream::unfold(Some(messages), |state| async move {
        let mut messages = state?;
        let frame = match messages.next().await {
            Some(Ok(message)) => {
                return Some((
                    Ok::<_, Infallible>(Frame::data(encode_message(&message))),
                    Some(messages),
                ))
            }
            Some(Err(status)) => Frame::trailers(status.trailers()),
            None => Frame::trailers(Status::ok().trailers()),
        };
        Some((Ok(frame), None))
    });
    StreamBody::new(frames).boxed_unsync()
}

pub fn grpc_response(body: GrpcBody) -> Response<GrpcBody> {
    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(GRPC_CONTENT_TYPE),
    );
    response
}

/// Trailers-only response: the status travels in the headers.
pub fn status_response(status: &Status) -> Response<GrpcBody> {
    let mut response = grpc_response(Empty::new().boxed_unsync());
    status.write_to(response.headers_mut());
    response
}

/// Plain HTTP rejection for requests that are not gRPC at all.
pub fn http_error(code: StatusCode) -> Response<GrpcBody> {
    let mut response = Response::new(Empty::new().boxed_unsync());
    *response.status_mut() = code;
    response
}

/// `application/grpc` or `application/grpc+<codec>`; `grpc-web` frames differ.
pub fn is_grpc(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            let essence = value.split(';').next().unwrap_or_default().trim();
            match essence.strip_prefix(GRPC_CONTENT_TYPE) {
                Some(rest) => rest.is_empty() || rest.starts_with('+'),
                None => false,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::proto;

    #[test]
    fn frames_carry_length_prefix() {
        let message = proto::ConversionResponse {
            uid: "abc".into(),
            ..Default::default()
        };
        let framed = encode_message(&message);
        assert_eq!(framed[0], 0);
        let len = u32::from_be_bytes([framed[1], framed[2], framed[3], framed[4]]) as usize;
        assert_eq!(len, framed.len() - 5);
        let decoded: proto::ConversionResponse = decode_message(framed).unwrap();
        assert_eq!(decoded.uid, "abc");
    }

    #[test]
    fn empty_message_is_a_bare_prefix() {
        let framed = encode_message(&proto::CheckHealthRequest::default());
        assert_eq!(&framed[..], &[0, 0, 0, 0, 0]);
        decode_message::<proto::CheckHealthRequest>(framed).unwrap();
    }

    #[test]
    fn rejects_truncated_and_compressed_frames() {
        let err = decode_message::<proto::StreamPacket>(Bytes::from_static(&[0, 0])).unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let err = decode_message::<proto::StreamPacket>(Bytes::from_static(&[1, 0, 0, 0, 0]))
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);

        let err = decode_message::<proto::StreamPacket>(Bytes::from_static(&[0, 0, 0, 0, 9, 1]))
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn status_trailers_are_percent_encoded() {
        let trailers = Status::internal("100% broken\n").trailers();
        assert_eq!(trailers["grpc-status"], "13");
        assert_eq!(trailers["grpc-message"], "100%25 broken%0A");
        assert!(Status::ok().trailers().get("grpc-message").is_none());
    }

    #[test]
    fn content_type_accepts_grpc_codecs_but_not_grpc_web() {
        let with = |value: &'static str| {
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
            is_grpc(&headers)
        };
        assert!(with("application/grpc"));
        assert!(with("application/grpc+proto"));
        assert!(with("application/grpc; charset=utf-8"));
        assert!(!with("application/grpc-web"));
        assert!(!with("application/grpc-web+proto"));
        assert!(!with("application/grpcx"));
        assert!(!with("application/json"));
        assert!(!is_grpc(&HeaderMap::new()));
    }

    #[test]
    fn not_initialized_maps_to_failed_precondition() {
        let status = Status::from(BridgeError::NotInitialized);
        assert_eq!(status.code(), Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn stream_body_ends_with_trailers() {
        let messages = futures::stream::iter(vec![
            Ok(proto::StreamPacket { data: vec![1] }),
            Ok(proto::StreamPacket { data: vec![2] }),
        ])
        .boxed();
        let collected = stream_body(messages).collect().await.unwrap();
        let trailers = collected.trailers().cloned().unwrap();
        assert_eq!(trailers["grpc-status"], "0");
        let bytes = collected.to_bytes();
        assert_eq!(bytes.len(), 2 * (5 + 3));
    }

    #[tokio::test]
    async fn stream_errors_stop_the_stream() {
        let messages = futures::stream::iter(vec![
            Err(Status::internal("boom")),
            Ok(proto::StreamPacket { data: vec![1] }),
        ])
        .boxed();
        let collected = stream_body(messages).collect().await.unwrap();
        assert_eq!(collected.trailers().unwrap()["grpc-status"], "13");
        assert!(collected.to_bytes().is_empty());
    }
}
