//! Transport-agnostic command dispatcher.
//!
//! `Dispatcher` takes a [`TransportRequest`] (request head plus the raw JSON
//! payload from either the `json` query parameter or the POST body), resolves
//! `/<target>/<operation>` against the registry, invokes the operation and
//! encodes the `{data, status}` envelope. It has no HTTP framework
//! dependency; the `axum` feature only adds `IntoResponse` for [`Reply`].
//!
//! # Usage
//!
//! ```ignore
//! let dispatcher = Dispatcher::new(registry).with_config(config);
//!
//! let head = RequestHead::new(RequestMethod::Get, "/Greeter/sayHello");
//! let reply = dispatcher
//!     .handle(TransportRequest::get(head, Some(r#"["World"]"#.into())))
//!     .await;
//! ```

use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use regex::Regex;
use serde_json::Value;

use crate::codec::{Codec, SerdeJsonCodec};
use crate::config::DispatchConfig;
use crate::context::{RawResponse, RequestContext, RequestHead, ResponseSlot};
use crate::encoder::{EncodedResponse, Envelope, ResponseEncoder};
use crate::error::{DispatchError, RegistryError, TransportFault};
use crate::invoker::Invoker;
use crate::registry::{Arguments, TargetRegistry};
use crate::resolver::OperationResolver;

/// `/controller/method[/anything]`; the trailing part is ignored.
fn command_path() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/([^/]+)/([^/]+)(.*)$").ok())
        .as_ref()
}

// ---------------------------------------------------------------------------
// Transport-facing types
// ---------------------------------------------------------------------------

/// Where the JSON argument list arrived.
#[derive(Debug)]
pub enum Payload {
    /// Value of the `json` query parameter, already URL-decoded.
    Query(Option<String>),
    /// POST body with the declared `Content-Length`.
    Body {
        content_length: Option<u64>,
        bytes: io::Result<Vec<u8>>,
    },
}

#[derive(Debug)]
pub struct TransportRequest {
    pub head: RequestHead,
    pub payload: Payload,
}

impl TransportRequest {
    pub fn get(head: RequestHead, json: Option<String>) -> Self {
        Self {
            head,
            payload: Payload::Query(json),
        }
    }

    pub fn post(head: RequestHead, content_length: Option<u64>, bytes: io::Result<Vec<u8>>) -> Self {
        Self {
            head,
            payload: Payload::Body {
                content_length,
                bytes,
            },
        }
    }
}

/// What the transport should send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A serialized envelope.
    Encoded(EncodedResponse),
    /// A response written by a self-handling operation, or a bare status.
    Raw(RawResponse),
    /// Nothing can be delivered; the peer is gone.
    Empty,
}

impl Reply {
    /// Decode the envelope of an `Encoded` reply. Compressed bodies are
    /// inflated first.
    pub fn envelope(&self) -> Option<Envelope> {
        let Reply::Encoded(encoded) = self else {
            return None;
        };
        if encoded.is_compressed() {
            use std::io::Read;
            let mut plain = Vec::new();
            flate2::read::GzDecoder::new(encoded.body.as_slice())
                .read_to_end(&mut plain)
                .ok()?;
            serde_json::from_slice(&plain).ok()
        } else {
            serde_json::from_slice(&encoded.body).ok()
        }
    }
}

/// Result of running one command, before anything is encoded.
#[derive(Debug)]
enum Outcome {
    Envelope(Envelope),
    SelfHandled(Option<RawResponse>),
}

impl From<DispatchError> for Outcome {
    fn from(err: DispatchError) -> Self {
        Outcome::Envelope(Envelope::failure(err.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher {
    registry: Arc<dyn TargetRegistry>,
    codec: Arc<dyn Codec>,
    resolver: OperationResolver,
    invoker: Invoker,
    encoder: ResponseEncoder,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<dyn TargetRegistry>) -> Self {
        let config = DispatchConfig::default();
        Self {
            registry,
            codec: Arc::new(SerdeJsonCodec),
            resolver: OperationResolver::new(),
            invoker: Invoker::new(),
            encoder: ResponseEncoder::new(config.compression_threshold),
            config,
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.encoder = ResponseEncoder::new(config.compression_threshold);
        self.config = config;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn registry(&self) -> &Arc<dyn TargetRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &OperationResolver {
        &self.resolver
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Handle one inbound command request end to end.
    pub async fn handle(&self, request: TransportRequest) -> Reply {
        let TransportRequest { head, payload } = request;
        let accept = head.header("accept-encoding").map(str::to_owned);
        let accept = accept.as_deref();

        let json = match self.read_payload(head.method.as_str(), payload) {
            Ok(json) => json,
            Err(PayloadError::Caller(err)) => {
                tracing::warn!("[Dispatcher] {} {}: {}", head.method.as_str(), head.path, err);
                return self.respond(&Envelope::failure(err.to_string()), accept);
            }
            Err(PayloadError::Fault(fault)) => return self.recover(fault, accept),
        };

        let head = Arc::new(head);
        let outcome = match self.process(Arc::clone(&head), &json).await {
            Ok(outcome) => outcome,
            Err(fault) => return self.recover(fault, accept),
        };

        match outcome {
            Outcome::SelfHandled(Some(raw)) => Reply::Raw(raw),
            Outcome::SelfHandled(None) => Reply::Raw(RawResponse::new(200)),
            Outcome::Envelope(envelope) => {
                let start = Instant::now();
                let reply = self.respond(&envelope, accept);
                let elapsed = start.elapsed();
                if elapsed > self.config.slow_call_threshold() {
                    tracing::info!(
                        "[Dispatcher] Slow return response: {} took {} ms",
                        self.preview(&json),
                        elapsed.as_millis()
                    );
                }
                reply
            }
        }
    }

    /// Turn a transport fault into the best reply still possible.
    pub fn recover(&self, fault: TransportFault, accept_encoding: Option<&str>) -> Reply {
        if fault.is_client_abort() {
            tracing::info!("[Dispatcher] Client aborted connection while processing JSON request.");
            return Reply::Empty;
        }
        tracing::warn!("[Dispatcher] Transport fault: {}", fault);
        self.respond(&Envelope::failure(fault.caller_message()), accept_encoding)
    }

    /// Encode an envelope. Encoding failures are logged and answered with a
    /// bare 500; they never propagate.
    pub fn respond(&self, envelope: &Envelope, accept_encoding: Option<&str>) -> Reply {
        match self.encoder.encode(self.codec.as_ref(), envelope, accept_encoding) {
            Ok(encoded) => Reply::Encoded(encoded),
            Err(e) => {
                tracing::warn!("[Encoder] An unexpected error occurred encoding JSON response: {}", e);
                Reply::Raw(RawResponse::new(500))
            }
        }
    }

    fn read_payload(&self, method: &str, payload: Payload) -> Result<String, PayloadError> {
        match payload {
            Payload::Query(json) => {
                let json = json
                    .filter(|j| !j.trim().is_empty())
                    .ok_or(PayloadError::Caller(DispatchError::MissingJsonParameter))?;
                tracing::debug!("[Dispatcher] {} RESTful JSON", method);
                Ok(json)
            }
            Payload::Body {
                content_length,
                bytes,
            } => {
                let declared = match content_length {
                    Some(len) if len > 0 => len,
                    _ => return Err(PayloadError::Caller(DispatchError::BadContentLength)),
                };
                let mut bytes = match bytes {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let fault = TransportFault::Io(e);
                        if fault.is_client_abort() {
                            return Err(PayloadError::Fault(fault));
                        }
                        tracing::debug!("[Dispatcher] Failed to read POST body: {}", fault);
                        return Err(PayloadError::Caller(DispatchError::UnreadableBody));
                    }
                };
                let declared = usize::try_from(declared)
                    .map_err(|_| PayloadError::Caller(DispatchError::UnreadableBody))?;
                if bytes.len() < declared {
                    return Err(PayloadError::Caller(DispatchError::UnreadableBody));
                }
                bytes.truncate(declared);
                let json = String::from_utf8(bytes)
                    .map_err(|_| PayloadError::Caller(DispatchError::UnreadableBody))?;
                tracing::debug!("[Dispatcher] {} RESTful JSON", method);
                Ok(json)
            }
        }
    }

    async fn process(&self, head: Arc<RequestHead>, json: &str) -> Result<Outcome, TransportFault> {
        let Some(caps) = command_path().and_then(|re| re.captures(&head.path)) else {
            let err = DispatchError::InvalidPath {
                json: json.to_string(),
            };
            tracing::warn!("[Dispatcher] {}", err);
            return Ok(err.into());
        };
        let target_name = caps.get(1).map_or("", |m| m.as_str());
        let operation = caps.get(2).map_or("", |m| m.as_str());

        let args = match self.codec.decode(json) {
            Ok(Value::Null) => Vec::new(),
            Ok(Value::Array(args)) => args,
            Ok(_) => {
                tracing::warn!(
                    "[Dispatcher] Non-array arguments on call '{}.{}'",
                    target_name,
                    operation
                );
                return Ok(DispatchError::ArgumentsNotArray.into());
            }
            Err(e) => {
                let err = DispatchError::MalformedArguments {
                    target: target_name.to_string(),
                    operation: operation.to_string(),
                };
                tracing::error!("[Dispatcher] {}: {}", err, e);
                return Ok(err.into());
            }
        };
        tracing::debug!("[Dispatcher]   {}.{}({})", target_name, operation, self.preview(json));

        let target = match self.registry.resolve(target_name) {
            Ok(target) => target,
            Err(RegistryError::NotFound(_)) => {
                tracing::warn!("[Dispatcher] Invalid JSON target: {}", target_name);
                return Ok(DispatchError::InvalidTarget {
                    target: target_name.to_string(),
                }
                .into());
            }
            Err(RegistryError::AccessDenied(reason)) => {
                return Err(TransportFault::AccessDenied(reason));
            }
        };
        if !self.registry.is_dispatch_eligible(target.target_type()) {
            tracing::warn!("[Dispatcher] Target '{}' is not a controller", target_name);
            return Ok(DispatchError::NotDispatchable {
                target: target_name.to_string(),
            }
            .into());
        }

        let start = Instant::now();
        let resolved =
            match self
                .resolver
                .resolve(target_name, target.target_type(), operation, args.len())
            {
                Ok(resolved) => resolved,
                Err(err) => return Ok(err.into()),
            };

        let slot = ResponseSlot::new();
        let context = RequestContext::new(Arc::clone(&head), slot.clone());
        let invocation = self
            .invoker
            .invoke(&resolved, &target, Arguments::new(args), context)
            .await?;

        let elapsed = start.elapsed();
        if elapsed > self.config.slow_call_threshold() {
            tracing::info!(
                "[Dispatcher] Slow API: {} took {} ms",
                self.preview(json),
                elapsed.as_millis()
            );
        }

        if resolved.is_self_handling() {
            return Ok(match slot.take() {
                Some(raw) => Outcome::SelfHandled(Some(raw)),
                None if !invocation.succeeded => Outcome::Envelope(Envelope {
                    data: invocation.result,
                    status: false,
                }),
                None => Outcome::SelfHandled(None),
            });
        }

        Ok(Outcome::Envelope(Envelope {
            data: invocation.result,
            status: invocation.succeeded,
        }))
    }

    fn preview<'a>(&self, json: &'a str) -> &'a str {
        truncate_chars(json, self.config.log_preview_chars)
    }
}

enum PayloadError {
    Caller(DispatchError),
    Fault(TransportFault),
}

/// Clip `s` for logging: strings longer than `limit` chars keep `limit - 1`.
pub fn truncate_chars(s: &str, limit: usize) -> &str {
    if s.chars().count() <= limit {
        return s;
    }
    match s.char_indices().nth(limit.saturating_sub(1)) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Reply {
    fn into_response(self) -> axum::response::Response {
        use axum::http::{HeaderName, HeaderValue, StatusCode};
        use axum::response::IntoResponse;

        fn with_headers<'a>(
            mut response: axum::response::Response,
            headers: impl IntoIterator<Item = (&'a str, &'a str)>,
        ) -> axum::response::Response {
            for (name, value) in headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().append(name, value);
                    }
                    _ => tracing::warn!("[Dispatcher] Dropping invalid response header '{}'", name),
                }
            }
            response
        }

        match self {
            Reply::Encoded(encoded) => {
                let headers = encoded.headers();
                let response = axum::response::Response::new(axum::body::Body::from(encoded.body));
                with_headers(response, headers.iter().map(|(k, v)| (*k, v.as_str())))
            }
            Reply::Raw(raw) => {
                let mut response = axum::response::Response::new(axum::body::Body::from(raw.body));
                *response.status_mut() =
                    StatusCode::from_u16(raw.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                with_headers(
                    response,
                    raw.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                )
            }
            Reply::Empty => StatusCode::OK.into_response(),
        }
    }
}
