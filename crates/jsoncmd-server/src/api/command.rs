//! JSON command endpoint powered by `jsoncmd_core::Dispatcher`.
//!
//! Exposes `GET /<target>/<operation>[...]?json=[...]` and
//! `POST /<target>/<operation>[...]` (JSON array body). The router is mounted
//! under the configured prefix, so handlers see the path below it.

use std::error::Error as StdError;
use std::io;

use axum::{
    body::Body,
    extract::{RawQuery, State},
    http::{header, HeaderMap, Uri},
    routing::get,
    Router,
};
use jsoncmd_core::{Reply, RequestHead, RequestMethod, TransportRequest};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/{*command}", get(command_get).post(command_post))
}

/// GET: the argument list is the `json` query parameter.
async fn command_get(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Reply {
    let json = query.as_deref().and_then(json_param);
    let head = request_head(RequestMethod::Get, &uri, &headers);
    state
        .dispatcher
        .handle(TransportRequest::get(head, json))
        .await
}

/// POST: the argument list is the whole body.
async fn command_post(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Reply {
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let limit = state.dispatcher.config().max_body_bytes;
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map(|b| b.to_vec())
        .map_err(body_error);

    let head = request_head(RequestMethod::Post, &uri, &headers);
    state
        .dispatcher
        .handle(TransportRequest::post(head, content_length, bytes))
        .await
}

fn request_head(method: RequestMethod, uri: &Uri, headers: &HeaderMap) -> RequestHead {
    let mut head = RequestHead::new(method, decode_path(uri.path()));
    head.query = uri.query().map(str::to_owned);
    head.headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect();
    head
}

/// Extract and decode the first `json` parameter of a query string.
/// `+` decodes to a space, as in HTML form encoding.
pub fn json_param(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if form_decode(key).as_deref() != Some("json") {
            return None;
        }
        form_decode(value)
    })
}

/// Percent-decode a request path so target and operation names are matched
/// on their decoded text. `+` is kept literal in paths. A path that does not
/// decode to UTF-8 is passed through unchanged.
fn decode_path(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_owned())
}

fn form_decode(raw: &str) -> Option<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .ok()
        .map(|s| s.into_owned())
}

/// Map a body read failure onto `io::Error`, keeping the kind of an
/// underlying I/O error so client aborts are still recognised.
fn body_error(err: axum::Error) -> io::Error {
    let mut source: Option<&(dyn StdError + 'static)> = Some(&err);
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return io::Error::new(io_err.kind(), err.to_string());
        }
        source = e.source();
    }
    io::Error::other(err.to_string())
}
