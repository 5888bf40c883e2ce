//! Envelope serialization and conditional gzip.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::Codec;
use crate::config::DEFAULT_COMPRESSION_THRESHOLD;
use crate::error::EncodeError;

pub const CONTENT_TYPE: &str = "application/json";
pub const CACHE_CONTROL: &str = "private, no-cache, no-store";

/// The `{data, status}` wire wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub data: Value,
    pub status: bool,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self { data, status: true }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            data: Value::String(message.into()),
            status: false,
        }
    }
}

/// A serialized envelope ready to be written to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedResponse {
    pub body: Vec<u8>,
    /// `Some("gzip")` when `body` is compressed.
    pub content_encoding: Option<&'static str>,
}

impl EncodedResponse {
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    pub fn is_compressed(&self) -> bool {
        self.content_encoding.is_some()
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("Content-Type", CONTENT_TYPE.to_string()),
            ("Cache-Control", CACHE_CONTROL.to_string()),
            ("Content-Length", self.body.len().to_string()),
        ];
        if let Some(encoding) = self.content_encoding {
            headers.push(("Content-Encoding", encoding.to_string()));
        }
        headers
    }
}

#[derive(Debug, Clone)]
pub struct ResponseEncoder {
    compression_threshold: usize,
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_THRESHOLD)
    }
}

impl ResponseEncoder {
    pub fn new(compression_threshold: usize) -> Self {
        Self {
            compression_threshold,
        }
    }

    pub fn compression_threshold(&self) -> usize {
        self.compression_threshold
    }

    /// Serialize `envelope` and gzip it when it is over the threshold, the
    /// client accepts gzip, and the result is strictly smaller.
    pub fn encode(
        &self,
        codec: &dyn Codec,
        envelope: &Envelope,
        accept_encoding: Option<&str>,
    ) -> Result<EncodedResponse, EncodeError> {
        let json = envelope_json(codec, envelope)?;
        tracing::debug!("[Encoder] return {}", json);
        let plain = json.into_bytes();

        if plain.len() <= self.compression_threshold || !accepts_gzip(accept_encoding) {
            return Ok(EncodedResponse {
                body: plain,
                content_encoding: None,
            });
        }

        let compressed = gzip(&plain)?;
        Ok(select_smaller(plain, compressed))
    }
}

/// Build `{"data":<value>,"status":<bool>}`.
///
/// The value is encoded inside a one-element array and then unwrapped, so a
/// top-level null is written the same way as a nested one.
pub fn envelope_json(codec: &dyn Codec, envelope: &Envelope) -> Result<String, EncodeError> {
    let wrapped = codec.encode(&Value::Array(vec![envelope.data.clone()]))?;
    let data = if wrapped == "[]" {
        "null"
    } else {
        wrapped
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| EncodeError::UnexpectedWrapper(wrapped.clone()))?
    };

    let mut out = String::with_capacity(data.len() + 24);
    out.push_str("{\"data\":");
    out.push_str(data);
    out.push_str(",\"status\":");
    out.push_str(if envelope.status { "true" } else { "false" });
    out.push('}');
    Ok(out)
}

/// True when the `Accept-Encoding` value lists gzip (or x-gzip) with a
/// non-zero quality.
pub fn accepts_gzip(accept_encoding: Option<&str>) -> bool {
    let Some(header) = accept_encoding else {
        return false;
    };
    header.split(',').any(|entry| {
        let mut parts = entry.split(';');
        let coding = parts.next().unwrap_or("").trim();
        if !(coding.eq_ignore_ascii_case("gzip") || coding.eq_ignore_ascii_case("x-gzip")) {
            return false;
        }
        !parts.any(|p| {
            p.trim()
                .strip_prefix("q=")
                .and_then(|q| q.trim().parse::<f32>().ok())
                .is_some_and(|q| q <= 0.0)
        })
    })
}

fn gzip(plain: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(plain.len() / 2), Compression::default());
    encoder.write_all(plain)?;
    Ok(encoder.finish()?)
}

/// Keep the compressed body only if it is strictly smaller.
fn select_smaller(plain: Vec<u8>, compressed: Vec<u8>) -> EncodedResponse {
    if compressed.len() < plain.len() {
        EncodedResponse {
            body: compressed,
            content_encoding: Some("gzip"),
        }
    } else {
        EncodedResponse {
            body: plain,
            content_encoding: None,
        }
    }
}
