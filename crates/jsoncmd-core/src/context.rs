//! Per-request transport handles visible to running operations.
//!
//! The invoker runs every operation inside [`RequestContext::scope`], which
//! stores the context in a tokio task-local. Concurrent requests each see only
//! their own context, and the slot is empty again as soon as the operation
//! future finishes, fails or panics.
//!
//! Most operations never look at the context. Self-handling operations use it
//! to write the response themselves:
//!
//! ```ignore
//! let cx = RequestContext::current().ok_or("no request context")?;
//! cx.response().write(RawResponse::new(200).header("Content-Type", "text/csv").body(csv));
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

tokio::task_local! {
    static CURRENT: RequestContext;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    Get,
    Post,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
        }
    }
}

/// Transport-neutral view of the inbound request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: RequestMethod,
    /// Path below the mount prefix, e.g. `/Greeter/sayHello`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    pub fn new(method: RequestMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Case-insensitive header lookup; first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response produced directly by a self-handling operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Default for RawResponse {
    fn default() -> Self {
        Self::new(200)
    }
}

impl RawResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Slot for a self-handled response. The last write is kept.
#[derive(Debug, Clone, Default)]
pub struct ResponseSlot(Arc<Mutex<Option<RawResponse>>>);

impl ResponseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, response: RawResponse) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(response);
        }
    }

    pub fn is_written(&self) -> bool {
        self.0.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn take(&self) -> Option<RawResponse> {
        self.0.lock().ok().and_then(|mut s| s.take())
    }
}

/// The request and response handles of the call currently executing.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Arc<RequestHead>,
    response: ResponseSlot,
}

impl RequestContext {
    pub fn new(request: Arc<RequestHead>, response: ResponseSlot) -> Self {
        Self { request, response }
    }

    /// The context of the calling task, if it is running inside a dispatch.
    pub fn current() -> Option<RequestContext> {
        CURRENT.try_with(|cx| cx.clone()).ok()
    }

    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    pub fn response(&self) -> &ResponseSlot {
        &self.response
    }

    /// Run `fut` with this context installed; the context is removed when
    /// `fut` completes or is dropped.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }
}
