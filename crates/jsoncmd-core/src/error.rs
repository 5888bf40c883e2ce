//! Error types for the jsoncmd dispatch pipeline.
//!
//! Caller errors (`DispatchError`) become `status=false` envelopes whose `data`
//! is the `Display` text of the variant. Operation failures (`OperationError`)
//! are raised by target code and are also reported as `status=false`.
//! Mechanism and transport failures (`InvokeError`, `TransportFault`) sit
//! outside the normal envelope path and are recovered by the dispatcher.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::io;

/// A failure attributable to the request itself.
///
/// The `Display` text is sent verbatim as the envelope `data`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("error: HTTP-GET had empty or no 'json' parameter.")]
    MissingJsonParameter,

    #[error("error: Call to server had incorrect Content-Length specified.")]
    BadContentLength,

    #[error("error: Unable to read HTTP-POST JSON content.")]
    UnreadableBody,

    #[error("error: Invalid JSON request - /controller/method not specified: {json}")]
    InvalidPath { json: String },

    #[error("error: unable to parse JSON argument list on call '{target}.{operation}'")]
    MalformedArguments { target: String, operation: String },

    #[error("error: Arguments must be either null or a JSON array")]
    ArgumentsNotArray,

    #[error("error: Invalid target '{target}'.")]
    InvalidTarget { target: String },

    #[error("error: target '{target}' is not marked as a controller.")]
    NotDispatchable { target: String },

    #[error("error: Method not found: {key}")]
    MethodNotFound { key: String },

    #[error("error: Method '{operation}' is not allowed to be called via HTTP Request.")]
    MethodNotAllowed { operation: String },
}

/// An error raised by an operation body.
///
/// `kind` plays the role of the fault's type name in diagnostics; `message`
/// is the text of the deepest cause in the source chain.
#[derive(Debug, thiserror::Error)]
#[error("{kind} {message}")]
pub struct OperationError {
    kind: Cow<'static, str>,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl OperationError {
    /// A plain operation failure with the generic `error` kind.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::with_kind("error", message)
    }

    pub fn with_kind(kind: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an arbitrary error. The kind is the type name of `E` with its
    /// module path trimmed to one segment (`io::Error`); the message is taken
    /// from the deepest error in its source chain.
    pub fn from_error<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::with_source(short_type_name::<E>(), err)
    }

    fn with_source<E>(kind: impl Into<Cow<'static, str>>, err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let message = root_cause(&err).to_string();
        Self {
            kind: kind.into(),
            message,
            source: Some(Box::new(err)),
        }
    }

    /// An argument could not be converted to the type the operation expects.
    pub fn invalid_argument(index: usize, detail: impl std::fmt::Display) -> Self {
        Self::with_kind("InvalidArgument", format!("argument {index}: {detail}"))
    }

    pub(crate) fn panic(message: String) -> Self {
        Self::with_kind("panic", message)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for OperationError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source("serde_json::Error", err)
    }
}

/// The kind is the `io::ErrorKind` name, e.g. `NotFound`.
impl From<io::Error> for OperationError {
    fn from(err: io::Error) -> Self {
        Self::with_source(format!("{:?}", err.kind()), err)
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

/// The operation could not be invoked at all.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("target '{target}' is not an instance of {expected}")]
    TargetMismatch {
        target: String,
        expected: &'static str,
    },

    #[error("invocation of '{operation}' was cancelled")]
    Cancelled { operation: String },
}

/// A fault outside the envelope protocol: transport I/O, access control from
/// the hosting environment, or a broken invocation mechanism.
#[derive(Debug, thiserror::Error)]
pub enum TransportFault {
    #[error("client aborted connection")]
    ClientAborted,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invocation failed: {0}")]
    Invocation(#[from] InvokeError),
}

impl TransportFault {
    /// True when the peer went away and no response can be delivered.
    pub fn is_client_abort(&self) -> bool {
        match self {
            TransportFault::ClientAborted => true,
            TransportFault::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Best-effort caller-facing message for faults that can still be answered.
    pub fn caller_message(&self) -> String {
        match self {
            TransportFault::ClientAborted | TransportFault::Io(_) => {
                "error: Invalid JSON request made.".to_string()
            }
            TransportFault::AccessDenied(_) => {
                "error: Your session with our website appears to have ended.  Please log out and back in."
                    .to_string()
            }
            TransportFault::Invocation(e) => format!(
                "error: Communications issue between your computer and our website ({} {})",
                invoke_kind(e),
                root_cause(e)
            ),
        }
    }
}

fn invoke_kind(err: &InvokeError) -> &'static str {
    match err {
        InvokeError::TargetMismatch { .. } => "TargetMismatch",
        InvokeError::Cancelled { .. } => "Cancelled",
    }
}

/// Failure to look up a target by name.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("target not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),
}

/// Invalid target type registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("duplicate operation {type_name}.{operation}/{arity}")]
    DuplicateOperation {
        type_name: String,
        operation: String,
        arity: usize,
    },

    #[error("operation name must not be empty on {0}")]
    EmptyOperationName(String),

    #[error("target name must not be empty")]
    EmptyTargetName,

    #[error("instance registered as '{target}' is not a {expected}")]
    InstanceTypeMismatch { target: String, expected: String },
}

/// JSON text could not be decoded or encoded.
#[derive(Debug, thiserror::Error)]
#[error("codec error: {0}")]
pub struct CodecError(#[from] pub serde_json::Error);

/// The response envelope could not be built.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("unexpected wrapped encoding: {0}")]
    UnexpectedWrapper(String),

    #[error("compression failed: {0}")]
    Compression(#[from] io::Error),
}

/// Walk an error's source chain down to the deepest cause.
pub fn root_cause<'a>(err: &'a (dyn StdError + 'static)) -> &'a (dyn StdError + 'static) {
    let mut current = err;
    while let Some(next) = current.source() {
        current = next;
    }
    current
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    // Generic parameters contain `::` too; only trim the leading path.
    let head = full.split('<').next().unwrap_or(full);
    let start = head
        .rmatch_indices("::")
        .nth(1)
        .map_or(0, |(idx, _)| idx + 2);
    &full[start..]
}
