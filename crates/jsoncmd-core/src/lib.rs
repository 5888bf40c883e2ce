//! jsoncmd core: JSON-over-HTTP command dispatch, independent of any web
//! framework.
//!
//! A request names a target and an operation (`/<target>/<operation>`) and
//! carries a JSON array of positional arguments. The [`Dispatcher`] resolves
//! the target through a [`TargetRegistry`], finds the operation by name and
//! arity, runs it, and answers with `{"data": ..., "status": true|false}`.
//!
//! The crate can be driven from:
//!
//! - HTTP servers (via `jsoncmd-server`)
//! - CLI tools (in-process calls)
//! - Tests, with hand-built [`TransportRequest`]s
//!
//! # Feature Flags
//!
//! - `axum`: Enables `IntoResponse` on [`Reply`] for use in axum handlers.

pub mod codec;
pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod invoker;
pub mod registry;
pub mod resolver;
pub mod router;

// Convenience re-exports
pub use codec::{Codec, SerdeJsonCodec};
pub use config::DispatchConfig;
pub use context::{RawResponse, RequestContext, RequestHead, RequestMethod, ResponseSlot};
pub use encoder::{EncodedResponse, Envelope, ResponseEncoder};
pub use error::{
    CodecError, DispatchError, EncodeError, InvokeError, OperationError, RegistrationError,
    RegistryError, TransportFault,
};
pub use invoker::{Invocation, Invoker};
pub use registry::{
    Arguments, OperationDescription, OperationPolicy, StaticRegistry, Target, TargetDescription,
    TargetRegistry, TargetType,
};
pub use resolver::{OperationResolver, ResolvedOperation};
pub use router::{Dispatcher, Payload, Reply, TransportRequest};
