//! Bidirectional JSON-RPC 2.0 service objects over WebSocket
//!
//! This crate exposes application-defined service objects over a
//! bidirectional WebSocket channel using JSON-RPC 2.0 framing. Each
//! connection gets its own [`Session`]: inbound requests are routed to the
//! methods of registered services, and the local side can issue calls
//! whose results are correlated back to the caller by id.
//!
//! Services implement [`ServiceObject`] and describe their methods as a
//! table of [`MethodDef`] descriptors; method discovery, naming, and
//! signature validation follow the wire protocol's conventions (prefix
//! stripping, opt-in name and method providers, 0-or-2 output arity with a
//! trailing error channel).

pub mod errors;
pub mod messages;
pub mod pending;
pub mod registry;
pub mod service;
pub mod session;
pub mod transport;

// Re-export commonly used items
pub use errors::{error_codes, Error};
pub use messages::{ErrorObject, Frame, Outbound, Request, Response, JSONRPC_VERSION};
pub use pending::CallSlot;
pub use registry::ServiceRegistry;
pub use service::{
    IntoServiceInstance, MethodDef, OutputKind, Param, Params, Service, ServiceMethod,
    ServiceObject, DEFAULT_METHOD_PREFIX,
};
pub use session::{Session, SessionOptions, DEFAULT_OUTBOUND_CAPACITY};
pub use transport::{Transport, WsServer, WsServerHandle, WsServerOptions, WsTransport};
