//! Error Types
//!
//! This module defines the error type for the crate, covering transport
//! failures, registration problems, and JSON-RPC protocol errors. Typed
//! wire errors travel as [`ErrorObject`] values so that code, message, and
//! data survive the trip from a handler to the peer.

use thiserror::Error;

use crate::messages::ErrorObject;

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    /// Parse error - invalid JSON was received
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request - the JSON sent is not a valid request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - the method does not exist / is not available
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - invalid method parameter(s)
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// The main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-related errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Service registration errors, never sent on the wire
    #[error("{0}")]
    Registration(String),

    /// A typed JSON-RPC error carrying code, message, and optional data
    #[error("{}", .0.message)]
    Rpc(ErrorObject),

    /// The session was torn down before a pending call was answered
    #[error("Call cancelled")]
    Cancelled,

    /// Other errors, flattened to INTERNAL_ERROR when they reach the wire
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Create a typed JSON-RPC error with the given code and message
    pub fn rpc(code: i32, message: impl Into<String>) -> Self {
        Error::Rpc(ErrorObject::new(code, message))
    }

    /// Create an INVALID_PARAMS error
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::rpc(error_codes::INVALID_PARAMS, message)
    }

    /// Create an untyped internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}

impl From<ErrorObject> for Error {
    fn from(err: ErrorObject) -> Self {
        Error::Rpc(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_constants() {
        assert_eq!(error_codes::PARSE_ERROR, -32700);
        assert_eq!(error_codes::INVALID_REQUEST, -32600);
        assert_eq!(error_codes::METHOD_NOT_FOUND, -32601);
        assert_eq!(error_codes::INVALID_PARAMS, -32602);
        assert_eq!(error_codes::INTERNAL_ERROR, -32603);
    }

    #[test]
    fn rpc_error_displays_its_message() {
        let err = Error::rpc(100, "Don't mention his name");
        assert_eq!(err.to_string(), "Don't mention his name");
    }

    #[test]
    fn internal_error_displays_raw_text() {
        let err = Error::internal("An artificial error");
        assert_eq!(err.to_string(), "An artificial error");
    }
}
