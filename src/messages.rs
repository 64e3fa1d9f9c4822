//! Wire Message Types
//!
//! This module defines the JSON-RPC 2.0 frame types used on the wire. A
//! single [`Frame`] shape covers everything a peer may send; outbound
//! traffic is split into [`Request`] and [`Response`] and carried through
//! the session queue as the tagged [`Outbound`] variant so the transport
//! writer can branch on what it is sending.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The JSON-RPC protocol version accepted and emitted
pub const JSONRPC_VERSION: &str = "2.0";

/// One inbound JSON-RPC message, before classification
///
/// `params`, `result`, and `id` treat JSON `null` and field absence as
/// equivalent, matching how the peer protocol reads them.
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema)]
pub struct Frame {
    /// JSON-RPC version, must equal "2.0"
    #[serde(default)]
    pub jsonrpc: String,
    /// Method name, present on requests and events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Raw parameters of a request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Raw result of a reply to a local call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error of a reply to a local call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    /// Correlation id; absent on events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl Frame {
    /// Build an error response for this frame, echoing its id
    pub fn error_response(&self, code: i32, message: impl Into<String>) -> Response {
        Response::error(ErrorObject::new(code, message), self.id.clone().unwrap_or(Value::Null))
    }
}

/// Error information for failed requests
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct ErrorObject {
    /// Error code (e.g. -32600 for an invalid request)
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Create an error object without data
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }

    /// Create an error object carrying structured data
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self { code, message: message.into(), data: Some(data) }
    }
}

/// An outbound request or event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct Request {
    /// JSON-RPC version, always "2.0"
    pub jsonrpc: String,
    /// Method name in `<service>.<method>` form
    pub method: String,
    /// Serialized parameters
    pub params: Value,
    /// Correlation id; omitted for events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl Request {
    /// Create a request; `id` of `None` makes it an event
    pub fn new(method: impl Into<String>, params: Value, id: Option<i64>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), method: method.into(), params, id }
    }
}

/// An outbound response to a remote request
///
/// `result` and `id` are always serialized, `null` when they carry nothing,
/// and `error` is omitted on success.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct Response {
    /// JSON-RPC version, always "2.0"
    pub jsonrpc: String,
    /// Result value; `null` on error responses
    #[serde(default)]
    pub result: Value,
    /// Error of a failed request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    /// Id echoed from the request; `null` when the sender supplied none
    #[serde(default)]
    pub id: Value,
}

impl Response {
    /// Create a success response
    pub fn result(id: Value, result: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), result, error: None, id }
    }

    /// Create an error response
    pub fn error(error: ErrorObject, id: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), result: Value::Null, error: Some(error), id }
    }
}

/// One frame on the session's outbound queue
///
/// The queue is polymorphic: local calls and events enqueue requests,
/// dispatched remote requests enqueue responses. Serialization is untagged;
/// the variant exists so the transport writer can tell them apart.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Outbound {
    /// A locally issued call or event
    Request(Request),
    /// A response to a remote request
    Response(Response),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_defaults_absent_fields() {
        let frame: Frame = serde_json::from_str(r#"{"jsonrpc":"2.0","method":"a.b"}"#).unwrap();
        assert_eq!(frame.jsonrpc, "2.0");
        assert_eq!(frame.method.as_deref(), Some("a.b"));
        assert!(frame.params.is_none());
        assert!(frame.result.is_none());
        assert!(frame.id.is_none());
    }

    #[test]
    fn frame_treats_null_params_as_absent() {
        let frame: Frame =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"a.b","params":null,"id":null}"#)
                .unwrap();
        assert!(frame.params.is_none());
        assert!(frame.id.is_none());
    }

    #[test]
    fn frame_missing_version_defaults_to_empty() {
        let frame: Frame = serde_json::from_str(r#"{"method":"a.b"}"#).unwrap();
        assert_eq!(frame.jsonrpc, "");
    }

    #[test]
    fn success_response_omits_error() {
        let resp = Response::result(json!(7), json!(42));
        let encoded = serde_json::to_value(&resp).unwrap();
        assert_eq!(encoded, json!({"jsonrpc": "2.0", "result": 42, "id": 7}));
    }

    #[test]
    fn error_response_serializes_null_result_and_id() {
        let resp = Response::error(ErrorObject::new(-32700, "Parse Error"), Value::Null);
        let encoded = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            encoded,
            json!({
                "jsonrpc": "2.0",
                "result": null,
                "error": {"code": -32700, "message": "Parse Error"},
                "id": null
            })
        );
    }

    #[test]
    fn event_request_omits_id() {
        let req = Request::new("someEvent", json!(["x"]), None);
        let encoded = serde_json::to_value(&req).unwrap();
        assert_eq!(encoded, json!({"jsonrpc": "2.0", "method": "someEvent", "params": ["x"]}));
    }

    #[test]
    fn error_data_round_trips() {
        let data = json!({"number": 19420720, "name": "Führer", "price": 2.66, "flag": true});
        let err = ErrorObject::with_data(101, "Secret data", data.clone());
        let decoded: ErrorObject =
            serde_json::from_str(&serde_json::to_string(&err).unwrap()).unwrap();
        assert_eq!(decoded.data, Some(data));
    }
}
