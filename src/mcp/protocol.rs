//! JSON-RPC 2.0 message types and the line codec for the MCP protocol.
//!
//! # Message Types
//!
//! - **Request**: a message with a non-null `id`; gets exactly one reply
//! - **Notification**: no `id` (or `id: null`); never gets a reply
//! - **Response** / **Error**: the reply to a request, never both
//!
//! Decoding is deliberately forgiving about what it accepts from a line
//! (unknown fields and a missing `jsonrpc` are tolerated) but strict about
//! the rest of the envelope: anything that is not a JSON object with a
//! `method`, or that names a `jsonrpc` version other than `"2.0"`, is a
//! [`ParseError`]. Encoding always yields a single compact line.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use thiserror::Error;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Default server name for capability negotiation.
pub const SERVER_NAME: &str = "chess-mcp";

/// JSON-RPC version string carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request ID.
///
/// Numbers are kept as the token the client wrote, so `1e2` or a
/// 20-digit integer is echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    /// Numeric request ID, as its raw JSON token.
    Number(String),
    /// String request ID.
    String(String),
}

impl RequestId {
    /// Classifies a raw JSON token. `null` yields `None`.
    fn from_raw(raw: &RawValue) -> Result<Option<Self>, ParseError> {
        let token = raw.get().trim();
        match token.as_bytes().first() {
            Some(b'n') if token == "null" => Ok(None),
            Some(b'"') => serde_json::from_str(token)
                .map(|s| Some(Self::String(s)))
                .map_err(|e| ParseError::new(e.to_string())),
            Some(b'-' | b'0'..=b'9') => Ok(Some(Self::Number(token.to_string()))),
            _ => Err(ParseError::new("id must be a number, string or null")),
        }
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(token) => RawValue::from_string(token.clone())
                .map_err(serde::ser::Error::custom)?
                .serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.to_string())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A decoded incoming message.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Request identifier; `None` for notifications.
    pub id: Option<RequestId>,
    /// The method to invoke.
    pub method: String,
    /// Named parameters, empty when the client sent none.
    pub params: Map<String, Value>,
}

impl Request {
    /// Returns `true` if no reply may be sent for this message.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A line that could not be decoded into a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error: {message}")]
pub struct ParseError {
    /// What was wrong with the line.
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Wire shape of an incoming message before validation.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Box<RawValue>>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

/// Decodes one line of input into a [`Request`].
///
/// # Errors
///
/// Returns a [`ParseError`] if the line is not a JSON object, names a
/// `jsonrpc` version other than `"2.0"`, lacks a non-empty `method`,
/// carries an id that is not a number, string or `null`, or has `params`
/// that are not an object.
pub fn decode(line: &str) -> Result<Request, ParseError> {
    let raw: &RawValue = serde_json::from_str(line).map_err(|e| ParseError::new(e.to_string()))?;
    let text = raw.get().trim_start();

    if !text.starts_with('{') {
        return Err(ParseError::new("message must be a JSON object"));
    }

    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| ParseError::new(e.to_string()))?;

    match envelope.jsonrpc.as_deref() {
        None | Some(JSONRPC_VERSION) => {}
        Some(_) => return Err(ParseError::new("jsonrpc field must be \"2.0\"")),
    }

    let method = match envelope.method {
        Some(m) if !m.is_empty() => m,
        Some(_) => return Err(ParseError::new("method field cannot be empty")),
        None => return Err(ParseError::new("missing method field")),
    };

    let id = match envelope.id {
        Some(raw) => RequestId::from_raw(&raw)?,
        None => None,
    };

    let params = match envelope.params {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ParseError::new("params must be an object")),
    };

    Ok(Request { id, method, params })
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,
}

impl JsonRpcErrorData {
    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to; serialised as `null`
    /// when it could not be determined.
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error,
        }
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error(error: &ParseError) -> Self {
        Self::new(
            None,
            JsonRpcErrorData::with_message(ErrorCode::ParseError, error.to_string()),
        )
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// An outgoing JSON-RPC 2.0 notification (server to client).
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Creates a new outgoing notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }

    /// The unsolicited readiness announcement sent at startup when enabled.
    #[must_use]
    pub fn ready() -> Self {
        Self::new("notifications/initialized", None)
    }
}

/// Anything the server writes to stdout.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outgoing {
    /// A successful reply.
    Response(JsonRpcResponse),
    /// An error reply.
    Error(JsonRpcError),
    /// A server-initiated notification.
    Notification(OutgoingNotification),
}

impl Outgoing {
    /// The id this message answers, if it is a reply.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Response(r) => Some(&r.id),
            Self::Error(e) => e.id.as_ref(),
            Self::Notification(_) => None,
        }
    }
}

impl From<JsonRpcResponse> for Outgoing {
    fn from(response: JsonRpcResponse) -> Self {
        Self::Response(response)
    }
}

impl From<JsonRpcError> for Outgoing {
    fn from(error: JsonRpcError) -> Self {
        Self::Error(error)
    }
}

impl From<OutgoingNotification> for Outgoing {
    fn from(notification: OutgoingNotification) -> Self {
        Self::Notification(notification)
    }
}

/// Encodes an outgoing message as a single compact line (no trailing newline).
///
/// # Errors
///
/// Returns an error if a result value cannot be serialised.
pub fn encode(message: &Outgoing) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_valid_request() {
        let json = r#"{"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}"#;
        let req = decode(json).unwrap();
        assert_eq!(req.id, Some(RequestId::from(1)));
        assert_eq!(req.method, "initialize");
        assert!(req.params.is_empty());
        assert!(!req.is_notification());
    }

    #[test]
    fn decode_notification_without_id() {
        let json = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;
        let req = decode(json).unwrap();
        assert!(req.is_notification());
        assert_eq!(req.method, "notifications/initialized");
    }

    #[test]
    fn decode_null_id_is_notification() {
        let json = r#"{"jsonrpc": "2.0", "id": null, "method": "tools/list"}"#;
        let req = decode(json).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn decode_string_id() {
        let json = r#"{"jsonrpc": "2.0", "id": "abc-123", "method": "test"}"#;
        let req = decode(json).unwrap();
        assert_eq!(req.id, Some(RequestId::from("abc-123")));
    }

    #[test]
    fn fractional_id_is_echoed_verbatim() {
        let req = decode(r#"{"jsonrpc":"2.0","id":2.5,"method":"ping"}"#).unwrap();
        let id = req.id.unwrap();
        let line = encode(&JsonRpcResponse::success(id, json!({})).into()).unwrap();
        assert_eq!(line, r#"{"jsonrpc":"2.0","id":2.5,"result":{}}"#);
    }

    #[test]
    fn large_and_exponent_ids_are_echoed_verbatim() {
        for (input, echoed) in [
            (r#"{"jsonrpc":"2.0","id":18446744073709551616,"method":"ping"}"#, "18446744073709551616"),
            (r#"{"jsonrpc":"2.0","id":1e2,"method":"ping"}"#, "1e2"),
            (r#"{"jsonrpc":"2.0","id": -0.10 ,"method":"ping"}"#, "-0.10"),
        ] {
            let id = decode(input).unwrap().id.unwrap();
            let line = encode(&JsonRpcResponse::success(id, json!({})).into()).unwrap();
            assert_eq!(line, format!(r#"{{"jsonrpc":"2.0","id":{echoed},"result":{{}}}}"#));
        }
    }

    #[test]
    fn decode_rejects_boolean_id() {
        let err = decode(r#"{"jsonrpc": "2.0", "id": true, "method": "x"}"#).unwrap_err();
        assert!(err.message.contains("id"));
    }

    #[test]
    fn decode_rejects_json_array_envelope() {
        let err = decode(r#"["2.0", 1, "ping"]"#).unwrap_err();
        assert!(err.message.contains("object"));
    }

    #[test]
    fn decode_invalid_json() {
        let err = decode("not valid json").unwrap_err();
        assert!(err.to_string().starts_with("Parse error:"));
    }

    #[test]
    fn decode_non_object() {
        assert!(decode("[1, 2, 3]").is_err());
        assert!(decode("42").is_err());
    }

    #[test]
    fn decode_tolerates_missing_jsonrpc() {
        let req = decode(r#"{"id": 1, "method": "test"}"#).unwrap();
        assert_eq!(req.id, Some(RequestId::from(1)));
        assert_eq!(req.method, "test");
    }

    #[test]
    fn decode_wrong_jsonrpc_version() {
        assert!(decode(r#"{"jsonrpc": "1.0", "id": 1, "method": "test"}"#).is_err());
    }

    #[test]
    fn decode_missing_method() {
        let err = decode(r#"{"jsonrpc": "2.0", "id": 1}"#).unwrap_err();
        assert!(err.message.contains("method"));
    }

    #[test]
    fn decode_rejects_object_id() {
        assert!(decode(r#"{"jsonrpc": "2.0", "id": {"a": 1}, "method": "x"}"#).is_err());
    }

    #[test]
    fn decode_rejects_array_params() {
        let err = decode(r#"{"jsonrpc": "2.0", "id": 1, "method": "x", "params": [1]}"#)
            .unwrap_err();
        assert!(err.message.contains("params"));
    }

    #[test]
    fn encode_success_response() {
        let line = encode(&JsonRpcResponse::success(1.into(), json!({"ok": true})).into()).unwrap();
        assert_eq!(line, r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#);
    }

    #[test]
    fn encode_method_not_found() {
        let error = JsonRpcError::method_not_found(1.into(), "unknown/method");
        let line = encode(&error.into()).unwrap();
        assert!(line.contains(r#""code":-32601"#));
        assert!(line.contains("Method not found: unknown/method"));
    }

    #[test]
    fn encode_parse_error_has_null_id() {
        let err = decode("{").unwrap_err();
        let line = encode(&JsonRpcError::parse_error(&err).into()).unwrap();
        assert!(line.starts_with(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700"#));
    }

    #[test]
    fn encode_ready_notification() {
        let line = encode(&OutgoingNotification::ready().into()).unwrap();
        assert_eq!(
            line,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#
        );
    }

    #[test]
    fn encode_never_contains_newlines() {
        let result = json!({"text": "line one\nline two", "nested": {"key": "value"}});
        let line = encode(&JsonRpcResponse::success("x".into(), result).into()).unwrap();
        assert!(!line.contains('\n'));
    }

    #[test]
    fn request_id_display() {
        assert_eq!(format!("{}", RequestId::from(42)), "42");
        assert_eq!(format!("{}", RequestId::from("abc")), "abc");
    }
}
