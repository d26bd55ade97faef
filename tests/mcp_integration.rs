//! Integration tests for MCP protocol handling.
//!
//! These tests verify the JSON-RPC 2.0 message codec: request decoding,
//! notification detection, rejection of malformed input and the shape of
//! encoded replies.

use chess_mcp::mcp::protocol::{
    decode, encode, ErrorCode, JsonRpcError, JsonRpcResponse, Outgoing, RequestId,
};
use serde_json::{json, Value};

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let req = decode(json).unwrap();
    assert_eq!(req.method, "initialize");
    assert_eq!(req.id, Some(RequestId::from(1)));
    assert!(!req.is_notification());
    assert_eq!(req.params["clientInfo"]["name"], "test-client");
}

#[test]
fn test_parse_tools_call_request() {
    let json = r#"{"jsonrpc":"2.0","id":"call-7","method":"tools/call","params":{"name":"validate_fen","arguments":{"fen":"8/8/8/8/8/8/8/8 w - - 0 1"}}}"#;

    let req = decode(json).unwrap();
    assert_eq!(req.method, "tools/call");
    assert_eq!(req.id, Some(RequestId::from("call-7")));
    assert_eq!(req.params["name"], "validate_fen");
}

#[test]
fn test_parse_request_without_params() {
    let req = decode(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).unwrap();
    assert!(req.params.is_empty());
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let req = decode(json).unwrap();
    assert_eq!(req.method, "notifications/initialized");
    assert!(req.is_notification());
}

#[test]
fn test_null_id_is_a_notification() {
    let req = decode(r#"{"jsonrpc":"2.0","id":null,"method":"tools/list"}"#).unwrap();
    assert!(req.is_notification());
}

#[test]
fn test_parse_invalid_json() {
    assert!(decode("not valid json").is_err());
}

#[test]
fn test_parse_non_object() {
    assert!(decode("[1,2,3]").is_err());
    assert!(decode("42").is_err());
}

#[test]
fn test_parse_missing_jsonrpc_version_is_tolerated() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    let req = decode(json).unwrap();
    assert_eq!(req.method, "test");
}

#[test]
fn test_parse_wrong_jsonrpc_version() {
    assert!(decode(r#"{"jsonrpc":"1.0","id":1,"method":"test"}"#).is_err());
}

#[test]
fn test_parse_missing_method() {
    assert!(decode(r#"{"jsonrpc":"2.0","id":1}"#).is_err());
}

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_encoded_reply_is_single_line() {
    let reply: Outgoing = JsonRpcResponse::success(
        RequestId::from(3),
        json!({"content": [{"type": "text", "text": "line one\nline two"}]}),
    )
    .into();

    let line = encode(&reply).unwrap();
    assert!(!line.contains('\n'));
    let value: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["result"]["content"][0]["text"], "line one\nline two");
}

#[test]
fn test_parse_error_reply_has_null_id() {
    let err = decode("{oops").unwrap_err();
    let line = encode(&JsonRpcError::parse_error(&err).into()).unwrap();
    let value: Value = serde_json::from_str(&line).unwrap();

    assert_eq!(value["jsonrpc"], "2.0");
    assert!(value["id"].is_null());
    assert_eq!(value["error"]["code"], ErrorCode::ParseError.code());
}

#[test]
fn test_string_id_is_echoed_verbatim() {
    let req = decode(r#"{"jsonrpc":"2.0","id":"abc-1","method":"nope"}"#).unwrap();
    let id = req.id.unwrap();
    let line = encode(&JsonRpcError::method_not_found(id, &req.method).into()).unwrap();
    let value: Value = serde_json::from_str(&line).unwrap();

    assert_eq!(value["id"], "abc-1");
    assert_eq!(value["error"]["code"], -32601);
}
