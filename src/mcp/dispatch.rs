//! Method dispatch.
//!
//! Every decoded [`Request`] is routed through a static table of
//! [`Method`] variants. Handshake and ping are answered on the spot; tool
//! listing and invocation become [`PendingCall`]s that the server runs as
//! separate tasks so several can be in flight at once.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::task::JoinError;

use crate::mcp::lifecycle::{Lifecycle, SessionState};
use crate::mcp::protocol::{
    JsonRpcError, JsonRpcResponse, Outgoing, Request, RequestId, MCP_PROTOCOL_VERSION,
};
use crate::tools::ToolService;

/// Known methods, each with its expected parameter shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// `initialize`: params are [`InitializeParams`], all optional.
    Initialize,
    /// `initialized` / `notifications/initialized`: no params.
    Initialized,
    /// `ping`: no params.
    Ping,
    /// `tools/list`: no params.
    ToolsList,
    /// `tools/call`: params are [`ToolCallParams`].
    ToolsCall,
    /// Anything else.
    Unknown(String),
}

impl Method {
    /// Looks a method name up in the table.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "initialize" => Self::Initialize,
            "initialized" | "notifications/initialized" => Self::Initialized,
            "ping" => Self::Ping,
            "tools/list" => Self::ToolsList,
            "tools/call" => Self::ToolsCall,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session. The tool set
    /// is fixed for a run, so this is always `false`.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
///
/// Everything is optional: `initialize` never fails on its params.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool; absent and `null` both mean `{}`.
    #[serde(default)]
    pub arguments: Option<Map<String, Value>>,
}

/// What the server should do with a request.
pub enum Dispatch {
    /// Write this reply now.
    Reply(Outgoing),
    /// Run this call as a task and write its reply when it completes.
    Deferred(PendingCall),
    /// Nothing to send.
    Silent,
}

/// Work handed to the tool service.
#[derive(Debug)]
enum Work {
    List,
    Call {
        name: String,
        arguments: Map<String, Value>,
    },
}

/// A tool-service request that has not run yet.
pub struct PendingCall {
    id: RequestId,
    work: Work,
    service: Arc<dyn ToolService>,
}

impl PendingCall {
    /// The id the eventual reply carries.
    #[must_use]
    pub const fn id(&self) -> &RequestId {
        &self.id
    }

    /// Runs the call to completion and converts every failure into an
    /// error reply for this request only.
    ///
    /// The service future runs in its own task so a panicking tool is
    /// reported as an internal error instead of taking the session down.
    pub async fn run(self) -> Outgoing {
        let Self { id, work, service } = self;

        match work {
            Work::List => {
                let listed = tokio::spawn(async move { service.list_tools().await }).await;
                match listed {
                    Ok(Ok(tools)) => JsonRpcResponse::success(id, json!({ "tools": tools })).into(),
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "Tool listing failed");
                        JsonRpcError::internal_error(id, e.to_string()).into()
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Tool listing task failed");
                        JsonRpcError::internal_error(id, "Internal error: tool listing failed")
                            .into()
                    }
                }
            }
            Work::Call { name, arguments } => {
                let tool = name.clone();
                let called =
                    tokio::spawn(async move { service.call_tool(&tool, arguments).await }).await;
                match called {
                    Ok(Ok(result)) => match serde_json::to_value(&result) {
                        Ok(value) => JsonRpcResponse::success(id, value).into(),
                        Err(e) => {
                            tracing::error!(error = %e, tool = %name, "Failed to serialise tool call result");
                            JsonRpcError::internal_error(
                                id,
                                "Internal error: failed to serialise result",
                            )
                            .into()
                        }
                    },
                    Ok(Err(e)) => {
                        tracing::warn!(tool = %name, error = %e, "Tool call failed");
                        JsonRpcError::internal_error(id, e.to_string()).into()
                    }
                    Err(e) => {
                        tracing::error!(tool = %name, error = %e, "Tool task failed");
                        JsonRpcError::internal_error(id, task_failure(&name, &e)).into()
                    }
                }
            }
        }
    }
}

/// Error message for a tool task that ended without a result.
fn task_failure(tool: &str, error: &JoinError) -> String {
    if error.is_panic() {
        format!("Internal error: tool '{tool}' panicked")
    } else {
        format!("Internal error: tool '{tool}' was cancelled")
    }
}

/// Routes requests to handlers.
pub struct Dispatcher {
    service: Arc<dyn ToolService>,
    lifecycle: Arc<Lifecycle>,
    server_info: ServerInfo,
}

impl Dispatcher {
    /// Creates a dispatcher reporting `server_name` in the handshake.
    #[must_use]
    pub fn new(
        service: Arc<dyn ToolService>,
        lifecycle: Arc<Lifecycle>,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            service,
            lifecycle,
            server_info: ServerInfo {
                name: server_name.into(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Decides how to answer one request.
    #[must_use]
    pub fn dispatch(&self, request: Request) -> Dispatch {
        let method = Method::from_name(&request.method);

        if method == Method::Initialized {
            if self.lifecycle.mark_ready() {
                tracing::debug!("Client reported handshake complete");
            }
            return Dispatch::Silent;
        }

        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "Ignoring notification");
            return Dispatch::Silent;
        };

        tracing::debug!(method = %request.method, %id, "Received request");

        match method {
            Method::Initialize => Dispatch::Reply(self.handle_initialize(id, request.params)),
            Method::Ping => Dispatch::Reply(JsonRpcResponse::success(id, json!({})).into()),
            Method::ToolsList => {
                self.warn_before_handshake(&request.method);
                Dispatch::Deferred(PendingCall {
                    id,
                    work: Work::List,
                    service: Arc::clone(&self.service),
                })
            }
            Method::ToolsCall => {
                self.warn_before_handshake(&request.method);
                match serde_json::from_value::<ToolCallParams>(Value::Object(request.params)) {
                    Ok(params) => {
                        tracing::info!(tool = %params.name, %id, "Calling tool");
                        Dispatch::Deferred(PendingCall {
                            id,
                            work: Work::Call {
                                name: params.name,
                                arguments: params.arguments.unwrap_or_default(),
                            },
                            service: Arc::clone(&self.service),
                        })
                    }
                    Err(e) => Dispatch::Reply(
                        JsonRpcError::invalid_params(id, format!("Invalid tool call params: {e}"))
                            .into(),
                    ),
                }
            }
            Method::Unknown(name) => {
                tracing::debug!(method = %name, "Unknown method");
                Dispatch::Reply(JsonRpcError::method_not_found(id, &name).into())
            }
            Method::Initialized => Dispatch::Silent,
        }
    }

    /// Handles the initialize request. Never fails.
    fn handle_initialize(&self, id: RequestId, params: Map<String, Value>) -> Outgoing {
        let params: InitializeParams =
            serde_json::from_value(Value::Object(params)).unwrap_or_default();

        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                requested_version = params.protocol_version.as_deref().unwrap_or("unspecified"),
                "Client connected"
            );
        }

        if self.lifecycle.state() != SessionState::AwaitingHandshake {
            tracing::warn!("Repeated initialize request, answering again");
        }
        // Ready without waiting for `initialized`.
        self.lifecycle.mark_ready();

        let capabilities = ServerCapabilities {
            tools: ToolCapabilities::default(),
        };
        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": capabilities,
            "serverInfo": self.server_info,
        });

        JsonRpcResponse::success(id, result).into()
    }

    fn warn_before_handshake(&self, method: &str) {
        if self.lifecycle.state() == SessionState::AwaitingHandshake {
            tracing::warn!(%method, "Request before initialize, serving anyway");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::ToolError;
    use crate::mcp::protocol::decode;
    use crate::tools::{ToolCallResult, ToolDescriptor, ToolRegistry};

    struct Panicking;

    #[async_trait]
    impl ToolService for Panicking {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
            Err(ToolError::Execution {
                tool: "registry".to_string(),
                message: "offline".to_string(),
            })
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: Map<String, Value>,
        ) -> Result<ToolCallResult, ToolError> {
            panic!("engine crashed");
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(ToolRegistry::with_chess_tools()),
            Arc::new(Lifecycle::new()),
            "chess-mcp",
        )
    }

    fn reply(dispatch: Dispatch) -> Value {
        match dispatch {
            Dispatch::Reply(out) => serde_json::to_value(out).unwrap(),
            Dispatch::Deferred(_) => panic!("expected an immediate reply, got a deferred call"),
            Dispatch::Silent => panic!("expected an immediate reply, got nothing"),
        }
    }

    async fn deferred(dispatch: Dispatch) -> Value {
        match dispatch {
            Dispatch::Deferred(call) => serde_json::to_value(call.run().await).unwrap(),
            Dispatch::Reply(_) | Dispatch::Silent => panic!("expected a deferred call"),
        }
    }

    fn request(line: &str) -> Request {
        decode(line).unwrap()
    }

    #[test]
    fn method_table() {
        assert_eq!(Method::from_name("initialize"), Method::Initialize);
        assert_eq!(Method::from_name("initialized"), Method::Initialized);
        assert_eq!(
            Method::from_name("notifications/initialized"),
            Method::Initialized
        );
        assert_eq!(Method::from_name("tools/call"), Method::ToolsCall);
        assert_eq!(
            Method::from_name("resources/list"),
            Method::Unknown("resources/list".to_string())
        );
    }

    #[test]
    fn initialize_returns_server_info() {
        let d = dispatcher();
        let out = reply(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )));
        assert_eq!(out["id"], json!(1));
        assert_eq!(out["result"]["protocolVersion"], json!("2024-11-05"));
        assert_eq!(out["result"]["serverInfo"]["name"], json!("chess-mcp"));
        assert_eq!(
            out["result"]["capabilities"]["tools"]["listChanged"],
            json!(false)
        );
        assert!(out.get("error").is_none());
    }

    #[test]
    fn initialize_ignores_malformed_params() {
        let d = dispatcher();
        let out = reply(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":"a","method":"initialize","params":{"clientInfo":5}}"#,
        )));
        assert_eq!(out["id"], json!("a"));
        assert!(out["result"].is_object());
    }

    #[test]
    fn repeated_initialize_still_answers() {
        let d = dispatcher();
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        reply(d.dispatch(request(line)));
        let again = reply(d.dispatch(request(line)));
        assert!(again["result"]["serverInfo"].is_object());
    }

    #[test]
    fn initialized_never_replies() {
        let d = dispatcher();
        assert!(matches!(
            d.dispatch(request(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)),
            Dispatch::Silent
        ));
        assert!(matches!(
            d.dispatch(request(r#"{"jsonrpc":"2.0","id":9,"method":"initialized"}"#)),
            Dispatch::Silent
        ));
        assert_eq!(d.lifecycle.state(), SessionState::Ready);
    }

    #[test]
    fn notifications_get_no_reply() {
        let d = dispatcher();
        for line in [
            r#"{"jsonrpc":"2.0","method":"tools/list"}"#,
            r#"{"jsonrpc":"2.0","id":null,"method":"bogus"}"#,
        ] {
            assert!(matches!(d.dispatch(request(line)), Dispatch::Silent));
        }
    }

    #[test]
    fn unknown_method_is_32601() {
        let d = dispatcher();
        let out = reply(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#,
        )));
        assert_eq!(out["id"], json!(3));
        assert_eq!(out["error"]["code"], json!(-32601));
        assert_eq!(
            out["error"]["message"],
            json!("Method not found: resources/list")
        );
    }

    #[test]
    fn ping_returns_empty_object() {
        let d = dispatcher();
        let out = reply(d.dispatch(request(r#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#)));
        assert_eq!(out["result"], json!({}));
    }

    #[test]
    fn tools_call_without_name_is_invalid_params() {
        let d = dispatcher();
        let out = reply(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"arguments":{}}}"#,
        )));
        assert_eq!(out["error"]["code"], json!(-32602));
    }

    #[tokio::test]
    async fn tools_list_before_handshake_is_served() {
        let d = dispatcher();
        let out = deferred(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/list"}"#,
        )))
        .await;
        assert_eq!(out["id"], json!(6));
        let tools = out["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], json!("validate_fen"));
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn tools_call_success() {
        let d = dispatcher();
        let out = deferred(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"validate_fen","arguments":{"fen":"rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"}}}"#,
        )))
        .await;
        assert_eq!(out["id"], json!(2));
        assert_eq!(out["result"]["content"][0]["type"], json!("text"));
    }

    #[tokio::test]
    async fn tools_call_unknown_tool_is_32603() {
        let d = dispatcher();
        let out = deferred(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"best_move"}}"#,
        )))
        .await;
        assert_eq!(out["id"], json!(7));
        assert_eq!(out["error"]["code"], json!(-32603));
        assert_eq!(out["error"]["message"], json!("Unknown tool: best_move"));
    }

    #[tokio::test]
    async fn panicking_tool_becomes_error_reply() {
        let d = Dispatcher::new(Arc::new(Panicking), Arc::new(Lifecycle::new()), "t");
        let out = deferred(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"x"}}"#,
        )))
        .await;
        assert_eq!(out["id"], json!(8));
        assert_eq!(out["error"]["code"], json!(-32603));
        assert!(out["error"]["message"]
            .as_str()
            .unwrap()
            .contains("panicked"));
    }

    #[tokio::test]
    async fn null_arguments_reach_the_service_as_empty() {
        let d = dispatcher();
        let out = deferred(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"best","arguments":null}}"#,
        )))
        .await;
        assert_eq!(out["error"]["code"], json!(-32603));
        assert_eq!(out["error"]["message"], json!("Unknown tool: best"));

        let out = deferred(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"validate_fen","arguments":null}}"#,
        )))
        .await;
        assert_eq!(out["error"]["code"], json!(-32603));
        assert!(out["error"]["message"]
            .as_str()
            .unwrap()
            .contains("missing required string argument 'fen'"));
    }

    #[test]
    fn non_object_arguments_are_invalid_params() {
        let d = dispatcher();
        let out = reply(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"validate_fen","arguments":[1]}}"#,
        )));
        assert_eq!(out["error"]["code"], json!(-32602));
    }

    #[tokio::test]
    async fn task_failure_distinguishes_panic_from_cancellation() {
        let panicked = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        assert_eq!(
            task_failure("engine", &panicked),
            "Internal error: tool 'engine' panicked"
        );

        let sleeper = tokio::spawn(tokio::time::sleep(std::time::Duration::from_secs(60)));
        sleeper.abort();
        let cancelled = sleeper.await.unwrap_err();
        assert_eq!(
            task_failure("engine", &cancelled),
            "Internal error: tool 'engine' was cancelled"
        );
    }

    #[tokio::test]
    async fn failing_listing_is_32603() {
        let d = Dispatcher::new(Arc::new(Panicking), Arc::new(Lifecycle::new()), "t");
        let out = deferred(d.dispatch(request(
            r#"{"jsonrpc":"2.0","id":"l","method":"tools/list"}"#,
        )))
        .await;
        assert_eq!(out["error"]["code"], json!(-32603));
        assert!(out["error"]["message"].as_str().unwrap().contains("offline"));
    }
}
