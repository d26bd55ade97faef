//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes a [`ToolService`](crate::tools::ToolService) to an
//! MCP client over stdio using newline-delimited JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────────────┐  │
//! │  │ LineFramer  │──▶│  Dispatcher │──▶│ ToolService tasks │  │
//! │  │   (stdin)   │   │  (methods)  │   │   (concurrent)    │  │
//! │  └─────────────┘   └─────────────┘   └───────────────────┘  │
//! │                           │                    │             │
//! │                           ▼                    ▼             │
//! │                  ┌─────────────────────────────────┐         │
//! │                  │     OutputGuard (stdout only)   │         │
//! │                  └─────────────────────────────────┘         │
//! │                                                              │
//! │  Lifecycle: handshake state, signals, graceful shutdown      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod dispatch;
pub mod lifecycle;
pub mod protocol;
pub mod server;
pub mod transport;

pub use lifecycle::{Outcome, ShutdownReason, ShutdownSignal};
pub use protocol::{JsonRpcError, JsonRpcResponse, Request, RequestId, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::{LineFramer, OutputGuard};
