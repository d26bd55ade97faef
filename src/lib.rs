//! chess-mcp: MCP server exposing chess position tools over stdio
//!
//! A client (typically an AI assistant host) launches the binary as a
//! subprocess and talks JSON-RPC 2.0 over its stdin/stdout. Every byte on
//! stdout is a protocol message; diagnostics go to stderr.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`logging`]: Severity-tagged stderr logging
//! - [`mcp`]: MCP protocol implementation
//! - [`tools`]: Tool service seam and the built-in chess tools

pub mod config;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod tools;
