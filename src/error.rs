//! Error types for chess-mcp.
//!
//! Protocol-level decode failures live next to the codec in
//! [`crate::mcp::protocol::ParseError`]; everything here is either a
//! configuration problem or a failure reported by a tool service.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors reported by a tool service.
///
/// The display string is what the client sees in the JSON-RPC error
/// message, so it must stay human-readable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("Unknown tool: {name}")]
    UnknownTool {
        /// The requested tool name.
        name: String,
    },

    /// The arguments did not match the tool's input schema.
    #[error("Invalid arguments for '{tool}': {message}")]
    InvalidArguments {
        /// The tool being called.
        tool: String,
        /// What was wrong with the arguments.
        message: String,
    },

    /// The tool ran and failed.
    #[error("Tool '{tool}' failed: {message}")]
    Execution {
        /// The tool being called.
        tool: String,
        /// Failure description.
        message: String,
    },

    /// A tool with the same name was already registered.
    #[error("Tool already registered: {name}")]
    Duplicate {
        /// The clashing tool name.
        name: String,
    },
}
