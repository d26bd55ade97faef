//! chess-mcp: MCP server exposing chess position tools over stdio
//!
//! Launched by an MCP client as a subprocess. stdout carries protocol
//! messages only; everything else goes to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};

use chess_mcp::config;
use chess_mcp::logging;
use chess_mcp::mcp::lifecycle::EXIT_OK;
use chess_mcp::mcp::server::McpServer;
use chess_mcp::tools::ToolRegistry;

/// How long the runtime may take to stop once the session is over. A read
/// blocked on stdin is left behind after this.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);

/// MCP server exposing chess position tools over stdio.
///
/// Reads newline-delimited JSON-RPC 2.0 requests on stdin and writes
/// replies on stdout.
#[derive(Parser, Debug)]
#[command(name = "chess-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Send a readiness notification before reading any input
    #[arg(long)]
    announce_ready: bool,
}

/// Entry point for the chess-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            let tag = logging::severity_tag(Level::ERROR);
            eprintln!("{tag} Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("{tag} Expected config at: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };
    cfg.server.announce_ready |= args.announce_ready;

    // Initialise logging
    logging::init(logging::resolve_level(
        args.verbose,
        args.quiet,
        &cfg.logging.level,
    ));
    logging::install_panic_hook();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        name = %cfg.server.name,
        "Starting chess-mcp server"
    );

    let registry = ToolRegistry::with_chess_tools();
    info!(tools = registry.len(), "Tool registry ready");
    let server = Arc::new(McpServer::new(Arc::new(registry), &cfg));

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(server.run_supervised());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match outcome.exit_code() {
        EXIT_OK => info!(reason = %outcome.reason, "Server shut down gracefully"),
        code => error!(reason = %outcome.reason, code, "Server shut down abnormally"),
    }
    ExitCode::from(&outcome)
}
