//! Diagnostic output for the bridge.
//!
//! stdout belongs to the protocol, so every diagnostic line goes to stderr
//! and starts with a bracketed severity tag (`[ERROR]`, `[WARN]`,
//! `[INFO]`, `[LOG]`). Operators can merge both streams while debugging
//! and still tell them apart.

use std::fmt;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Returns the tag printed in front of a diagnostic line.
#[must_use]
pub const fn severity_tag(level: Level) -> &'static str {
    match level {
        Level::ERROR => "[ERROR]",
        Level::WARN => "[WARN]",
        Level::INFO => "[INFO]",
        _ => "[LOG]",
    }
}

/// Event formatter producing `[TAG] message key=value` lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeverityTagged;

impl<S, N> FormatEvent<S, N> for SeverityTagged
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{} ", severity_tag(*event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Determines the log level from CLI arguments and the configured level.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
#[must_use]
pub fn resolve_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Filter honouring `RUST_LOG`, with `level` added as a directive.
#[must_use]
pub fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(level.into())
}

/// Builds a subscriber writing severity-tagged lines to `make_writer`.
pub fn subscriber<W>(filter: EnvFilter, make_writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .event_format(SeverityTagged)
        .with_writer(make_writer)
        .finish()
}

/// Installs the global stderr subscriber.
///
/// Call once, before anything else logs.
pub fn init(level: Level) {
    let subscriber = subscriber(env_filter(level), std::io::stderr);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Global tracing subscriber was already installed");
    }
}

/// Routes panic messages through `tracing` so they are tagged like every
/// other diagnostic line.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(%location, "Panic: {payload}");
    }));
}
