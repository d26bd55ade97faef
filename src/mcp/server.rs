//! MCP server lifecycle.
//!
//! 1. **Startup**: optional readiness announcement, then the read loop
//! 2. **Operation**: one `select!` loop reads lines, collects finished tool
//!    calls and listens for shutdown signals
//! 3. **Shutdown**: drain in-flight calls within the grace period, stop the
//!    tool service, abandon whatever is left
//!
//! Replies to tool calls are written as they complete, so they may leave
//! in a different order than the requests arrived; the `id` is the only
//! correlation.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::config::{Config, ShutdownConfig};
use crate::mcp::dispatch::{Dispatch, Dispatcher};
use crate::mcp::lifecycle::{
    self, Lifecycle, Outcome, SessionState, ShutdownReason, ShutdownSignal, Watchdog,
};
use crate::mcp::protocol::{decode, JsonRpcError, Outgoing, OutgoingNotification};
use crate::mcp::transport::{LineFramer, OutputGuard};
use crate::tools::ToolService;

/// The MCP stdio server.
pub struct McpServer {
    dispatcher: Dispatcher,
    service: Arc<dyn ToolService>,
    lifecycle: Arc<Lifecycle>,
    announce_ready: bool,
    shutdown: ShutdownConfig,
}

impl McpServer {
    /// Creates a server exposing `service`.
    #[must_use]
    pub fn new(service: Arc<dyn ToolService>, config: &Config) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        Self {
            dispatcher: Dispatcher::new(
                Arc::clone(&service),
                Arc::clone(&lifecycle),
                config.server.name.clone(),
            ),
            service,
            lifecycle,
            announce_ready: config.server.announce_ready,
            shutdown: config.shutdown.clone(),
        }
    }

    /// Returns the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Serves the process stdin/stdout until shutdown.
    pub async fn run(&self) -> Outcome {
        let (tx, rx) = mpsc::channel(8);
        let forwarder = match lifecycle::forward_signals(tx) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return Outcome {
                    reason: ShutdownReason::Fatal(format!("signal handler setup failed: {e}")),
                    forced: false,
                };
            }
        };

        let mut output = OutputGuard::stdout();
        let outcome = self
            .serve(BufReader::new(tokio::io::stdin()), &mut output, rx)
            .await;

        forwarder.abort();
        outcome
    }

    /// Like [`McpServer::run`], but a panic in the session loop is turned
    /// into a fatal outcome after the tool service has been stopped.
    pub async fn run_supervised(self: Arc<Self>) -> Outcome {
        let session = Arc::clone(&self);
        self.supervise(async move { session.run().await }).await
    }

    async fn supervise<F>(&self, session: F) -> Outcome
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        match tokio::spawn(session).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Session loop failed");
                let reason = ShutdownReason::Fatal(format!("session loop failed: {e}"));
                self.lifecycle.begin_shutdown(&reason);
                let _watchdog = Watchdog::arm(self.shutdown.hard_timeout());
                let deadline = Instant::now() + self.shutdown.grace_period();
                self.finish(reason, deadline, false).await
            }
        }
    }

    /// Serves one session over arbitrary streams.
    ///
    /// Returns once the input closes, a signal arrives on `signals`, or the
    /// streams fail, after the shutdown sequence has completed.
    pub async fn serve<R, W>(
        &self,
        reader: R,
        output: &mut OutputGuard<W>,
        mut signals: mpsc::Receiver<ShutdownSignal>,
    ) -> Outcome
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut in_flight = JoinSet::new();

        let reason = if self.announce_ready {
            match output.send(&OutgoingNotification::ready().into()).await {
                Ok(()) => {
                    tracing::debug!("Announced readiness");
                    self.read_loop(reader, output, &mut signals, &mut in_flight)
                        .await
                }
                Err(e) => ShutdownReason::Fatal(format!("failed to write output: {e}")),
            }
        } else {
            self.read_loop(reader, output, &mut signals, &mut in_flight)
                .await
        };

        self.shut_down(reason, output, &mut signals, in_flight).await
    }

    async fn read_loop<R, W>(
        &self,
        reader: R,
        output: &mut OutputGuard<W>,
        signals: &mut mpsc::Receiver<ShutdownSignal>,
        in_flight: &mut JoinSet<Outgoing>,
    ) -> ShutdownReason
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut framer = LineFramer::new(reader);

        loop {
            tokio::select! {
                biased;

                Some(signal) = signals.recv() => {
                    break ShutdownReason::Signal(signal);
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = deliver(output, joined).await {
                        break ShutdownReason::Fatal(format!("failed to write output: {e}"));
                    }
                }

                line = framer.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Err(e) = self.handle_line(&line, output, in_flight).await {
                            break ShutdownReason::Fatal(format!("failed to write output: {e}"));
                        }
                    }
                    Ok(None) => {
                        tracing::info!("stdin closed");
                        break ShutdownReason::InputClosed;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read input");
                        break ShutdownReason::Fatal(format!("failed to read input: {e}"));
                    }
                },
            }
        }
    }

    /// Handles a single line of input.
    async fn handle_line<W>(
        &self,
        line: &str,
        output: &mut OutputGuard<W>,
        in_flight: &mut JoinSet<Outgoing>,
    ) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match decode(line) {
            Ok(request) => match self.dispatcher.dispatch(request) {
                Dispatch::Reply(reply) => output.send(&reply).await,
                Dispatch::Deferred(call) => {
                    tracing::trace!(id = %call.id(), "Spawning tool task");
                    in_flight.spawn(call.run());
                    Ok(())
                }
                Dispatch::Silent => Ok(()),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Rejected malformed message");
                output.send(&JsonRpcError::parse_error(&e).into()).await
            }
        }
    }

    /// Runs the shutdown sequence once and reports how it went.
    async fn shut_down<W>(
        &self,
        mut reason: ShutdownReason,
        output: &mut OutputGuard<W>,
        signals: &mut mpsc::Receiver<ShutdownSignal>,
        mut in_flight: JoinSet<Outgoing>,
    ) -> Outcome
    where
        W: AsyncWrite + Unpin,
    {
        self.lifecycle.begin_shutdown(&reason);
        let _watchdog = Watchdog::arm(self.shutdown.hard_timeout());
        let deadline = Instant::now() + self.shutdown.grace_period();
        let mut forced = false;

        if matches!(reason, ShutdownReason::Fatal(_)) {
            in_flight.abort_all();
        } else {
            while !in_flight.is_empty() {
                tokio::select! {
                    biased;

                    () = tokio::time::sleep_until(deadline) => {
                        forced = true;
                        break;
                    }

                    Some(signal) = signals.recv() => {
                        self.lifecycle.begin_shutdown(&ShutdownReason::Signal(signal));
                    }

                    Some(joined) = in_flight.join_next() => {
                        if let Err(e) = deliver(output, joined).await {
                            reason = ShutdownReason::Fatal(format!("failed to write output: {e}"));
                            break;
                        }
                    }
                }
            }

            if !in_flight.is_empty() {
                tracing::warn!(
                    abandoned = in_flight.len(),
                    "Abandoning in-flight tool calls"
                );
                in_flight.abort_all();
            }
        }

        tracing::debug!(replies = output.sent(), "Session output finished");
        self.finish(reason, deadline, forced).await
    }

    /// Stops the tool service within the grace deadline and terminates.
    async fn finish(&self, reason: ShutdownReason, deadline: Instant, mut forced: bool) -> Outcome {
        if tokio::time::timeout_at(deadline, self.service.shutdown())
            .await
            .is_err()
        {
            tracing::warn!("Tool service did not stop within the grace period");
            forced = true;
        }

        self.lifecycle.terminate();
        let outcome = Outcome { reason, forced };
        tracing::info!(
            reason = %outcome.reason,
            forced = outcome.forced,
            "Server stopped"
        );
        outcome
    }
}

/// Writes the reply of a finished tool task.
async fn deliver<W>(
    output: &mut OutputGuard<W>,
    joined: Result<Outgoing, JoinError>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match joined {
        Ok(reply) => output.send(&reply).await,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "Tool task failed without a reply");
            Ok(())
        }
    }
}
