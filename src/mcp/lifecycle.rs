//! Session state machine and shutdown plumbing.
//!
//! ```text
//! AwaitingHandshake ──initialize──▶ Ready ──┐
//!         │                                 ├─▶ ShuttingDown ──▶ Terminated
//!         └─────────────────────────────────┘
//! ```
//!
//! Shutdown is entered at most once; [`Lifecycle::begin_shutdown`] returns
//! `true` only for the first caller. The drain that follows is bounded by
//! the grace period in the server loop, and a [`Watchdog`] enforces a
//! second, longer deadline from a plain thread so it fires even when the
//! runtime itself is stuck.

use std::fmt;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Exit code for a graceful shutdown.
pub const EXIT_OK: u8 = 0;
/// Exit code after a fatal error outside the per-request boundary.
pub const EXIT_FATAL: u8 = 1;
/// Exit code when a shutdown deadline forced termination.
pub const EXIT_FORCED: u8 = 2;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for `initialize`.
    AwaitingHandshake,
    /// Handshake done, normal operation.
    Ready,
    /// Shutdown in progress.
    ShuttingDown,
    /// Shutdown finished.
    Terminated,
}

/// A signal that asks the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT or Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "SIGINT"),
            Self::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// What ended the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The client closed stdin.
    InputClosed,
    /// A termination signal arrived.
    Signal(ShutdownSignal),
    /// An error outside the per-request boundary, such as stream I/O.
    Fatal(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputClosed => write!(f, "input closed"),
            Self::Signal(signal) => write!(f, "received {signal}"),
            Self::Fatal(message) => write!(f, "fatal error: {message}"),
        }
    }
}

/// How the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The shutdown trigger.
    pub reason: ShutdownReason,
    /// `true` if the grace period ran out and work was abandoned.
    pub forced: bool,
}

impl Outcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        if self.forced {
            EXIT_FORCED
        } else if matches!(self.reason, ShutdownReason::Fatal(_)) {
            EXIT_FATAL
        } else {
            EXIT_OK
        }
    }
}

impl From<&Outcome> for ExitCode {
    fn from(outcome: &Outcome) -> Self {
        Self::from(outcome.exit_code())
    }
}

/// Shared session state with an idempotent shutdown transition.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<SessionState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Starts in [`SessionState::AwaitingHandshake`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::AwaitingHandshake),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to [`SessionState::Ready`]. Returns `false` if the handshake
    /// had already completed or shutdown has begun.
    pub fn mark_ready(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SessionState::AwaitingHandshake {
            *state = SessionState::Ready;
            true
        } else {
            false
        }
    }

    /// Enters [`SessionState::ShuttingDown`].
    ///
    /// Returns `true` only for the call that performed the transition;
    /// every later call is a no-op returning `false`.
    pub fn begin_shutdown(&self, reason: &ShutdownReason) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            SessionState::ShuttingDown | SessionState::Terminated => {
                tracing::debug!(%reason, "Shutdown already in progress, ignoring");
                false
            }
            SessionState::AwaitingHandshake | SessionState::Ready => {
                tracing::info!(%reason, "Shutting down");
                *state = SessionState::ShuttingDown;
                true
            }
        }
    }

    /// Marks shutdown as finished.
    pub fn terminate(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = SessionState::Terminated;
    }
}

/// Hard shutdown deadline running on its own thread.
///
/// Disarmed when dropped. If the deadline passes first, the expiry action
/// runs exactly once.
pub struct Watchdog {
    disarm: Option<std_mpsc::Sender<()>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    /// Arms a watchdog that terminates the process with [`EXIT_FORCED`].
    #[must_use]
    pub fn arm(deadline: Duration) -> Self {
        Self::arm_with(deadline, move || {
            tracing::error!(
                deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                "Shutdown did not finish before the hard deadline, terminating"
            );
            std::process::exit(i32::from(EXIT_FORCED));
        })
    }

    /// Arms a watchdog running `on_expire` when the deadline passes.
    #[must_use]
    pub fn arm_with<F>(deadline: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (disarm, rx) = std_mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        thread::spawn(move || {
            if let Err(std_mpsc::RecvTimeoutError::Timeout) = rx.recv_timeout(deadline) {
                flag.store(true, Ordering::SeqCst);
                on_expire();
            }
        });

        Self {
            disarm: Some(disarm),
            fired,
        }
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // Dropping the sender wakes the thread with `Disconnected`.
        self.disarm.take();
    }
}

/// Forwards process termination signals into `tx`.
///
/// The OS handlers are installed before this returns, so signals sent
/// afterwards are never lost. The forwarding task ends when the receiver
/// is dropped.
///
/// # Errors
///
/// Returns an error if a signal handler cannot be installed.
#[cfg(unix)]
pub fn forward_signals(tx: mpsc::Sender<ShutdownSignal>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = sigint.recv() => ShutdownSignal::Interrupt,
                Some(()) = sigterm.recv() => ShutdownSignal::Terminate,
                else => break,
            };
            tracing::debug!(signal = %received, "Signal received");
            if tx.send(received).await.is_err() {
                break;
            }
        }
    }))
}

/// Forwards process termination signals into `tx`.
///
/// # Errors
///
/// Never fails on this platform; the signature matches the unix variant.
#[cfg(windows)]
pub fn forward_signals(tx: mpsc::Sender<ShutdownSignal>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                break;
            }
            tracing::debug!("Ctrl+C received");
            if tx.send(ShutdownSignal::Interrupt).await.is_err() {
                break;
            }
        }
    }))
}
