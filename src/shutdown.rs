//! Process shutdown: `Running → ShuttingDown → Terminated`, entered once, never left.
//!
//! In-flight requests are not drained. The model is released and the caller exits.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::engine::{self, Engine};
use crate::server::ServerContext;

/// Exit code for every shutdown path, fatal ones included.
pub const SHUTDOWN_EXIT_CODE: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Terminated,
}

impl ShutdownState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::ShuttingDown,
            _ => Self::Terminated,
        }
    }
}

/// What triggered the shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C.
    Interrupt,

    /// SIGTERM.
    Terminate,

    /// A failure nothing else handled: a panic, or the listener giving up.
    Fatal(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
            Self::Fatal(msg) => write!(f, "fatal error: {msg}"),
        }
    }
}

/// Releases the model exactly once when the process is going down.
pub struct ShutdownCoordinator<E: Engine> {
    ctx: Arc<ServerContext<E>>,
    state: AtomicU8,
}

impl<E: Engine> ShutdownCoordinator<E> {
    pub fn new(ctx: Arc<ServerContext<E>>) -> Self {
        Self {
            ctx,
            state: AtomicU8::new(ShutdownState::Running as u8),
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Run the shutdown sequence. Returns `false` if another trigger already started it.
    ///
    /// The caller is expected to exit with [`SHUTDOWN_EXIT_CODE`] afterwards.
    pub fn shutdown(&self, reason: &ShutdownReason) -> bool {
        let started = self.state.compare_exchange(
            ShutdownState::Running as u8,
            ShutdownState::ShuttingDown as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if started.is_err() {
            debug!(%reason, "shutdown already in progress");
            return false;
        }

        match reason {
            ShutdownReason::Fatal(_) => error!(%reason, "shutting down"),
            _ => info!(%reason, "shutting down"),
        }
        debug!(
            active = self.ctx.active_transcriptions(),
            "abandoning in-flight transcriptions"
        );

        self.ctx.models().release();
        self.state
            .store(ShutdownState::Terminated as u8, Ordering::SeqCst);

        info!("shutdown complete");
        true
    }
}

/// Route panics into the shutdown sequence, then exit.
///
/// The previous hook still runs first so the panic message reaches stderr. Panics inside an
/// engine call are left to unwind: they fail that one request with an engine error.
pub fn install_panic_hook<E: Engine>(coordinator: Arc<ShutdownCoordinator<E>>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        previous(panic_info);
        if !panic_is_process_fatal() {
            return;
        }
        coordinator.shutdown(&ShutdownReason::Fatal(panic_info.to_string()));
        std::process::exit(SHUTDOWN_EXIT_CODE);
    }));
}

fn panic_is_process_fatal() -> bool {
    !engine::in_engine_call()
}

/// Resolve on the first interrupt or terminate signal.
pub async fn wait_for_signal() -> ShutdownReason {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => ShutdownReason::Interrupt,
            Err(err) => {
                warn!(error = %err, "failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                ShutdownReason::Terminate
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<ShutdownReason>();

    tokio::select! {
        reason = ctrl_c => reason,
        reason = terminate => reason,
    }
}
