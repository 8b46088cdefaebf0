//! OS signal handling.
//!
//! A single background task waits for SIGINT or SIGTERM (Ctrl+C only on
//! non-unix targets) and triggers the shared [`Shutdown`].

use std::io;

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;
use crate::observability::Logger;

/// Wait until the process is asked to terminate. Returns the signal name.
#[cfg(unix)]
pub async fn wait_for_termination() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = terminate.recv() => Ok("SIGTERM"),
        _ = interrupt.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_termination() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Spawn the signal listener. It triggers `shutdown` once and exits.
///
/// If the handlers cannot be installed the error is logged and shutdown
/// is left to other triggers.
pub fn spawn_signal_listener(shutdown: Shutdown, logger: Logger) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_termination().await {
            Ok(signal) => {
                logger.in_scope(|| tracing::info!(signal, "Termination signal received"));
                shutdown.trigger();
            }
            Err(e) => {
                logger.error(format_args!("Failed to install signal handlers: {e}"));
            }
        }
    })
}
