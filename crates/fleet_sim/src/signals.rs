//! Termination signals that stop the simulator.
//!
//! The simulator only ever waits for a single signal. Whichever arrives
//! first is reported back so the caller can log it before shutting the
//! background loops down.

use std::fmt;
use tokio::signal;

/// The termination request that ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Waits until the process is asked to stop.
///
/// # Platform Support
///
/// * **Unix**: SIGINT maps to [`ShutdownSignal::Interrupt`], SIGTERM to
///   [`ShutdownSignal::Terminate`]
/// * **Other platforms**: Ctrl+C maps to [`ShutdownSignal::Interrupt`]
///
/// # Returns
///
/// The signal that arrived first, or the I/O error raised while installing
/// the handlers.
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        Ok(tokio::select! {
            _ = interrupt.recv() => ShutdownSignal::Interrupt,
            _ = terminate.recv() => ShutdownSignal::Terminate,
        })
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}
