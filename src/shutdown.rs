//! Graceful shutdown on SIGTERM and SIGINT.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Listens for shutdown signals and trips a [`CancellationToken`].
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Registers the signal handlers.
    ///
    /// Returns an error if signal registration fails.
    pub fn install() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {},
                _ = sigint.recv() => {},
            }
            tracing::info!("Shutdown signal received");
            trigger.cancel();
        });
        Ok(Self { token })
    }

    /// A token clone for subsystems that need to observe shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
