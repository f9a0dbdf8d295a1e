//! Process-wide shutdown signal
//!
//! One cancellation token, fired by SIGINT/SIGTERM or explicitly by the
//! supervisor. Once fired it stays fired.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Why we are shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    CtrlC,
    Sigterm,
    /// Cancelled by the program itself (e.g. the workload exited)
    Requested,
}

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fires the signal; idempotent
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels the token when the process receives SIGINT or SIGTERM
    ///
    /// The task ends with [`ShutdownReason::Requested`] if the token is
    /// cancelled some other way first.
    pub fn listen_for_signals(&self) -> JoinHandle<ShutdownReason> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            let reason = tokio::select! {
                _ = shutdown.token.cancelled() => return ShutdownReason::Requested,
                reason = wait_ctrl_c() => reason,
                reason = wait_sigterm() => reason,
            };
            info!("Received {:?}, shutting down", reason);
            shutdown.cancel();
            reason
        })
    }
}

async fn wait_ctrl_c() -> ShutdownReason {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a handler this branch must never win.
        std::future::pending::<()>().await;
    }
    ShutdownReason::CtrlC
}

/// Wait for SIGTERM on Unix. On non-Unix, this future never completes.
#[cfg(unix)]
async fn wait_sigterm() -> ShutdownReason {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
    ShutdownReason::Sigterm
}

#[cfg(not(unix))]
async fn wait_sigterm() -> ShutdownReason {
    std::future::pending::<ShutdownReason>().await
}
