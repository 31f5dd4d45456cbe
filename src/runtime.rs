//! Runtime - Graceful shutdown and signal handling for long-running commands

use std::future::Future;
use tokio::sync::watch;

/// Shutdown signal shared by every task of one process.
#[derive(Clone)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self { Self::new() }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Trigger shutdown. Idempotent.
    pub fn trigger(&self) {
        self.sender.send_if_modified(|triggered| !std::mem::replace(triggered, true));
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        let _ = receiver.wait_for(|triggered| *triggered).await;
    }

    /// Run `work` unless shutdown fires first. `None` means interrupted.
    pub async fn run_until<F: Future>(&self, work: F) -> Option<F::Output> {
        tokio::select! {
            output = work => Some(output),
            _ = self.wait() => None,
        }
    }
}

/// Install SIGINT / SIGTERM handlers and return the shutdown handle.
pub fn install_signal_handlers() -> Shutdown {
    let shutdown = Shutdown::new();
    let handle = shutdown.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, "signal handlers unavailable");
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "ctrl-c handler unavailable");
                return;
            }
            tracing::info!("received Ctrl+C");
        }

        handle.trigger();
    });

    shutdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        shutdown.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_interrupts_pending_work() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.trigger();
        });
        let outcome = shutdown.run_until(std::future::pending::<()>()).await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn run_until_returns_finished_work() {
        let shutdown = Shutdown::new();
        assert_eq!(shutdown.run_until(async { 7 }).await, Some(7));
    }
}
