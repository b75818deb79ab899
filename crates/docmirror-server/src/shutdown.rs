//! Graceful shutdown with distinct stop and quit phases.
//!
//! "Stop" drains background work: the replicator and the cleanup worker
//! finish their current step and return. "Quit" tears down the server.
//! Quit follows stop after the drain window so in-flight requests can
//! complete.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

pub struct GracefulShutdown {
    stop_tx: watch::Sender<bool>,
    quit_tx: watch::Sender<bool>,
    drain: Duration,
}

impl GracefulShutdown {
    pub fn new(drain: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (quit_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            quit_tx,
            drain,
        }
    }

    /// Signal observed by background tasks (replicator, cleanup).
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// Signal observed by the server.
    pub fn quit_signal(&self) -> watch::Receiver<bool> {
        self.quit_tx.subscribe()
    }

    /// Initiates shutdown: stop now, quit after the drain window.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);

        let quit_tx = self.quit_tx.clone();
        let drain = self.drain;
        tokio::spawn(async move {
            tokio::time::sleep(drain).await;
            quit_tx.send_replace(true);
        });
    }

    /// Waits for SIGINT or SIGTERM, then initiates shutdown.
    pub async fn watch_signals(&self) {
        let interrupted = async {
            tokio::signal::ctrl_c().await.ok();
        };

        #[cfg(unix)]
        let terminated = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(_) => std::future::pending().await,
            }
        };
        #[cfg(not(unix))]
        let terminated = std::future::pending::<()>();

        tokio::select! {
            _ = interrupted => {}
            _ = terminated => {}
        }

        info!("shutting down");
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_signals_background_tasks_first() {
        let shutdown = GracefulShutdown::new(Duration::from_millis(200));
        let mut stop = shutdown.stop_signal();
        let mut quit = shutdown.quit_signal();

        shutdown.stop();

        stop.changed().await.unwrap();
        assert!(*stop.borrow());
        // Quit lags by the drain window.
        assert!(!*quit.borrow());
        quit.changed().await.unwrap();
        assert!(*quit.borrow());
    }

    #[tokio::test]
    async fn test_signals_start_low() {
        let shutdown = GracefulShutdown::new(Duration::from_secs(10));
        assert!(!*shutdown.stop_signal().borrow());
        assert!(!*shutdown.quit_signal().borrow());
    }
}
