//! Cancellation handling for build runs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Run-wide cancellation flag with async notification
pub struct ShutdownManager {
    flag: AtomicBool,
    sender: watch::Sender<bool>,
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { flag: AtomicBool::new(false), sender }
    }

    /// Check if shutdown was requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Request shutdown; every pending [`cancelled`](Self::cancelled) future completes
    pub fn request_shutdown(&self, reason: &str) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            info!("Shutdown requested: {}", reason);
        }
        self.sender.send_replace(true);
    }

    /// Complete once shutdown has been requested
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        if receiver.wait_for(|requested| *requested).await.is_err() {
            // Sender lives as long as self
            std::future::pending::<()>().await;
        }
    }
}

/// Route SIGINT and SIGTERM to the shutdown manager
pub fn setup_signal_handlers(shutdown: Arc<ShutdownManager>) {
    let on_ctrl_c = Arc::clone(&shutdown);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => on_ctrl_c.request_shutdown("interrupted (SIGINT)"),
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    #[cfg(unix)]
    {
        let on_term = Arc::clone(&shutdown);
        tokio::spawn(async move {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    on_term.request_shutdown("terminated (SIGTERM)");
                }
                Err(e) => warn!("Failed to create SIGTERM handler: {}", e),
            }
        });
    }

    debug!("Signal handlers installed");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_request_shutdown() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown_requested());

        manager.request_shutdown("test");
        assert!(manager.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_cancelled_completes_after_request() {
        let manager = Arc::new(ShutdownManager::new());

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.request_shutdown("test");

        assert!(timeout(Duration::from_secs(1), waiter).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_is_immediate_when_already_requested() {
        let manager = ShutdownManager::new();
        manager.request_shutdown("test");
        assert!(timeout(Duration::from_millis(100), manager.cancelled()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_pends_without_request() {
        let manager = ShutdownManager::new();
        assert!(timeout(Duration::from_millis(20), manager.cancelled()).await.is_err());
    }
}
