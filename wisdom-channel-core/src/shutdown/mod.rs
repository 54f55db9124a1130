//! Graceful shutdown coordinator
//!
//! The first signal requests a graceful stop, bounded by the grace period.
//! A second signal while shutting down escalates to `Immediate`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Graceful,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    ShuttingDown,
    Shutdown,
}

pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            shutdown_tx,
            grace,
        }
    }

    /// Upper bound for graceful cleanup
    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    /// Request a graceful shutdown; escalates if one is already underway
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        let signal = match *state {
            ShutdownState::Running => {
                info!("initiating graceful shutdown");
                *state = ShutdownState::ShuttingDown;
                ShutdownSignal::Graceful
            }
            ShutdownState::ShuttingDown | ShutdownState::Shutdown => {
                warn!("shutdown already in progress, escalating");
                *state = ShutdownState::Shutdown;
                ShutdownSignal::Immediate
            }
        };
        drop(state);

        if self.shutdown_tx.send(signal).is_err() {
            // nobody is listening yet; late waiters read the state instead
            info!("no shutdown subscribers");
        }
    }

    /// Mark cleanup as finished
    pub async fn complete(&self) {
        *self.state.write().await = ShutdownState::Shutdown;
        info!("shutdown complete");
    }

    pub async fn is_shutting_down(&self) -> bool {
        *self.state.read().await != ShutdownState::Running
    }

    pub async fn state(&self) -> ShutdownState {
        *self.state.read().await
    }

    /// Resolve once shutdown has been requested, including before this call
    pub async fn wait_for_shutdown(&self) -> ShutdownSignal {
        let mut rx = self.subscribe();
        match self.state().await {
            ShutdownState::Running => {}
            ShutdownState::ShuttingDown => return ShutdownSignal::Graceful,
            ShutdownState::Shutdown => return ShutdownSignal::Immediate,
        }
        match rx.recv().await {
            Ok(signal) => signal,
            Err(e) => {
                error!(error = %e, "shutdown channel error");
                ShutdownSignal::Immediate
            }
        }
    }

    /// Run `cleanup` within the grace period. Returns false when it timed
    /// out or an immediate shutdown cut it short.
    pub async fn run_cleanup<F>(&self, cleanup: F) -> bool
    where
        F: Future<Output = ()>,
    {
        let mut rx = self.subscribe();
        let finished = tokio::select! {
            result = tokio::time::timeout(self.grace, cleanup) => match result {
                Ok(()) => true,
                Err(_) => {
                    warn!(grace = ?self.grace, "cleanup exceeded grace period");
                    false
                }
            },
            _ = async {
                loop {
                    match rx.recv().await {
                        Ok(ShutdownSignal::Immediate) | Err(_) => break,
                        Ok(ShutdownSignal::Graceful) => continue,
                    }
                }
            } => {
                warn!("immediate shutdown requested, abandoning cleanup");
                false
            }
        };
        self.complete().await;
        finished
    }
}

/// Trigger `coordinator.shutdown()` on SIGINT or SIGTERM, repeatedly
#[cfg(unix)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
            coordinator.shutdown().await;
        }
    });
    Ok(())
}

#[cfg(windows)]
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) -> std::io::Result<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "ctrl-c handler failed");
                return;
            }
            info!("received Ctrl+C");
            coordinator.shutdown().await;
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_transitions() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(100));
        assert_eq!(coordinator.state().await, ShutdownState::Running);
        assert!(!coordinator.is_shutting_down().await);

        coordinator.shutdown().await;
        assert_eq!(coordinator.state().await, ShutdownState::ShuttingDown);

        coordinator.shutdown().await;
        assert_eq!(coordinator.state().await, ShutdownState::Shutdown);
    }

    #[tokio::test]
    async fn test_wait_sees_earlier_shutdown() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(100));
        coordinator.shutdown().await;
        assert_eq!(coordinator.wait_for_shutdown().await, ShutdownSignal::Graceful);
    }

    #[tokio::test]
    async fn test_waiter_is_woken() {
        let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_millis(100)));
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_for_shutdown().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.shutdown().await;
        assert_eq!(waiter.await.unwrap(), ShutdownSignal::Graceful);
    }

    #[tokio::test]
    async fn test_cleanup_bounded_by_grace() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
        let quick = coordinator.run_cleanup(async {}).await;
        assert!(quick);
        assert_eq!(coordinator.state().await, ShutdownState::Shutdown);

        let coordinator = ShutdownCoordinator::new(Duration::from_millis(50));
        let slow = coordinator
            .run_cleanup(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert!(!slow);
    }
}
