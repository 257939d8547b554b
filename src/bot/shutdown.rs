// src/bot/shutdown.rs - Shutdown signalling

use log::{error, info};
use std::fmt;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

/// What asked the bot to stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    Interrupt,
    /// SIGTERM (systemd, docker stop, etc.)
    Terminate,
    /// The chat transport went away
    Disconnected(String),
    /// Triggered from code
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "interrupt signal"),
            ShutdownReason::Terminate => write!(f, "terminate signal"),
            ShutdownReason::Disconnected(reason) => write!(f, "transport disconnected ({})", reason),
            ShutdownReason::Requested => write!(f, "shutdown requested"),
        }
    }
}

/// One-shot shutdown latch shared by every task that needs to stop.
/// The first trigger wins; later ones are ignored.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender: Arc::new(sender) }
    }

    /// Request shutdown. Returns false if shutdown was already requested.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let mut accepted = false;
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            info!("Shutdown triggered: {}", reason);
            *current = Some(reason.clone());
            accepted = true;
            true
        });
        accepted
    }

    pub fn is_triggered(&self) -> bool {
        self.sender.borrow().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.sender.borrow().clone()
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) -> ShutdownReason {
        let mut receiver = self.sender.subscribe();
        loop {
            if let Some(reason) = receiver.borrow_and_update().clone() {
                return reason;
            }
            // The sender lives as long as `self`, so this cannot fail
            if receiver.changed().await.is_err() {
                return ShutdownReason::Requested;
            }
        }
    }

    /// Start listening for Ctrl+C and SIGTERM
    pub fn start_signal_handlers(&self) {
        let on_interrupt = self.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C signal, initiating shutdown...");
                    on_interrupt.trigger(ShutdownReason::Interrupt);
                }
                Err(err) => {
                    error!("Failed to listen for Ctrl+C signal: {}", err);
                }
            }
        });

        #[cfg(unix)]
        {
            let on_terminate = self.clone();
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(err) => {
                        error!("Failed to register SIGTERM handler: {}", err);
                        return;
                    }
                };

                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal, initiating shutdown...");
                    on_terminate.trigger(ShutdownReason::Terminate);
                }
            });
        }

        info!("Shutdown signal handlers started");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_first_trigger_wins() {
        let shutdown = ShutdownSignal::new();
        assert!(!shutdown.is_triggered());

        assert!(shutdown.trigger(ShutdownReason::Interrupt));
        assert!(!shutdown.trigger(ShutdownReason::Terminate));

        assert!(shutdown.is_triggered());
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Interrupt));
    }

    #[tokio::test]
    async fn test_wait_wakes_every_clone() {
        let shutdown = ShutdownSignal::new();
        let first = shutdown.clone();
        let second = shutdown.clone();

        let waiter_a = tokio::spawn(async move { first.wait().await });
        let waiter_b = tokio::spawn(async move { second.wait().await });

        tokio::task::yield_now().await;
        shutdown.trigger(ShutdownReason::Disconnected("eof".to_string()));

        let a = timeout(Duration::from_secs(1), waiter_a).await.unwrap().unwrap();
        let b = timeout(Duration::from_secs(1), waiter_b).await.unwrap().unwrap();
        assert_eq!(a, ShutdownReason::Disconnected("eof".to_string()));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns_immediately() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger(ShutdownReason::Requested);

        let reason = timeout(Duration::from_millis(100), shutdown.wait()).await.unwrap();
        assert_eq!(reason, ShutdownReason::Requested);
    }
}
