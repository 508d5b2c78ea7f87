//! Connection Handles
//!
//! A connection is owned by the worker task serving it. Rooms only keep a
//! `Weak` reference, so a member that was dropped without leaving is
//! detected and evicted on the next broadcast.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Unique identifier for a connection
pub type ConnectionId = String;

/// Duplex message channel to a single client
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable identifier of this connection
    fn id(&self) -> &str;

    /// Write one text frame to the client
    async fn send(&self, text: &str) -> Result<(), WriteError>;

    /// Close the connection
    ///
    /// Idempotent: only the first call touches the transport.
    async fn close(&self);

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;

    /// Resolves once the connection has been closed
    async fn closed(&self);
}

/// One-shot close flag shared by `close`, `is_closed` and `closed`
#[derive(Debug)]
pub struct CloseSignal {
    tx: watch::Sender<bool>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Mark as closed. Returns true only for the call that flipped the flag.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until `fire` has been called
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once fired.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Failure writing to a single member
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Connection closed")]
    Closed,

    #[error("Write timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Failure reading from a connection; always ends that connection's session
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("Receive failed: {0}")]
    Receive(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_close_signal_fires_once() {
        let signal = CloseSignal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_close_signal_wakes_waiter() {
        let signal = Arc::new(CloseSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::task::yield_now().await;
        signal.fire();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_after_fire_returns_immediately() {
        let signal = CloseSignal::new();
        signal.fire();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("wait should not block once fired");
    }
}
