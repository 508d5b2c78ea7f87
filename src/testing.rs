//! In-memory collaborators shared by unit tests.

use crate::history::{HistoryPublisher, HistoryRecord, PublishError};
use crate::websocket::{CloseSignal, Connection, TransportError, WriteError};
use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

pub type InboundStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Connection that records every frame written to it
pub struct FakeConnection {
    id: String,
    outbox_tx: mpsc::UnboundedSender<String>,
    outbox_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    fail_sends: AtomicBool,
    hang_sends: AtomicBool,
    send_attempts: AtomicUsize,
    transport_closes: AtomicUsize,
    signal: CloseSignal,
}

impl FakeConnection {
    pub fn new(id: &str) -> Arc<Self> {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: id.to_string(),
            outbox_tx,
            outbox_rx: Mutex::new(outbox_rx),
            fail_sends: AtomicBool::new(false),
            hang_sends: AtomicBool::new(false),
            send_attempts: AtomicUsize::new(0),
            transport_closes: AtomicUsize::new(0),
            signal: CloseSignal::new(),
        })
    }

    /// Every send fails with a transport error
    pub fn failing(id: &str) -> Arc<Self> {
        let conn = Self::new(id);
        conn.fail_sends.store(true, Ordering::SeqCst);
        conn
    }

    /// Every send blocks forever
    pub fn hanging(id: &str) -> Arc<Self> {
        let conn = Self::new(id);
        conn.hang_sends.store(true, Ordering::SeqCst);
        conn
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_sends.store(failing, Ordering::SeqCst);
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn transport_closes(&self) -> usize {
        self.transport_closes.load(Ordering::SeqCst)
    }

    /// Next frame written to this connection, waiting up to one second
    pub async fn next_message(&self) -> Option<String> {
        let mut rx = self.outbox_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next frame if one is already queued
    pub async fn try_next_message(&self) -> Option<String> {
        self.outbox_rx.lock().await.try_recv().ok()
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, text: &str) -> Result<(), WriteError> {
        if self.signal.is_fired() {
            return Err(WriteError::Closed);
        }
        self.send_attempts.fetch_add(1, Ordering::SeqCst);

        if self.hang_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(WriteError::Transport("broken pipe".to_string()));
        }

        self.outbox_tx
            .send(text.to_string())
            .map_err(|_| WriteError::Closed)
    }

    async fn close(&self) {
        if self.signal.fire() {
            self.transport_closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_closed(&self) -> bool {
        self.signal.is_fired()
    }

    async fn closed(&self) {
        self.signal.wait().await
    }
}

/// Inbound frame stream fed from the returned sender.
/// Dropping the sender ends the stream, like a peer hanging up.
pub fn inbound_channel() -> (
    mpsc::UnboundedSender<Result<String, TransportError>>,
    InboundStream,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    (tx, Box::pin(stream))
}

/// History publisher that keeps every record in memory
#[derive(Default)]
pub struct RecordingPublisher {
    records: Mutex<Vec<HistoryRecord>>,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publisher whose every publish fails
    pub fn failing() -> Arc<Self> {
        let publisher = Self::default();
        publisher.fail.store(true, Ordering::SeqCst);
        Arc::new(publisher)
    }

    pub async fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().await.clone()
    }

    /// Wait up to one second for at least `count` records
    pub async fn wait_for(&self, count: usize) -> Vec<HistoryRecord> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            let records = self.records().await;
            if records.len() >= count || tokio::time::Instant::now() >= deadline {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl HistoryPublisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, record: &HistoryRecord) -> Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable);
        }
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
