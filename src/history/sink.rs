//! History Sink
//!
//! Bounded queue in front of a publisher. `submit` never waits: when the
//! queue is full the record is dropped and logged. The background task
//! exits once every sink handle is dropped and the queue is drained.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::{HistoryPublisher, HistoryRecord};

/// Fire-and-forget handle for recording history
#[derive(Clone)]
pub struct HistorySink {
    tx: mpsc::Sender<HistoryRecord>,
}

impl HistorySink {
    /// Start the publishing task
    pub fn spawn(publisher: Arc<dyn HistoryPublisher>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run(publisher, rx));
        (Self { tx }, handle)
    }

    /// Queue a record for publishing
    pub fn submit(&self, record: HistoryRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                tracing::warn!(room_id = %record.room_id, "History queue full, dropping record");
            }
            Err(TrySendError::Closed(record)) => {
                tracing::warn!(room_id = %record.room_id, "History sink stopped, dropping record");
            }
        }
    }
}

async fn run(publisher: Arc<dyn HistoryPublisher>, mut rx: mpsc::Receiver<HistoryRecord>) {
    while let Some(record) = rx.recv().await {
        if let Err(e) = publisher.publish(&record).await {
            tracing::warn!(
                backend = publisher.name(),
                room_id = %record.room_id,
                error = %e,
                "Failed to publish history record"
            );
        }
    }

    tracing::debug!(backend = publisher.name(), "History sink drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPublisher;
    use std::time::Duration;

    #[tokio::test]
    async fn test_submitted_records_are_published() {
        let publisher = RecordingPublisher::new();
        let (sink, _handle) = HistorySink::spawn(publisher.clone(), 8);

        sink.submit(HistoryRecord::new("r1", "a@x.com", "one"));
        sink.submit(HistoryRecord::new("r1", "a@x.com", "two"));

        let records = publisher.wait_for(2).await;
        let messages: Vec<_> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_drains_when_sink_dropped() {
        let publisher = RecordingPublisher::new();
        let (sink, handle) = HistorySink::spawn(publisher.clone(), 8);

        for i in 0..5 {
            sink.submit(HistoryRecord::new("r1", "a@x.com", format!("m{}", i)));
        }
        drop(sink);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sink task should exit")
            .unwrap();
        assert_eq!(publisher.records().await.len(), 5);
    }

    #[tokio::test]
    async fn test_publish_failures_do_not_stop_sink() {
        let publisher = RecordingPublisher::failing();
        let (sink, handle) = HistorySink::spawn(publisher.clone(), 8);

        sink.submit(HistoryRecord::new("r1", "a@x.com", "lost"));
        sink.submit(HistoryRecord::new("r1", "a@x.com", "also lost"));
        drop(sink);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sink task should exit")
            .unwrap();
        assert!(publisher.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_submit_after_stop_does_not_panic() {
        let publisher = RecordingPublisher::new();
        let (sink, handle) = HistorySink::spawn(publisher, 1);
        handle.abort();
        let _ = handle.await;

        sink.submit(HistoryRecord::new("r1", "a@x.com", "late"));
    }
}
