//! Message History
//!
//! Every accepted message is recorded append-only. Publishing happens off
//! the relay path: the hub hands records to a [`HistorySink`], whose
//! background task forwards them to the configured [`HistoryPublisher`].
//! Publish failures are logged and never reach the broadcaster.

mod amqp;
mod publisher;
mod sink;

pub use amqp::AmqpHistoryPublisher;
pub use publisher::{FileHistoryPublisher, HttpHistoryPublisher, NoopHistoryPublisher};
pub use sink::HistorySink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{HistoryBackend, HistoryConfig};

/// One accepted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub room_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

impl HistoryRecord {
    /// Record stamped with the current time
    pub fn new(
        room_id: impl Into<String>,
        email: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            email: email.into(),
            created_at: Utc::now(),
            message: message.into(),
        }
    }
}

/// Durable destination for history records
#[async_trait]
pub trait HistoryPublisher: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn publish(&self, record: &HistoryRecord) -> Result<(), PublishError>;
}

/// Build the publisher selected by `config`
pub async fn publisher_from_config(
    config: &HistoryConfig,
) -> Result<Arc<dyn HistoryPublisher>, PublishError> {
    let publisher: Arc<dyn HistoryPublisher> = match config.backend {
        HistoryBackend::None => Arc::new(NoopHistoryPublisher),
        HistoryBackend::File => {
            let file = FileHistoryPublisher::open(&config.path).await?;
            tracing::info!(path = %file.path().display(), "Appending history to file");
            Arc::new(file)
        }
        HistoryBackend::Http => Arc::new(HttpHistoryPublisher::new(config)?),
        HistoryBackend::Amqp => Arc::new(AmqpHistoryPublisher::new(config)?),
    };

    tracing::info!(backend = publisher.name(), "History publisher ready");
    Ok(publisher)
}

/// Errors that can occur while publishing history
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("History endpoint error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Broker error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("History endpoint not configured")]
    NotConfigured,

    #[error("History endpoint unavailable")]
    Unavailable,

    #[error("History request timeout")]
    Timeout,
}
