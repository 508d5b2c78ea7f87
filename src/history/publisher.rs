//! History Publishers
//!
//! - `file`: one JSON object per line, appended
//! - `http`: one JSON POST per record, retried with backoff
//! - `none`: discards records
//!
//! The broker backend lives in [`super::AmqpHistoryPublisher`].

use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{HistoryPublisher, HistoryRecord, PublishError};
use crate::config::HistoryConfig;

/// Discards every record
#[derive(Debug, Default)]
pub struct NoopHistoryPublisher;

#[async_trait]
impl HistoryPublisher for NoopHistoryPublisher {
    fn name(&self) -> &str {
        "none"
    }

    async fn publish(&self, _record: &HistoryRecord) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Appends records to a JSON-lines file
pub struct FileHistoryPublisher {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileHistoryPublisher {
    /// Open or create the history file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PublishError> {
        let path = path.as_ref().to_path_buf();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryPublisher for FileHistoryPublisher {
    fn name(&self) -> &str {
        "file"
    }

    async fn publish(&self, record: &HistoryRecord) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        // One write per record keeps lines whole.
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// POSTs each record to an HTTP endpoint
pub struct HttpHistoryPublisher {
    client: Client,
    url: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpHistoryPublisher {
    pub fn new(config: &HistoryConfig) -> Result<Self, PublishError> {
        if config.url.is_empty() {
            return Err(PublishError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            max_retries: config.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }
}

#[async_trait]
impl HistoryPublisher for HttpHistoryPublisher {
    fn name(&self) -> &str {
        "http"
    }

    async fn publish(&self, record: &HistoryRecord) -> Result<(), PublishError> {
        let mut last_error = PublishError::Unavailable;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Quadratic backoff: 1x, 4x, 9x the base delay
                let delay = self.retry_backoff * attempt.pow(2);
                tokio::time::sleep(delay).await;
            }

            match self.client.post(&self.url).json(record).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    } else if status.is_server_error() || status.as_u16() == 429 {
                        last_error = PublishError::ApiError {
                            status: status.as_u16(),
                            message: response.text().await.unwrap_or_default(),
                        };
                        continue;
                    } else {
                        return Err(PublishError::ApiError {
                            status: status.as_u16(),
                            message: response.text().await.unwrap_or_default(),
                        });
                    }
                }
                Err(e) => {
                    last_error = if e.is_timeout() {
                        PublishError::Timeout
                    } else if e.is_connect() {
                        PublishError::Unavailable
                    } else {
                        PublishError::Request(e)
                    };
                    continue;
                }
            }
        }

        Err(last_error)
    }
}
