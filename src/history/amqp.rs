//! AMQP History Publisher
//!
//! Publishes each record as a persistent JSON message to a durable direct
//! exchange. The broker connection is opened on first use and reopened
//! after any failure.

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{HistoryPublisher, HistoryRecord, PublishError};
use crate::config::HistoryConfig;

const CONTENT_TYPE: &str = "application/json";

/// Delivery mode 2 marks a message persistent.
const PERSISTENT: u8 = 2;

/// Open broker connection and the channel publishing on it
struct Session {
    // Dropping the connection closes the channel.
    _connection: Connection,
    channel: Channel,
}

/// Publishes records to a RabbitMQ exchange
pub struct AmqpHistoryPublisher {
    url: String,
    exchange: String,
    routing_key: String,
    timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl AmqpHistoryPublisher {
    pub fn new(config: &HistoryConfig) -> Result<Self, PublishError> {
        if config.amqp_url.is_empty() || config.exchange.is_empty() {
            return Err(PublishError::NotConfigured);
        }

        Ok(Self {
            url: config.amqp_url.clone(),
            exchange: config.exchange.clone(),
            routing_key: config.routing_key.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
            session: Mutex::new(None),
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    async fn connect(&self) -> Result<Session, PublishError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        tracing::info!(exchange = %self.exchange, "Connected to history broker");
        Ok(Session {
            _connection: connection,
            channel,
        })
    }

    async fn send(&self, record: &HistoryRecord) -> Result<(), PublishError> {
        let (payload, properties) = delivery(record)?;

        let mut session = self.session.lock().await;
        let stale = session
            .as_ref()
            .map_or(true, |s| !s.channel.status().connected());
        if stale {
            *session = Some(self.connect().await?);
        }
        let Some(active) = session.as_ref() else {
            return Err(PublishError::Unavailable);
        };

        let result = async {
            active
                .channel
                .basic_publish(
                    &self.exchange,
                    &self.routing_key,
                    BasicPublishOptions::default(),
                    &payload,
                    properties,
                )
                .await?
                .await?;
            Ok::<_, lapin::Error>(())
        }
        .await;

        if result.is_err() {
            *session = None;
        }
        result.map_err(PublishError::from)
    }
}

/// Message body and properties for one record
fn delivery(record: &HistoryRecord) -> Result<(Vec<u8>, BasicProperties), PublishError> {
    let payload = serde_json::to_vec(record)?;
    let properties = BasicProperties::default()
        .with_content_type(CONTENT_TYPE.into())
        .with_delivery_mode(PERSISTENT);
    Ok((payload, properties))
}

#[async_trait]
impl HistoryPublisher for AmqpHistoryPublisher {
    fn name(&self) -> &str {
        "amqp"
    }

    async fn publish(&self, record: &HistoryRecord) -> Result<(), PublishError> {
        tokio::time::timeout(self.timeout, self.send(record))
            .await
            .map_err(|_| PublishError::Timeout)?
    }
}
