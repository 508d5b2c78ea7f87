//! Broadcast Hub
//!
//! Drives one connection through its lifecycle:
//!
//! ```text
//! Connecting -> Authorizing -> Joined -> Relaying -> Leaving -> Closed
//!                    |
//!                    +-> Closed (rejected, never joined)
//! ```
//!
//! Each connection runs on its own task. While relaying, the task waits
//! on the next inbound frame, on its connection being closed (for example
//! by eviction), or on hub shutdown.

use futures_util::{Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::connection::{Connection, TransportError};
use super::messages::{InboundPayload, OutboundPayload, Rejection};
use super::registry::RoomRegistry;
use super::room::Room;
use crate::history::{HistoryRecord, HistorySink};
use crate::identity::{AuthError, Identity, IdentityValidator};

/// Configuration for the broadcast hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Upper bound on a single member write during fan-out
    pub send_timeout: Duration,
    /// Upper bound on a single identity validation
    pub auth_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            auth_timeout: Duration::from_secs(6),
        }
    }
}

/// Lifecycle state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authorizing,
    Joined,
    Relaying,
    Leaving,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authorizing => "authorizing",
            ConnectionState::Joined => "joined",
            ConnectionState::Relaying => "relaying",
            ConnectionState::Leaving => "leaving",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Point-in-time hub counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub rooms: usize,
    pub connections: usize,
}

/// Relays messages between the members of each room
pub struct BroadcastHub {
    registry: Arc<RoomRegistry>,
    validator: Arc<dyn IdentityValidator>,
    history: HistorySink,
    config: HubConfig,
    shutdown: watch::Sender<bool>,
}

impl BroadcastHub {
    pub fn new(
        config: HubConfig,
        validator: Arc<dyn IdentityValidator>,
        history: HistorySink,
    ) -> Self {
        let registry = Arc::new(RoomRegistry::new(config.send_timeout));
        Self::with_registry(config, registry, validator, history)
    }

    /// Create a hub over an existing registry
    pub fn with_registry(
        config: HubConfig,
        registry: Arc<RoomRegistry>,
        validator: Arc<dyn IdentityValidator>,
        history: HistorySink,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            validator,
            history,
            config,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Validate a credential within the configured timeout
    pub async fn authorize(&self, credential: &str) -> Result<Identity, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let identity = tokio::time::timeout(
            self.config.auth_timeout,
            self.validator.validate(credential),
        )
        .await
        .map_err(|_| AuthError::Timeout)??;

        if identity.is_empty() {
            return Err(AuthError::EmptyIdentity);
        }
        Ok(identity)
    }

    /// Serve one connection until it leaves.
    ///
    /// `inbound` yields the connection's text frames; it ending or yielding
    /// an error ends the session. Returns the authorization error if the
    /// connection was rejected before joining.
    pub async fn run<S>(
        &self,
        conn: Arc<dyn Connection>,
        mut inbound: S,
        room_id: String,
        credential: String,
    ) -> Result<(), AuthError>
    where
        S: Stream<Item = Result<String, TransportError>> + Unpin + Send,
    {
        let conn_id = conn.id().to_string();
        let mut state = ConnectionState::Connecting;
        transition(&conn_id, &room_id, &mut state, ConnectionState::Authorizing);

        let identity = match self.authorize(&credential).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(
                    connection_id = %conn_id,
                    room_id = %room_id,
                    error = %e,
                    "Connection rejected"
                );
                let rejection = Rejection::new(e.to_string()).encode();
                let _ = tokio::time::timeout(self.config.send_timeout, conn.send(&rejection)).await;
                conn.close().await;
                transition(&conn_id, &room_id, &mut state, ConnectionState::Closed);
                return Err(e);
            }
        };

        let room = self.registry.join(&room_id, &conn).await;
        transition(&conn_id, &room_id, &mut state, ConnectionState::Joined);
        tracing::info!(
            connection_id = %conn_id,
            room_id = %room_id,
            email = %identity.email,
            "Client joined room"
        );

        transition(&conn_id, &room_id, &mut state, ConnectionState::Relaying);
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let frame = tokio::select! {
                frame = inbound.next() => frame,
                _ = conn.closed() => {
                    tracing::debug!(connection_id = %conn_id, "Connection closed while relaying");
                    break;
                }
                _ = shutdown.wait_for(|stop| *stop) => {
                    tracing::debug!(connection_id = %conn_id, "Hub shutting down");
                    break;
                }
            };

            match frame {
                Some(Ok(text)) => {
                    if !self.relay(&room, &conn_id, &text).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %conn_id, error = %e, "Inbound read ended");
                    break;
                }
                None => break,
            }
        }

        transition(&conn_id, &room_id, &mut state, ConnectionState::Leaving);
        if room.leave(&conn_id).await == 0 {
            self.registry.remove_if_empty(&room).await;
        }
        conn.close().await;
        transition(&conn_id, &room_id, &mut state, ConnectionState::Closed);
        tracing::info!(connection_id = %conn_id, room_id = %room_id, "Client left room");

        Ok(())
    }

    /// Handle one inbound frame. Returns false if the sender was evicted
    /// during fan-out and should stop relaying.
    async fn relay(&self, room: &Arc<Room>, conn_id: &str, text: &str) -> bool {
        let payload = match InboundPayload::decode(text) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(connection_id = %conn_id, error = %e, "Discarding malformed message");
                return true;
            }
        };

        let identity = match self.authorize(&payload.authorization).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(connection_id = %conn_id, error = %e, "Discarding unauthorized message");
                return true;
            }
        };

        let outbound = match OutboundPayload::new(&identity.email, &payload.message).encode() {
            Ok(outbound) => outbound,
            Err(e) => {
                tracing::error!(connection_id = %conn_id, error = %e, "Failed to encode broadcast");
                return true;
            }
        };

        self.history
            .submit(HistoryRecord::new(room.id(), &identity.email, payload.message));

        let report = room.broadcast(&outbound).await;
        if report.remaining == 0 {
            self.registry.remove_if_empty(room).await;
        }

        !report.evicted.iter().any(|id| id == conn_id)
    }

    /// Ask every relaying connection to leave and close
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            rooms: self.registry.room_count().await,
            connections: self.registry.member_count().await,
        }
    }
}

fn transition(conn_id: &str, room_id: &str, state: &mut ConnectionState, next: ConnectionState) {
    tracing::trace!(
        connection_id = %conn_id,
        room_id = %room_id,
        from = %state,
        to = %next,
        "Connection state"
    );
    *state = next;
}
