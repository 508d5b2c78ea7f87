//! WebSocket Handler
//!
//! Validates the connect parameters, upgrades the HTTP connection and hands
//! the socket to the [`BroadcastHub`](super::BroadcastHub).

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{
    stream::{SplitSink, Stream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::connection::{CloseSignal, Connection, TransportError, WriteError};
use crate::api::{ApiError, AppState};

/// Upper bound on sending the close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Query parameters of `GET /ws`
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "roomId", default)]
    pub room_id: String,
    #[serde(default)]
    pub authorization: String,
}

impl ConnectParams {
    fn validate(&self) -> Result<(), ApiError> {
        if self.room_id.is_empty() {
            return Err(ApiError::Validation("roomId is required".to_string()));
        }
        if self.authorization.is_empty() {
            return Err(ApiError::Validation("authorization is required".to_string()));
        }
        Ok(())
    }
}

/// WebSocket upgrade handler
///
/// Missing `roomId` or `authorization` fails with 400 before upgrading,
/// and every upgrade fails with 503 once the hub is shutting down.
/// Authorization itself happens after the upgrade, so a rejected client
/// receives an error frame rather than an HTTP status.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(e) = params.validate() {
        return e.into_response();
    }
    if state.hub.is_shutting_down() {
        return ApiError::ServiceUnavailable("server is shutting down".to_string()).into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| async move {
        let (conn, inbound) = WsConnection::split(socket);
        let conn: Arc<dyn Connection> = conn;
        let _ = hub
            .run(conn, inbound, params.room_id, params.authorization)
            .await;
    })
}

type Inbound = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Write half of an upgraded WebSocket
pub struct WsConnection {
    id: String,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    closed: CloseSignal,
}

impl WsConnection {
    /// Split a socket into a connection handle and its inbound text frames
    pub fn split(socket: WebSocket) -> (Arc<Self>, Inbound) {
        let (sink, stream) = socket.split();

        let conn = Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            sink: Mutex::new(sink),
            closed: CloseSignal::new(),
        });

        let inbound = stream.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(_)) => Some(Err(TransportError::PeerClosed)),
                // Ping/pong is answered by axum; binary frames are ignored.
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Receive(e.to_string()))),
            }
        });

        (conn, Box::pin(inbound))
    }
}

#[async_trait]
impl Connection for WsConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, text: &str) -> Result<(), WriteError> {
        if self.closed.is_fired() {
            return Err(WriteError::Closed);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| WriteError::Transport(e.to_string()))
    }

    async fn close(&self) {
        if !self.closed.fire() {
            return;
        }

        let mut sink = self.sink.lock().await;
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        })
        .await;
        tracing::debug!(connection_id = %self.id, "WebSocket closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.is_fired()
    }

    async fn closed(&self) {
        self.closed.wait().await
    }
}
