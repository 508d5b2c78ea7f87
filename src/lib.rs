//! # Roomcast
//!
//! Real-time room broadcasting over WebSocket. Clients join a named room
//! with a bearer credential; every message a member sends is validated
//! against the identity backend, recorded to message history and relayed
//! to everyone in the room.
//!
//! ## Modules
//!
//! - [`websocket`]: Room registry, rooms, broadcast hub and socket handler
//! - [`identity`]: Credential validation against the identity backend
//! - [`history`]: Append-only message history publishing
//! - [`api`]: HTTP server with Axum
//! - [`config`]: File and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomcast::history::{HistorySink, NoopHistoryPublisher};
//! use roomcast::identity::{Identity, StaticIdentityValidator};
//! use roomcast::websocket::{BroadcastHub, HubConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let validator = StaticIdentityValidator::new()
//!         .with_token("secret", Identity::new(1, "a@x.com"));
//!     let (history, _) = HistorySink::spawn(Arc::new(NoopHistoryPublisher), 1024);
//!     let hub = Arc::new(BroadcastHub::new(HubConfig::default(), Arc::new(validator), history));
//!
//!     let state = roomcast::AppState::new(hub);
//!     roomcast::serve(state, &roomcast::config::ServerConfig::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod history;
pub mod identity;
pub mod websocket;

#[cfg(test)]
mod testing;

pub use api::{build_router, serve, serve_on, ApiError, AppState};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig};

pub use history::{HistoryPublisher, HistoryRecord, HistorySink, PublishError};

pub use identity::{AuthError, HttpIdentityValidator, Identity, IdentityValidator};

pub use websocket::{
    BroadcastHub, BroadcastReport, Connection, HubConfig, HubStats, Room, RoomRegistry,
    websocket_handler,
};
