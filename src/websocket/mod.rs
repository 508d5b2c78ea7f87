//! WebSocket Room Broadcasting
//!
//! Clients connect to `/ws?roomId=...&authorization=...`, are authorized
//! against the identity backend and join the named room. Every message a
//! member sends is re-authorized, recorded to history and fanned out to
//! all members of the room, the sender included.
//!
//! ## Architecture
//!
//! - **RoomRegistry**: Maps room ids to live rooms, creating them on first
//!   join and removing them once empty
//! - **Room**: Member set plus fan-out with per-member send timeout
//! - **BroadcastHub**: Per-connection lifecycle and relay loop
//! - **Handler**: WebSocket upgrade and socket adaptation
//! - **Messages**: Inbound, outbound and rejection frame formats
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8080/ws?roomId=r1&authorization=TOKEN');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({message: 'hi', authorization: 'TOKEN'}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data); // {email, message}
//!   console.log(msg.email, msg.message);
//! };
//! ```

mod connection;
mod handler;
mod hub;
mod messages;
mod registry;
mod room;

pub use connection::{CloseSignal, Connection, ConnectionId, TransportError, WriteError};
pub use handler::{websocket_handler, ConnectParams, WsConnection};
pub use hub::{BroadcastHub, ConnectionState, HubConfig, HubStats};
pub use messages::{DecodeError, InboundPayload, OutboundPayload, Rejection};
pub use registry::RoomRegistry;
pub use room::{BroadcastReport, Room, RoomId, RoomRetired};
