//! Rooms
//!
//! A room owns the member set for one room id. Membership changes and
//! fan-out for a room are serialized by the room's own lock; unrelated
//! rooms never contend with each other.
//!
//! A room whose member set becomes empty is *retired* in the same locked
//! step. A retired room never accepts members again, which lets the
//! registry replace or drop it without holding a room lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use super::connection::{Connection, ConnectionId, WriteError};

/// Caller-supplied room identifier (case-sensitive, unconstrained)
pub type RoomId = String;

/// A named set of connections that receive each other's messages
pub struct Room {
    id: RoomId,
    /// Non-owning references; the serving worker owns each connection
    members: Mutex<HashMap<ConnectionId, Weak<dyn Connection>>>,
    /// Only ever set while `members` is locked
    retired: AtomicBool,
    /// Upper bound on a single member write during fan-out
    send_timeout: Duration,
}

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members the payload was written to
    pub delivered: usize,
    /// Members removed because their write failed
    pub evicted: Vec<ConnectionId>,
    /// Members left after the pass
    pub remaining: usize,
}

/// The room emptied out and can no longer be joined
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Room {0} is retired")]
pub struct RoomRetired(pub RoomId);

impl Room {
    pub(crate) fn new(id: impl Into<RoomId>, send_timeout: Duration) -> Self {
        Self {
            id: id.into(),
            members: Mutex::new(HashMap::new()),
            retired: AtomicBool::new(false),
            send_timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the room emptied out. Once true, stays true.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Add a member, returning the new member count
    pub async fn join(&self, conn: &Arc<dyn Connection>) -> Result<usize, RoomRetired> {
        let mut members = self.members.lock().await;
        if self.is_retired() {
            return Err(RoomRetired(self.id.clone()));
        }

        members.insert(conn.id().to_string(), Arc::downgrade(conn));

        tracing::debug!(
            room_id = %self.id,
            connection_id = %conn.id(),
            members = members.len(),
            "Joined room"
        );
        Ok(members.len())
    }

    /// Remove a member, returning the remaining member count.
    ///
    /// Does not close the connection; the caller owns it.
    pub async fn leave(&self, conn_id: &str) -> usize {
        let mut members = self.members.lock().await;
        let removed = members.remove(conn_id).is_some();
        if members.is_empty() {
            self.retire();
        }

        if removed {
            tracing::debug!(
                room_id = %self.id,
                connection_id = %conn_id,
                members = members.len(),
                "Left room"
            );
        }
        members.len()
    }

    /// Write `text` to every member.
    ///
    /// Members whose write fails or times out, or whose connection is gone,
    /// are closed and removed in the same locked pass. Each member gets at
    /// most one write attempt per call.
    pub async fn broadcast(&self, text: &str) -> BroadcastReport {
        let mut members = self.members.lock().await;
        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();

        for (id, member) in members.iter() {
            let Some(conn) = member.upgrade() else {
                tracing::debug!(room_id = %self.id, connection_id = %id, "Dropped member");
                failed.push((id.clone(), None));
                continue;
            };

            if conn.is_closed() {
                failed.push((id.clone(), Some(conn)));
                continue;
            }

            let result = match tokio::time::timeout(self.send_timeout, conn.send(text)).await {
                Ok(result) => result,
                Err(_) => Err(WriteError::Timeout(self.send_timeout)),
            };

            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        room_id = %self.id,
                        connection_id = %id,
                        error = %e,
                        "Broadcast write failed, evicting member"
                    );
                    failed.push((id.clone(), Some(conn)));
                }
            }
        }

        for (id, conn) in failed {
            if let Some(conn) = conn {
                conn.close().await;
            }
            members.remove(&id);
            report.evicted.push(id);
        }

        if members.is_empty() {
            self.retire();
        }
        report.remaining = members.len();

        tracing::trace!(
            room_id = %self.id,
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "Broadcast complete"
        );
        report
    }

    /// Current member count
    pub async fn member_count(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Whether a connection is currently a member
    pub async fn contains(&self, conn_id: &str) -> bool {
        self.members.lock().await.contains_key(conn_id)
    }

    fn retire(&self) {
        if !self.retired.swap(true, Ordering::AcqRel) {
            tracing::debug!(room_id = %self.id, "Room retired");
        }
    }
}
