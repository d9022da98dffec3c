//! Room registry: maps room ids to their connected members and performs
//! the join/broadcast/leave fanout.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

use huddle_protocol::ServerEvent;

/// Monotonically increasing connection identity.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one connection. Two connections are never equal by value,
/// only by id: structurally identical frames from different peers must
/// stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl ConnId {
    pub fn next() -> Self {
        Self(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Serialized frames queued for one connection's writer.
pub type OutboundTx = mpsc::Sender<String>;

struct Room {
    members: HashMap<ConnId, OutboundTx>,
}

impl Room {
    fn new() -> Self {
        Self {
            members: HashMap::new(),
        }
    }

    /// Queue `frame` on every open member except `skip`.
    fn fan_out(&self, skip: ConnId, frame: &str) {
        for (id, tx) in &self.members {
            if *id == skip {
                continue;
            }
            send_if_open(*id, tx, frame);
        }
    }
}

/// Thread-safe room registry. Clone handles freely; all of them share the
/// same room table. Membership mutations run under the write lock, and
/// fanout enqueues without awaiting, so a room's membership never changes
/// mid-fanout.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add `conn` to `room_id`, creating the room if needed. Once the room
    /// has a second member, every pre-existing open member is told the call
    /// can start; the joiner itself is never notified.
    pub async fn join(&self, room_id: &str, conn: ConnId, tx: OutboundTx) {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        room.members.insert(conn, tx);
        let members = room.members.len();
        if members >= 2 {
            room.fan_out(conn, &ServerEvent::ReadyToCall.to_json());
        }
        tracing::info!(room = %room_id, conn = %conn, members, "member joined");
    }

    /// Forward `payload`, re-serialized with all fields intact, to every
    /// open member of `room_id` except `sender`. Unknown rooms are a no-op;
    /// the sender may be stale or the room already closed.
    pub async fn broadcast(&self, room_id: &str, sender: ConnId, payload: &Value) {
        let rooms = self.rooms.read().await;
        match rooms.get(room_id) {
            Some(room) => room.fan_out(sender, &payload.to_string()),
            None => tracing::debug!(room = %room_id, "dropping frame for unknown room"),
        }
    }

    /// Remove `conn` from `room_id`. The room is deleted the instant it
    /// empties; otherwise the survivors are told someone left.
    pub async fn leave(&self, room_id: &str, conn: ConnId) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        room.members.remove(&conn);
        let remaining = room.members.len();
        if remaining == 0 {
            rooms.remove(room_id);
            tracing::info!(room = %room_id, conn = %conn, "member left, room closed");
        } else {
            room.fan_out(conn, &ServerEvent::UserLeft.to_json());
            tracing::info!(room = %room_id, conn = %conn, remaining, "member left");
        }
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Number of members in `room_id`, if it exists.
    pub async fn member_count(&self, room_id: &str) -> Option<usize> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|room| room.members.len())
    }
}

fn send_if_open(conn: ConnId, tx: &OutboundTx, frame: &str) {
    if tx.is_closed() {
        tracing::debug!(conn = %conn, "skipping closed connection");
        return;
    }
    if let Err(e) = tx.try_send(frame.to_string()) {
        tracing::warn!(conn = %conn, error = %e, "dropping undeliverable frame");
    }
}
