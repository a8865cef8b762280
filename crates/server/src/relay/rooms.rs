//! Room Membership
//!
//! Maps room ids (channel ids or canonical direct-conversation ids) to the
//! connections currently joined. Membership is connection-scoped: a user's
//! second device only receives room broadcasts if that device joined. There
//! is no leave operation; memberships persist until the connection closes.

use super::connection::ConnectionHandle;
use super::events::ServerEvent;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Canonical room id for a two-party direct conversation. Both participants
/// resolve to the same id regardless of who initiates.
pub fn direct_room_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("dm:{}:{}", a, b)
    } else {
        format!("dm:{}:{}", b, a)
    }
}

#[derive(Default)]
pub struct RoomMembership {
    rooms: RwLock<HashMap<String, HashMap<Uuid, ConnectionHandle>>>,
    /// Reverse mapping used to drop all memberships on disconnect.
    joined: RwLock<HashMap<Uuid, HashSet<String>>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent add.
    pub fn join(&self, handle: &ConnectionHandle, room_id: &str) {
        self.rooms
            .write()
            .entry(room_id.to_string())
            .or_default()
            .insert(handle.id, handle.clone());
        self.joined
            .write()
            .entry(handle.id)
            .or_default()
            .insert(room_id.to_string());
    }

    /// Snapshot of the connections currently joined to a room.
    pub fn members_of(&self, room_id: &str) -> Vec<ConnectionHandle> {
        self.rooms
            .read()
            .get(room_id)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Delivers an event to every member of a room, minus the optional
    /// excluded connection (typing indicators are not echoed to the sender).
    pub fn broadcast(&self, room_id: &str, event: ServerEvent, exclude: Option<Uuid>) {
        let rooms = self.rooms.read();
        let Some(members) = rooms.get(room_id) else {
            return;
        };
        for handle in members.values() {
            if Some(handle.id) == exclude {
                continue;
            }
            handle.send(event.clone());
        }
    }

    /// Drops every membership held by a connection and returns the rooms it
    /// was joined to, so the caller can emit peer-left notifications.
    pub fn drop_connection(&self, connection_id: Uuid) -> Vec<String> {
        let Some(room_ids) = self.joined.write().remove(&connection_id) else {
            return Vec::new();
        };
        let mut rooms = self.rooms.write();
        for room_id in &room_ids {
            if let Some(members) = rooms.get_mut(room_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    rooms.remove(room_id);
                }
            }
        }
        room_ids.into_iter().collect()
    }
}
