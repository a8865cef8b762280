//! Presence Table
//!
//! Maps each user id to its set of live connection handles (multi-device) and
//! derives the online set from the keys with a non-empty handle set. Every
//! connect/disconnect edge fires exactly one presence broadcast; there is no
//! batching or debounce.
//!
//! All mutations happen under a single synchronous lock with no await points,
//! so two devices of the same user racing to register/unregister can never
//! leave a torn handle set.

use super::connection::ConnectionHandle;
use super::events::{PresenceFlag, ServerEvent};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

#[derive(Default)]
pub struct PresenceTable {
    inner: RwLock<HashMap<String, HashMap<Uuid, ConnectionHandle>>>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to its user's handle set. The first handle for a
    /// user marks them online and announces it to every other connection.
    /// The registering connection always receives the current online set.
    /// Registering the same connection twice is a no-op after the first.
    pub fn register(&self, handle: &ConnectionHandle) {
        let inner = &mut *self.inner.write();
        let handles = inner.entry(handle.user_id.clone()).or_default();
        if handles.contains_key(&handle.id) {
            return;
        }
        let first = handles.is_empty();
        handles.insert(handle.id, handle.clone());

        if first {
            info!("user {} came online", handle.user_id);
            Self::fan_out(
                inner,
                ServerEvent::UserStatus {
                    user_id: handle.user_id.clone(),
                    status: PresenceFlag::Online,
                },
                Some(handle.id),
            );
        }

        handle.send(ServerEvent::CurrentOnline {
            user_ids: inner.keys().cloned().collect(),
        });
    }

    /// Removes a connection from its user's handle set. Removing the last
    /// handle marks the user offline and announces it. Unregistering an
    /// absent pair is a no-op, not an error.
    pub fn unregister(&self, user_id: &str, connection_id: Uuid) {
        let inner = &mut *self.inner.write();
        let Some(handles) = inner.get_mut(user_id) else {
            return;
        };
        if handles.remove(&connection_id).is_none() {
            return;
        }
        if handles.is_empty() {
            inner.remove(user_id);
            info!("user {} went offline", user_id);
            Self::fan_out(
                inner,
                ServerEvent::UserStatus {
                    user_id: user_id.to_string(),
                    status: PresenceFlag::Offline,
                },
                None,
            );
        }
    }

    /// The (possibly empty) set of live handles for a user. Never blocks on
    /// anything but the map lock.
    pub fn handles_for(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.inner
            .read()
            .get(user_id)
            .map(|handles| handles.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Users with at least one live connection.
    pub fn online_users(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Delivers an event to every live connection, used by the REST facade
    /// for out-of-band notifications (`channelsUpdated`, `usersUpdated`).
    pub fn broadcast_all(&self, event: ServerEvent) {
        Self::fan_out(&self.inner.read(), event, None);
    }

    fn fan_out(
        inner: &HashMap<String, HashMap<Uuid, ConnectionHandle>>,
        event: ServerEvent,
        exclude: Option<Uuid>,
    ) {
        for handles in inner.values() {
            for handle in handles.values() {
                if Some(handle.id) == exclude {
                    continue;
                }
                handle.send(event.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::connection::test_handle;

    #[test]
    fn first_handle_marks_online_and_sends_current_set() {
        let presence = PresenceTable::new();
        let (a, mut a_rx) = test_handle("alice");
        let (b, mut b_rx) = test_handle("bob");

        presence.register(&a);
        match a_rx.try_recv().unwrap() {
            ServerEvent::CurrentOnline { user_ids } => assert_eq!(user_ids, vec!["alice"]),
            other => panic!("unexpected event: {:?}", other),
        }

        presence.register(&b);
        // alice hears bob come online, bob does not hear about himself
        match a_rx.try_recv().unwrap() {
            ServerEvent::UserStatus { user_id, status } => {
                assert_eq!(user_id, "bob");
                assert_eq!(status, PresenceFlag::Online);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match b_rx.try_recv().unwrap() {
            ServerEvent::CurrentOnline { mut user_ids } => {
                user_ids.sort();
                assert_eq!(user_ids, vec!["alice", "bob"]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn register_is_idempotent_per_connection() {
        let presence = PresenceTable::new();
        let (a, mut a_rx) = test_handle("alice");

        presence.register(&a);
        presence.register(&a);

        assert!(matches!(
            a_rx.try_recv().unwrap(),
            ServerEvent::CurrentOnline { .. }
        ));
        // second register produced nothing
        assert!(a_rx.try_recv().is_err());
        assert_eq!(presence.online_users().len(), 1);
    }

    #[test]
    fn last_handle_removal_marks_offline() {
        let presence = PresenceTable::new();
        let (a1, _a1_rx) = test_handle("alice");
        let (a2, _a2_rx) = test_handle("alice");
        let (b, mut b_rx) = test_handle("bob");

        presence.register(&a1);
        presence.register(&a2);
        presence.register(&b);
        while b_rx.try_recv().is_ok() {}

        presence.unregister("alice", a1.id);
        // alice still has one device, no offline edge yet
        assert!(b_rx.try_recv().is_err());
        assert_eq!(presence.handles_for("alice").len(), 1);

        presence.unregister("alice", a2.id);
        match b_rx.try_recv().unwrap() {
            ServerEvent::UserStatus { user_id, status } => {
                assert_eq!(user_id, "alice");
                assert_eq!(status, PresenceFlag::Offline);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(presence.online_users(), vec!["bob"]);
    }

    #[test]
    fn unregister_absent_pair_is_noop() {
        let presence = PresenceTable::new();
        let (a, _rx) = test_handle("alice");

        presence.unregister("alice", a.id);
        presence.register(&a);
        presence.unregister("alice", Uuid::new_v4());
        assert_eq!(presence.online_users(), vec!["alice"]);
    }
}
