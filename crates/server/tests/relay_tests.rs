//! End-to-end tests for the relay core: presence, room fan-out, direct
//! delivery, and call signaling wired together over a real store.

use relay::auth::AuthManager;
use relay::error::RelayError;
use relay::models::MessageKind;
use relay::relay::events::ServerEvent;
use relay::relay::{
    direct_room_id, CallSignalRelay, ConnectionHandle, MessageRouter, PresenceTable,
    RoomMembership, SendTarget, SignalKind,
};
use relay::store::{DurableStore, SqliteStore};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Fixture {
    presence: Arc<PresenceTable>,
    rooms: Arc<RoomMembership>,
    router: MessageRouter,
    signaling: CallSignalRelay,
    store: Arc<SqliteStore>,
}

async fn fixture() -> Fixture {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    // users table backs reaction summaries
    AuthManager::new(pool.clone()).await.unwrap();
    let store = Arc::new(SqliteStore::new(pool).await.unwrap());
    let presence = Arc::new(PresenceTable::new());
    let rooms = Arc::new(RoomMembership::new());
    let router = MessageRouter::new(store.clone(), presence.clone(), rooms.clone());
    let signaling = CallSignalRelay::new(presence.clone());
    Fixture {
        presence,
        rooms,
        router,
        signaling,
        store,
    }
}

fn connect(user: &str) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
    let (tx, rx) = mpsc::channel(64);
    (ConnectionHandle::new(user, tx), rx)
}

fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn count_received(events: &[ServerEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ServerEvent::MessageReceived { .. }))
        .count()
}

#[tokio::test]
async fn room_send_delivers_exactly_once_per_connection() {
    let fx = fixture().await;
    let (a, mut a_rx) = connect("alice");
    let (b1, mut b1_rx) = connect("bob");
    let (b2, mut b2_rx) = connect("bob");
    for h in [&a, &b1, &b2] {
        fx.presence.register(h);
    }
    for h in [&a, &b1, &b2] {
        fx.rooms.join(h, "general");
    }
    for rx in [&mut a_rx, &mut b1_rx, &mut b2_rx] {
        drain(rx);
    }

    fx.router
        .send_chat(
            "alice",
            SendTarget::Channel("general".to_string()),
            Some("hello room".to_string()),
            None,
        )
        .await
        .unwrap();

    // sender's connection is included in chat delivery, each device once
    assert_eq!(count_received(&drain(&mut a_rx)), 1);
    assert_eq!(count_received(&drain(&mut b1_rx)), 1);
    assert_eq!(count_received(&drain(&mut b2_rx)), 1);
}

#[tokio::test]
async fn direct_send_reaches_recipient_not_joined_exactly_once() {
    let fx = fixture().await;
    let (a, mut a_rx) = connect("alice");
    let (b_joined, mut b_joined_rx) = connect("bob");
    let (b_idle, mut b_idle_rx) = connect("bob");
    for h in [&a, &b_joined, &b_idle] {
        fx.presence.register(h);
    }
    let dm = direct_room_id("alice", "bob");
    fx.rooms.join(&a, &dm);
    fx.rooms.join(&b_joined, &dm);
    // b_idle never joined the DM room
    for rx in [&mut a_rx, &mut b_joined_rx, &mut b_idle_rx] {
        drain(rx);
    }

    let msg = fx
        .router
        .send_chat(
            "alice",
            SendTarget::Direct("bob".to_string()),
            Some("hi".to_string()),
            None,
        )
        .await
        .unwrap();

    assert_eq!(count_received(&drain(&mut b_joined_rx)), 1);
    assert_eq!(count_received(&drain(&mut b_idle_rx)), 1);
    assert_eq!(count_received(&drain(&mut a_rx)), 1);

    // delivered flag set at persistence time because bob was online
    assert_eq!(msg.delivered_to, vec!["bob"]);
    let stored = fx.store.message(&msg.id).await.unwrap().unwrap();
    assert_eq!(stored.delivered_to, vec!["bob"]);
    assert_eq!(stored.room_id, dm);
}

#[tokio::test]
async fn direct_send_to_offline_recipient_is_not_marked_delivered() {
    let fx = fixture().await;

    let msg = fx
        .router
        .send_chat(
            "alice",
            SendTarget::Direct("bob".to_string()),
            Some("hi".to_string()),
            None,
        )
        .await
        .unwrap();

    assert!(msg.delivered_to.is_empty());
    // history retrieval still finds it
    let history = fx
        .store
        .messages_in_room(&direct_room_id("alice", "bob"))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn typing_excludes_sending_connection_but_not_other_devices() {
    let fx = fixture().await;
    let (a1, mut a1_rx) = connect("alice");
    let (a2, mut a2_rx) = connect("alice");
    let (b, mut b_rx) = connect("bob");
    for h in [&a1, &a2, &b] {
        fx.presence.register(h);
        fx.rooms.join(h, "general");
    }
    for rx in [&mut a1_rx, &mut a2_rx, &mut b_rx] {
        drain(rx);
    }

    fx.router.typing("general", "alice", a1.id, false);

    assert!(drain(&mut a1_rx).is_empty());
    assert!(matches!(
        drain(&mut a2_rx).as_slice(),
        [ServerEvent::Typing { .. }]
    ));
    assert!(matches!(
        drain(&mut b_rx).as_slice(),
        [ServerEvent::Typing { .. }]
    ));
}

#[tokio::test]
async fn forbidden_edit_leaves_store_unchanged() {
    let fx = fixture().await;
    let msg = fx
        .router
        .send_chat(
            "alice",
            SendTarget::Channel("general".to_string()),
            Some("original".to_string()),
            None,
        )
        .await
        .unwrap();

    let err = fx.router.edit("mallory", &msg.id, "tampered").await.unwrap_err();
    assert!(matches!(err, RelayError::Forbidden));

    let stored = fx.store.message(&msg.id).await.unwrap().unwrap();
    assert!(!stored.edited);
    match stored.kind {
        MessageKind::Text { content } => assert_eq!(content, "original"),
        other => panic!("unexpected kind: {:?}", other),
    }
}

#[tokio::test]
async fn delete_broadcasts_flagged_message_not_tombstone() {
    let fx = fixture().await;
    let (b, mut b_rx) = connect("bob");
    fx.presence.register(&b);
    fx.rooms.join(&b, "general");

    let msg = fx
        .router
        .send_chat(
            "alice",
            SendTarget::Channel("general".to_string()),
            Some("delete me".to_string()),
            None,
        )
        .await
        .unwrap();
    drain(&mut b_rx);

    fx.router.delete("alice", &msg.id).await.unwrap();

    match drain(&mut b_rx).as_slice() {
        [ServerEvent::MessageDeleted { message }] => {
            assert!(message.deleted);
            assert_eq!(message.id, msg.id);
        }
        other => panic!("unexpected events: {:?}", other),
    }

    // reactions stay permitted on soft-deleted messages
    let updated = fx.router.react("bob", &msg.id, "👀").await.unwrap();
    assert_eq!(updated.reactions.len(), 1);
}

#[tokio::test]
async fn signaling_to_offline_peer_errors_without_broadcast() {
    let fx = fixture().await;
    let (a, mut a_rx) = connect("alice");
    let (b, mut b_rx) = connect("bob");
    fx.presence.register(&a);
    fx.presence.register(&b);
    drain(&mut a_rx);
    drain(&mut b_rx);

    let err = fx
        .signaling
        .forward("alice", SignalKind::Request, "carol", serde_json::json!({}))
        .unwrap_err();
    assert!(matches!(err, RelayError::PeerOffline));
    assert_eq!(err.to_string(), "User is offline");

    // nothing was forwarded to anyone
    assert!(drain(&mut a_rx).is_empty());
    assert!(drain(&mut b_rx).is_empty());
}

#[tokio::test]
async fn disconnect_emits_peer_left_to_joined_rooms() {
    let fx = fixture().await;
    let (a, _a_rx) = connect("alice");
    let (b, mut b_rx) = connect("bob");
    fx.presence.register(&a);
    fx.presence.register(&b);
    fx.rooms.join(&a, "general");
    fx.rooms.join(&b, "general");
    drain(&mut b_rx);

    // what the connection loop does on close
    fx.presence.unregister("alice", a.id);
    for room_id in fx.rooms.drop_connection(a.id) {
        fx.rooms.broadcast(
            &room_id,
            ServerEvent::PeerLeft {
                room_id: room_id.clone(),
                user_id: "alice".to_string(),
            },
            None,
        );
    }

    let events = drain(&mut b_rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::UserStatus { .. })));
    assert!(events.iter().any(
        |e| matches!(e, ServerEvent::PeerLeft { room_id, user_id } if room_id == "general" && user_id == "alice")
    ));
}

#[tokio::test]
async fn reaction_broadcast_resolves_user_summaries() {
    let fx = fixture().await;
    let (b, mut b_rx) = connect("bob-id");
    fx.presence.register(&b);
    fx.rooms.join(&b, "general");

    let msg = fx
        .router
        .send_chat(
            "alice-id",
            SendTarget::Channel("general".to_string()),
            Some("react to me".to_string()),
            None,
        )
        .await
        .unwrap();
    drain(&mut b_rx);

    fx.router.react("bob-id", &msg.id, "🎉").await.unwrap();

    match drain(&mut b_rx).as_slice() {
        [ServerEvent::MessageReaction { message, reactions }] => {
            assert_eq!(message.reactions.len(), 1);
            assert_eq!(reactions.len(), 1);
            assert_eq!(reactions[0].emoji, "🎉");
            // no user row, falls back to the raw id
            assert_eq!(reactions[0].user.id, "bob-id");
        }
        other => panic!("unexpected events: {:?}", other),
    }
}
