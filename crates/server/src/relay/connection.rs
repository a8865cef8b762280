//! WebSocket connection lifecycle.
//!
//! A client authenticates once at upgrade time; the connection is then bound
//! to that user id for its lifetime. Inbound events are processed in arrival
//! order by a single dispatch loop; outbound events flow through a bounded
//! mpsc channel drained by a writer task, so a slow persistence call on one
//! connection never blocks delivery to others.

use super::events::{ClientEvent, ServerEvent};
use super::router::SendTarget;
use super::signaling::SignalKind;
use crate::auth::UserInfo;
use crate::config::AppState;
use crate::error::RelayError;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outbound queue depth per connection. A consumer that falls this far
/// behind starts losing events rather than stalling the relay.
const OUTBOUND_BUFFER: usize = 64;

/// One live bidirectional channel, bound to exactly one user at handshake.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: String,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(user_id: impl Into<String>, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            tx,
        }
    }

    /// Queues an event for this connection. Never blocks; a full queue drops
    /// the event with a warning.
    pub fn send(&self, event: ServerEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!(
                "dropping event for slow consumer {} ({}): {}",
                self.user_id, self.id, e
            );
        }
    }
}

#[cfg(test)]
pub fn test_handle(user_id: &str) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
    let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
    (ConnectionHandle::new(user_id, tx), rx)
}

#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    pub token: String,
}

/// `GET /ws?token=...` — verifies the bearer credential before upgrading;
/// a failed verification is terminal for the connection.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.auth.validate_session(&params.token).await {
        Ok(user) => {
            info!("websocket auth success for {}", user.username);
            ws.on_upgrade(move |socket| handle_socket(socket, state, user))
        }
        Err(e) => {
            warn!("websocket auth failed: {}", e);
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user: UserInfo) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel(OUTBOUND_BUFFER);
    let handle = ConnectionHandle::new(user.id.clone(), tx);

    state.presence.register(&handle);

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("failed to serialize outbound event: {}", e);
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if let Err(err) = dispatch(&state, &handle, event).await {
                        if let RelayError::Store(ref cause) = err {
                            error!("store failure for {}: {:#}", handle.user_id, cause);
                        }
                        // errors go back to the originating connection only
                        handle.send(ServerEvent::Error {
                            message: err.to_string(),
                        });
                    }
                }
                Err(e) => {
                    handle.send(ServerEvent::Error {
                        message: format!("Unrecognized event: {}", e),
                    });
                }
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    // Teardown: no further events are routed to this connection; any
    // persistence it triggered completes fire-and-forget.
    state.presence.unregister(&handle.user_id, handle.id);
    for room_id in state.rooms.drop_connection(handle.id) {
        state.rooms.broadcast(
            &room_id,
            ServerEvent::PeerLeft {
                room_id: room_id.clone(),
                user_id: handle.user_id.clone(),
            },
            None,
        );
    }
    writer.abort();

    info!("connection {} for {} closed", handle.id, handle.user_id);
}

async fn dispatch(
    state: &AppState,
    handle: &ConnectionHandle,
    event: ClientEvent,
) -> Result<(), RelayError> {
    match event {
        ClientEvent::JoinRoom { room_id } => {
            state.rooms.join(handle, &room_id);
            Ok(())
        }
        ClientEvent::ChatMessage {
            room_id,
            recipient,
            content,
            image_url,
        } => {
            let target = resolve_target(room_id, recipient)?;
            state
                .router
                .send_chat(&handle.user_id, target, content, image_url)
                .await
                .map(|_| ())
        }
        ClientEvent::FileMessage {
            room_id,
            recipient,
            file_url,
            file_name,
            file_size,
            file_type,
        } => {
            let target = resolve_target(room_id, recipient)?;
            state
                .router
                .send_file(
                    &handle.user_id,
                    target,
                    file_url,
                    file_name,
                    file_size,
                    file_type,
                )
                .await
                .map(|_| ())
        }
        ClientEvent::Typing { room_id } => {
            state.router.typing(&room_id, &handle.user_id, handle.id, false);
            Ok(())
        }
        ClientEvent::StopTyping { room_id } => {
            state.router.typing(&room_id, &handle.user_id, handle.id, true);
            Ok(())
        }
        ClientEvent::EditMessage {
            message_id,
            content,
        } => state
            .router
            .edit(&handle.user_id, &message_id, &content)
            .await
            .map(|_| ()),
        ClientEvent::DeleteMessage { message_id } => state
            .router
            .delete(&handle.user_id, &message_id)
            .await
            .map(|_| ()),
        ClientEvent::MessageRead { message_id } => {
            state.router.mark_read(&handle.user_id, &message_id).await
        }
        ClientEvent::ReactToMessage { message_id, emoji } => state
            .router
            .react(&handle.user_id, &message_id, &emoji)
            .await
            .map(|_| ()),
        ClientEvent::CallRequest { to, data } => {
            state
                .signaling
                .forward(&handle.user_id, SignalKind::Request, &to, data)
        }
        ClientEvent::CallAccept { to, data } => {
            state
                .signaling
                .forward(&handle.user_id, SignalKind::Accept, &to, data)
        }
        ClientEvent::CallReject { to, data } => {
            state
                .signaling
                .forward(&handle.user_id, SignalKind::Reject, &to, data)
        }
        ClientEvent::Offer { to, data } => {
            state
                .signaling
                .forward(&handle.user_id, SignalKind::Offer, &to, data)
        }
        ClientEvent::Answer { to, data } => {
            state
                .signaling
                .forward(&handle.user_id, SignalKind::Answer, &to, data)
        }
        ClientEvent::IceCandidate { to, data } => {
            state
                .signaling
                .forward(&handle.user_id, SignalKind::IceCandidate, &to, data)
        }
        ClientEvent::CallEnd { to, data } => {
            state
                .signaling
                .forward(&handle.user_id, SignalKind::End, &to, data)
        }
    }
}

fn resolve_target(
    room_id: Option<String>,
    recipient: Option<String>,
) -> Result<SendTarget, RelayError> {
    match (room_id, recipient) {
        (_, Some(peer)) => Ok(SendTarget::Direct(peer)),
        (Some(room_id), None) => Ok(SendTarget::Channel(room_id)),
        (None, None) => Err(RelayError::Validation(
            "A room or recipient is required".to_string(),
        )),
    }
}
