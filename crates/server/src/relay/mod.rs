//! The real-time core: presence tracking, room membership, message routing,
//! and call signaling over long-lived WebSocket connections.

pub mod connection;
pub mod events;
pub mod presence;
pub mod rooms;
pub mod router;
pub mod signaling;

pub use connection::{ws_handler, ConnectionHandle};
pub use presence::PresenceTable;
pub use rooms::{direct_room_id, RoomMembership};
pub use router::{MessageRouter, SendTarget};
pub use signaling::{CallSignalRelay, SignalKind};
