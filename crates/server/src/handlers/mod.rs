//! REST facade handlers.
//!
//! Thin request/response surface for profile, upload, and channel
//! administration. It talks to the durable store directly and notifies the
//! real-time core through the Presence Table when state changes outside the
//! connection channel.

pub mod auth;
pub mod channels;
pub mod messages;
pub mod uploads;

// Auth handlers
pub use auth::{list_users, login, logout, me, signup};

// Channel administration
pub use channels::{create_channel, delete_channel, list_channels};

// History retrieval
pub use messages::room_history;

// Uploads
pub use uploads::{download, upload};
