//! WebSocket surface.
//!
//! Connected clients get a `state_changed` message after every change to the
//! quote collection or the sync status, and can trigger or cancel rounds.

mod connection;
mod protocol;

pub use connection::handle_connection;
pub use protocol::*;
