//! Realtime projection of threads and vault feeds over WebSocket.

pub mod connection;
pub mod projector;

pub use connection::handle_connection;
pub use projector::{Projector, Scope};
