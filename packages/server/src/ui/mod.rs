//! UI layer: the axum server, WebSocket client loops and HTTP handlers.

mod handler;
mod server;
mod signal;
pub mod state;

pub use server::Server;
