//! Realtime chat delivery engine.
//!
//! Layers:
//!
//! - `domain`: value objects, the connection record and the repository trait
//! - `infrastructure`: wire DTOs, the hub actor and repository implementations
//! - `usecase`: message routing and the stale-connection sweep
//! - `ui`: the axum server, WebSocket client loops and HTTP handlers

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
