//! Data Transfer Objects (DTOs) for the chat delivery engine.
//!
//! DTOs are organized by protocol:
//! - `websocket`: the JSON envelope exchanged over a connection
//! - `http`: HTTP API request/response DTOs

pub mod http;
pub mod websocket;
