//! UseCase layer: message routing and connection housekeeping.

pub mod error;
pub mod route_message;
pub mod sweep_stale_connections;

pub use error::RouteError;
pub use route_message::{ClientContext, RouteMessageUseCase};
pub use sweep_stale_connections::{SweepStaleConnectionsUseCase, spawn_janitor};
