//! Infrastructure layer: wire DTOs, the hub actor and repository implementations.

pub mod dto;
pub mod hub;
pub mod repository;
