//! Shared utilities for the Chathub workspace.

pub mod logger;
pub mod time;
