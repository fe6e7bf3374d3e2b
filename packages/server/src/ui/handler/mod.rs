//! Request handlers.

mod http;
mod websocket;

pub use http::{
    get_chat_subscribers, get_online_users, get_stats, get_user_presence, health_check,
    post_chat_event,
};
pub use websocket::websocket_handler;
