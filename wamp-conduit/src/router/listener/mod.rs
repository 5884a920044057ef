pub mod channel_listener;
pub mod listener;
pub mod web_socket_listener;
