pub mod binding;
pub mod connection;
pub mod core;
pub mod message;
pub mod peer;
pub mod router;
pub mod rpc;
pub mod transport;
