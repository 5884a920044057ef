pub mod common;
pub mod envelope;
pub mod message;
