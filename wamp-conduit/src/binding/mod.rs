pub mod binding;
pub mod json;
pub mod message_pack;
