pub mod adapter;
pub mod arguments;
pub mod correlator;
pub mod stub;
