//! `/v1/tools/*`: the operations a booking agent calls

pub mod dto;
pub mod handlers;

pub use handlers::*;
