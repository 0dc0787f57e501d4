//! Application layer - Services built on the ports.

pub mod assembler;
pub mod content;
pub mod notify;
pub mod thumbnail;
pub mod transcoder;
