//! Network-facing handlers.

pub mod http;
