//! HTTP and WebSocket request handlers.

pub mod health;
pub mod occupancy;
pub mod qr;
pub mod websocket;

pub use health::{health_check, readiness_check};
