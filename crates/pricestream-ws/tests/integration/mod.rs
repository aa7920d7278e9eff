//! Integration tests for pricestream-ws.
//!
//! These run the connection manager over real sockets against a local
//! WebSocket server.

pub mod common;
