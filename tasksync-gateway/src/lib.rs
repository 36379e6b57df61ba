//! `TaskSync` gateway: the shared task-list server clients sync against.
//!
//! Holds the authoritative task collection in memory, accepts WebSocket
//! connections, and fans mutation events out to every connected client.

pub mod config;
pub mod server;
