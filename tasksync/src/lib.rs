//! `TaskSync` — offline-first task list synchronization engine.

pub mod config;
pub mod conn;
pub mod dispatch;
pub mod engine;
pub mod reconcile;
pub mod session;
pub mod store;
