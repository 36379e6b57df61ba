//! Shared protocol definitions for the `TaskSync` wire format.

pub mod envelope;
pub mod task;
