//! Shared task model, wire envelope and ranking contract for `Tasklane`.

pub mod api;
pub mod codec;
pub mod ranking;
pub mod stats;
pub mod task;
