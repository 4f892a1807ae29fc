//! Tasklane API server library.
//!
//! Exposes the CRUD server for use in tests and embedding. The server is
//! the authority on task identity: it assigns permanent ids on create and
//! serves its listing in ranked order.

pub mod api;
pub mod config;
pub mod ranking;
pub mod store;
