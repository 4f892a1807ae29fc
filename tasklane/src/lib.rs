//! `Tasklane`: offline-first personal task manager client.
//!
//! Mutations are applied to a local cache, appended to a durable queue,
//! and replayed against the server by the [`sync`] engine whenever it is
//! reachable. Temporary ids minted offline are reconciled to server ids
//! as creates are confirmed.

pub mod cache;
pub mod cli;
pub mod config;
pub mod connectivity;
pub mod queue;
pub mod ranking;
pub mod reconcile;
pub mod remote;
pub mod replica;
pub mod service;
pub mod storage;
pub mod sync;
