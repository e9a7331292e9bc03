//! kohd-console: game-master console for the Kohd datastream terminal
//!
//! The GM console and the player terminal share one path-addressed store.
//! This crate holds:
//! - the Kohd cipher codec and burst wire format (`kohd`)
//! - the per-symbol key-gate (`keygate`)
//! - the store contract and an in-process implementation (`store`)
//! - the synchronizer that mirrors shared state and emits typed events (`sync`)
//! - GM operations over the shared state (`session`)
//! - login, credentials bootstrap and the HTTP API (`auth`, `bootstrap`, `api`)

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod keygate;
pub mod kohd;
pub mod models;
pub mod session;
pub mod store;
pub mod sync;

pub use error::{ConsoleError, Result};
