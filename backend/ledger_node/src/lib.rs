//! Milestone escrow ledger node.
//!
//! Hosts the `milestone_escrow` contract in-process, journals every accepted
//! signed command to SQLite, and serves the escrow's operations and event
//! stream over a small Axum REST API. On restart the journal is replayed
//! into a fresh host.

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod host;
pub mod ledger;
