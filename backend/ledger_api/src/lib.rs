//! Wire model shared by the ledger node and its clients.
//!
//! Amounts are `i128` on the ledger and travel as decimal strings (see
//! [`amount`]); every write is signed by the principal that performs it (see
//! [`auth`]).

pub mod amount;
pub mod auth;
pub mod events;
pub mod types;
pub mod wire;

pub use auth::{AuthError, Credential, SignedHeaders};
pub use events::{EscrowEvent, EventKind, EventRecord};
pub use types::{Amount, Milestone, NewProject, Project, ProjectMetadata};
pub use wire::{ErrorBody, ErrorKind};
