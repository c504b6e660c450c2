//! capgrid-state — embedded state store for capgrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for organizations, users, clusters and deployments.
//!
//! # Architecture
//!
//! All entities are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by a `u64` id drawn from a per-entity sequence. Reads go through
//! [`StateStore`] directly; multi-step mutations go through a
//! [`StateTxn`] unit of work that commits or aborts as a whole.
//!
//! The cluster resource ledger lives in [`ledger`]: a cluster's
//! `available` vector can only change through `reserve` / `release`,
//! which keep every dimension inside `[0, limit]`.

pub mod error;
pub mod ledger;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use ledger::LedgerError;
pub use store::{StateStore, StateTxn};
pub use types::*;
