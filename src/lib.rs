//! Client-side state and optimistic sync layer for a personal finance
//! app.
//!
//! Local edits are applied to the in-memory [`state`] at once, mirrored
//! into derived indexes and projected recurring transactions, sent to the
//! remote service through the [`pipeline`], and rolled back coherently if
//! the remote call fails. [`ledger::Ledger`] is the high-level entry
//! point.

extern crate alloc;

pub mod backup;
pub mod encryption;
pub mod error;
pub mod index;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod offline;
pub mod pipeline;
pub mod projection;
pub mod recurrence;
pub mod remote;
pub mod state;
pub mod storage;
pub mod store;
pub mod undo;
pub mod validation;

pub use error::{LedgerError, Result};
pub use ledger::{Ledger, LedgerBuilder};
