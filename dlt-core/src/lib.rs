//! Dual-layer asset ledger
//!
//! Accounting core for a two-level asset identifier space: every unit of
//! value belongs to a coarse **mainId** (an asset class) and a fine **subId**
//! within it (a specific lot or tranche).
//!
//! # Architecture
//!
//! - **Single Context Object**: all state lives behind one [`Dlt`] handle;
//!   the environment serializes operations on it
//! - **Incremental Aggregates**: supplies and per-mainId balances are
//!   maintained on every mutation, never recomputed by scanning
//! - **Checks-Effects-Interactions**: receiver hooks run only after the
//!   ledger is fully committed, so reentry is safe
//! - **Offline Authorization**: structured-data permits bind signatures to
//!   one ledger instance via a cached domain separator
//!
//! # Invariants
//!
//! - Every subSupply equals the sum of that (mainId, subId)'s balances
//! - Every mainSupply equals the sum of its subSupplies
//! - An id is registered exactly while its supply is nonzero
//! - A failed operation leaves no observable state change

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod receiver;
pub mod registry;
mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use ledger::Dlt;
pub use receiver::{DltReceiver, HookResult};
pub use types::{
    Ack, Address, Amount, Event, MainId, PermitSignature, SubId, UNLIMITED_ALLOWANCE,
};
