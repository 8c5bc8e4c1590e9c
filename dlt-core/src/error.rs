//! Error types for the ledger

use crate::types::Amount;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every error aborts the current operation with zero observable state
/// change; nothing is retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The zero address was used as an owner, spender, source, or destination
    #[error("the zero address cannot hold or move balances")]
    InvalidAccount,

    /// Mint, burn, or transfer of zero units
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Parallel arrays differ in length
    #[error("array length mismatch: {left} vs {right}")]
    LengthMismatch {
        /// Length of the earlier array
        left: usize,
        /// Length of the array that disagrees with it
        right: usize,
    },

    /// Source balance is smaller than the requested amount
    #[error("insufficient balance: have {balance}, need {needed}")]
    InsufficientBalance {
        /// Balance currently held
        balance: Amount,
        /// Amount the operation required
        needed: Amount,
    },

    /// Recorded allowance is smaller than the requested amount
    #[error("insufficient allowance: have {allowance}, need {needed}")]
    InsufficientAllowance {
        /// Allowance currently recorded
        allowance: Amount,
        /// Amount the operation required
        needed: Amount,
    },

    /// Batch caller is neither the source nor an approved operator
    #[error("caller is neither the owner nor an approved operator")]
    NotAuthorized,

    /// An account tried to approve itself as spender or operator
    #[error("an account cannot approve itself")]
    SelfApproval,

    /// Permit signature does not recover to the owner
    #[error("signature does not recover to the owner")]
    InvalidSignature,

    /// Permit deadline lies in the past
    #[error("permit deadline has passed")]
    ExpiredSignature,

    /// Programmable destination does not implement the receiver interface
    #[error("destination does not implement the receiver interface")]
    NonReceiverImplementer,

    /// Receiver hook rejected the delivery; the reason is the callee's,
    /// propagated verbatim
    #[error("receiver rejected the transfer: {0}")]
    RejectedByReceiver(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}
