//! Core types for the dual-layer ledger
//!
//! All types are designed for:
//! - Exact arithmetic (integer amounts, no floating point)
//! - Cheap copying (identifiers are plain words, accounts are 20 bytes)
//! - Deterministic encoding (fixed-width words feed the permit hashes)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Asset-class identifier (the coarse level of the id space)
pub type MainId = u64;

/// Sub-lot identifier within an asset class (the fine level)
pub type SubId = u64;

/// Balance, supply, and allowance quantity
pub type Amount = u128;

/// Allowance sentinel meaning "unlimited"; never decremented by spending
pub const UNLIMITED_ALLOWANCE: Amount = Amount::MAX;

/// Account identifier (20 bytes, derived from a secp256k1 public key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    /// The all-zero sentinel: "no account".
    ///
    /// Invalid as a source, destination, approver, or spender in every
    /// ledger operation.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create an address from raw bytes
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the sentinel address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Error parsing an [`Address`] from its hex form
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address literal: {0}")]
pub struct AddressParseError(pub String);

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|_| AddressParseError(s.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| AddressParseError(s.to_string()))?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Receiver acceptance token (4 bytes, selector-shaped)
///
/// A programmable destination acknowledges a delivery by returning the token
/// matching the hook that was invoked; see the `receiver` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack([u8; 4]);

impl Ack {
    /// Wrap raw token bytes
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Raw token bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

/// A recoverable secp256k1 signature over a permit digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitSignature {
    /// R component (32 bytes, big-endian)
    pub r: [u8; 32],
    /// S component (32 bytes, big-endian, low-S form)
    pub s: [u8; 32],
    /// Recovery id; 0, 1, 27, and 28 are accepted
    pub v: u8,
}

/// Notification appended to the ledger's event buffer on every successful
/// mutation
///
/// Mints carry the zero address as `from`, burns carry it as `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A single-item movement of value
    Transfer {
        /// Account that triggered the movement
        operator: Address,
        /// Source (zero for mints)
        from: Address,
        /// Destination (zero for burns)
        to: Address,
        /// Asset class
        main_id: MainId,
        /// Sub-lot
        sub_id: SubId,
        /// Units moved
        amount: Amount,
    },
    /// A batch movement; the three arrays are parallel
    TransferBatch {
        /// Account that triggered the movement
        operator: Address,
        /// Source account
        from: Address,
        /// Destination account
        to: Address,
        /// Asset classes, one per leg
        main_ids: Vec<MainId>,
        /// Sub-lots, one per leg
        sub_ids: Vec<SubId>,
        /// Units moved, one per leg
        amounts: Vec<Amount>,
    },
    /// An allowance was overwritten
    Approval {
        /// Granting account
        owner: Address,
        /// Account allowed to spend
        spender: Address,
        /// Asset class the allowance covers
        main_id: MainId,
        /// Sub-lot the allowance covers
        sub_id: SubId,
        /// New spendable amount
        amount: Amount,
    },
    /// An operator approval was toggled
    ApprovalForAll {
        /// Granting account
        owner: Address,
        /// Operator the flag covers
        operator: Address,
        /// New flag value
        approved: bool,
    },
}
