//! Receiver-hook protocol
//!
//! A destination account is *programmable* when a binding has been installed
//! for it; plain accounts have no binding and are never called back. Safe
//! transfers and mints to a programmable destination must be acknowledged:
//! the hook returns the token matching the delivery shape, anything else
//! aborts the operation and the engine restores its entry snapshot.
//!
//! Hooks run strictly after the ledger mutation is committed. The `&mut Dlt`
//! they receive therefore observes post-transfer state, and reentering the
//! engine from inside a hook is safe.

use crate::ledger::Dlt;
use crate::types::{Ack, Address, Amount, MainId, SubId};
use sha3::{Digest, Keccak256};
use std::sync::Arc;

/// Signature acknowledged by [`Ack::single`]
const SINGLE_HOOK: &str = "onDLTReceived(address,address,uint256,uint256,uint256,bytes)";

/// Signature acknowledged by [`Ack::batch`]
const BATCH_HOOK: &str = "onDLTBatchReceived(address,address,uint256[],uint256[],uint256[],bytes)";

/// Leading four bytes of the Keccak-256 of a hook signature
fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

impl Ack {
    /// Token a receiver returns to accept a single-item delivery
    pub fn single() -> Self {
        Ack::from_bytes(selector(SINGLE_HOOK))
    }

    /// Token a receiver returns to accept a batch delivery
    pub fn batch() -> Self {
        Ack::from_bytes(selector(BATCH_HOOK))
    }
}

/// What a receiver hook produced: the acceptance token, or an explicit
/// rejection whose reason is propagated verbatim to the transfer's caller
pub type HookResult = Result<Ack, String>;

/// Callback contract for programmable destination accounts
pub trait DltReceiver {
    /// Acknowledge a single-item transfer or mint
    #[allow(clippy::too_many_arguments)]
    fn on_dlt_received(
        &self,
        ledger: &mut Dlt,
        operator: Address,
        from: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
        data: &[u8],
    ) -> HookResult;

    /// Acknowledge a batch transfer; the arrays are the full batch, parallel
    #[allow(clippy::too_many_arguments)]
    fn on_dlt_batch_received(
        &self,
        ledger: &mut Dlt,
        operator: Address,
        from: Address,
        main_ids: &[MainId],
        sub_ids: &[SubId],
        amounts: &[Amount],
        data: &[u8],
    ) -> HookResult;
}

/// How a programmable account answers deliveries
#[derive(Clone)]
pub(crate) enum ReceiverBinding {
    /// Programmable but does not implement the receiver interface
    NonReceiver,
    /// Implements the receiver interface
    Receiver(Arc<dyn DltReceiver>),
}
