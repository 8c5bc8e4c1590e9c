//! Dual-layer ledger orchestration
//!
//! This module ties together storage, registries, the receiver protocol, and
//! the permit verifier into the public ledger API.
//!
//! Every mutating operation runs in four phases: **validate** the arguments,
//! **authorize** the caller (identity, operator approval, or allowance),
//! **mutate** the ledger, and only then **notify** the destination's receiver
//! hook. The hook is the single point where control leaves the engine;
//! because the mutation is already committed, a hook that reenters the
//! engine observes fully-consistent state. Operations that can still fail
//! after mutation (hook rejections) snapshot the state on entry and restore
//! it on failure, so every error leaves zero observable change.
//!
//! # Example
//!
//! ```
//! use dlt_core::{Address, Config, Dlt};
//!
//! let mut ledger = Dlt::new(Config::default());
//! let holder = Address::new([1u8; 20]);
//!
//! ledger.mint(holder, 1, 1, 10_000)?;
//! assert_eq!(ledger.balance_of(holder, 1, 1), 10_000);
//! assert_eq!(ledger.total_main_ids(), 1);
//! # Ok::<(), dlt_core::Error>(())
//! ```

use crate::{
    config::Config,
    crypto,
    error::{Error, Result},
    metrics::Metrics,
    receiver::{DltReceiver, ReceiverBinding},
    storage::State,
    types::{
        Ack, Address, Amount, Event, MainId, PermitSignature, SubId, UNLIMITED_ALLOWANCE,
    },
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Dual-layer asset ledger
///
/// The ledger is an explicit context object: all balances, supplies,
/// registries, authorizations, and nonces live behind one `&mut` handle, and
/// the environment is expected to serialize operations on it.
pub struct Dlt {
    /// Mapping-backed books; cloned as the rollback checkpoint for
    /// hook-bearing operations
    state: State,

    /// Receiver bindings of programmable accounts
    bindings: HashMap<Address, ReceiverBinding>,

    /// Cached signing-domain separator, fixed at construction
    domain_separator: [u8; 32],

    /// Construction-time configuration
    config: Config,

    /// Operation counters
    metrics: Metrics,
}

impl Dlt {
    /// Create a ledger; the domain separator is derived here, once
    pub fn new(config: Config) -> Self {
        let domain_separator = crypto::domain_separator(
            &config.name,
            &config.version,
            config.chain_id,
            config.ledger_address,
        );
        tracing::info!(
            name = %config.name,
            symbol = %config.symbol,
            chain_id = config.chain_id,
            "ledger initialized"
        );
        Self {
            state: State::default(),
            bindings: HashMap::new(),
            domain_separator,
            config,
            metrics: Metrics::default(),
        }
    }

    // Receiver wiring

    /// Mark `account` as programmable and install its receiver hook
    pub fn install_receiver(&mut self, account: Address, hook: Arc<dyn DltReceiver>) {
        self.bindings.insert(account, ReceiverBinding::Receiver(hook));
    }

    /// Mark `account` as programmable without a receiver hook; safe
    /// deliveries to it fail with [`Error::NonReceiverImplementer`]
    pub fn install_non_receiver(&mut self, account: Address) {
        self.bindings.insert(account, ReceiverBinding::NonReceiver);
    }

    // Mutations

    /// Create `amount` units of (mainId, subId) on `to`
    ///
    /// Programmable destinations must acknowledge the mint through the
    /// single-item hook; the operator and source it sees are the zero
    /// address.
    pub fn mint(&mut self, to: Address, main_id: MainId, sub_id: SubId, amount: Amount) -> Result<()> {
        self.mint_with_data(to, main_id, sub_id, amount, &[])
    }

    /// [`mint`](Self::mint) with an opaque payload forwarded to the hook
    pub fn mint_with_data(
        &mut self,
        to: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
        data: &[u8],
    ) -> Result<()> {
        let checkpoint = self.checkpoint_for(to);
        self.state.credit(to, main_id, sub_id, amount)?;
        self.state.events.push(Event::Transfer {
            operator: Address::ZERO,
            from: Address::ZERO,
            to,
            main_id,
            sub_id,
            amount,
        });

        if let Err(err) =
            self.notify_single(to, Address::ZERO, Address::ZERO, main_id, sub_id, amount, data)
        {
            self.state = checkpoint.expect("hooks only run for programmable destinations");
            return Err(err);
        }

        self.metrics.record_mint();
        tracing::debug!(%to, main_id, sub_id, amount, "mint");
        Ok(())
    }

    /// Destroy `amount` units of (mainId, subId) held by `from`
    pub fn burn(&mut self, from: Address, main_id: MainId, sub_id: SubId, amount: Amount) -> Result<()> {
        self.state.debit(from, main_id, sub_id, amount)?;
        self.state.events.push(Event::Transfer {
            operator: Address::ZERO,
            from,
            to: Address::ZERO,
            main_id,
            sub_id,
            amount,
        });
        self.metrics.record_burn();
        tracing::debug!(%from, main_id, sub_id, amount, "burn");
        Ok(())
    }

    /// Move `amount` units from `from` (the caller itself) to `to`
    ///
    /// The low-level path: no authorization beyond the caller being `from`,
    /// and no receiver acknowledgement.
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
    ) -> Result<()> {
        if from.is_zero() || to.is_zero() {
            return Err(Error::InvalidAccount);
        }
        self.move_balance(from, to, main_id, sub_id, amount)?;
        self.state.events.push(Event::Transfer {
            operator: from,
            from,
            to,
            main_id,
            sub_id,
            amount,
        });
        self.metrics.record_transfers(1);
        Ok(())
    }

    /// Move `amount` units from `from` to `to` on behalf of `spender`,
    /// consuming allowance unless `spender` is the owner or an approved
    /// operator. No receiver acknowledgement.
    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
    ) -> Result<()> {
        self.transfer_from_inner(spender, from, to, main_id, sub_id, amount)?;
        self.metrics.record_transfers(1);
        Ok(())
    }

    /// [`transfer_from`](Self::transfer_from) that additionally requires a
    /// programmable `to` to acknowledge the delivery
    #[allow(clippy::too_many_arguments)]
    pub fn safe_transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
        data: &[u8],
    ) -> Result<()> {
        let checkpoint = self.checkpoint_for(to);
        self.transfer_from_inner(spender, from, to, main_id, sub_id, amount)?;

        if let Err(err) = self.notify_single(to, spender, from, main_id, sub_id, amount, data) {
            self.state = checkpoint.expect("hooks only run for programmable destinations");
            return Err(err);
        }

        self.metrics.record_transfers(1);
        Ok(())
    }

    /// Move several (mainId, subId, amount) legs from `from` to `to` as one
    /// atomic unit
    ///
    /// Batches never consult per-id allowances: the spender must be the
    /// owner or an approved operator. Legs apply strictly in input order and
    /// either all land or none do; a programmable `to` acknowledges the
    /// whole batch through the batch hook, once.
    #[allow(clippy::too_many_arguments)]
    pub fn safe_batch_transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        main_ids: &[MainId],
        sub_ids: &[SubId],
        amounts: &[Amount],
        data: &[u8],
    ) -> Result<()> {
        if main_ids.len() != sub_ids.len() {
            return Err(Error::LengthMismatch {
                left: main_ids.len(),
                right: sub_ids.len(),
            });
        }
        if sub_ids.len() != amounts.len() {
            return Err(Error::LengthMismatch {
                left: sub_ids.len(),
                right: amounts.len(),
            });
        }
        if spender.is_zero() || from.is_zero() || to.is_zero() {
            return Err(Error::InvalidAccount);
        }
        if spender != from && !self.state.is_approved_for_all(from, spender) {
            return Err(Error::NotAuthorized);
        }

        // Feasibility pass over shadow balances: legs interact (a leg's
        // credit can fund a later leg's debit when from == to), so each leg
        // is simulated in input order before anything is written.
        let mut shadow: HashMap<(Address, MainId, SubId), Amount> = HashMap::new();
        for i in 0..main_ids.len() {
            let (main_id, sub_id, amount) = (main_ids[i], sub_ids[i], amounts[i]);
            if amount == 0 {
                return Err(Error::ZeroAmount);
            }
            let debit = shadow
                .entry((from, main_id, sub_id))
                .or_insert_with(|| self.state.balance_of(from, main_id, sub_id));
            if *debit < amount {
                return Err(Error::InsufficientBalance {
                    balance: *debit,
                    needed: amount,
                });
            }
            *debit -= amount;
            let credit = shadow
                .entry((to, main_id, sub_id))
                .or_insert_with(|| self.state.balance_of(to, main_id, sub_id));
            *credit += amount;
        }

        let checkpoint = self.checkpoint_for(to);
        for i in 0..main_ids.len() {
            self.move_balance(from, to, main_ids[i], sub_ids[i], amounts[i])
                .expect("feasibility simulated above");
        }
        self.state.events.push(Event::TransferBatch {
            operator: spender,
            from,
            to,
            main_ids: main_ids.to_vec(),
            sub_ids: sub_ids.to_vec(),
            amounts: amounts.to_vec(),
        });

        if let Err(err) = self.notify_batch(to, spender, from, main_ids, sub_ids, amounts, data) {
            self.state = checkpoint.expect("hooks only run for programmable destinations");
            return Err(err);
        }

        self.metrics.record_transfers(main_ids.len() as u64);
        tracing::debug!(%spender, %from, %to, legs = main_ids.len(), "batch transfer");
        Ok(())
    }

    /// Overwrite the allowance of `spender` over `owner`'s
    /// (mainId, subId) units
    ///
    /// [`UNLIMITED_ALLOWANCE`] is never decremented by spending.
    pub fn approve(
        &mut self,
        owner: Address,
        spender: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
    ) -> Result<()> {
        if owner.is_zero() || spender.is_zero() {
            return Err(Error::InvalidAccount);
        }
        if spender == owner {
            return Err(Error::SelfApproval);
        }
        self.state.set_allowance(owner, spender, main_id, sub_id, amount);
        self.state.events.push(Event::Approval {
            owner,
            spender,
            main_id,
            sub_id,
            amount,
        });
        Ok(())
    }

    /// Grant or revoke `operator`'s blanket permission over all of `owner`'s
    /// balances
    pub fn set_approval_for_all(
        &mut self,
        owner: Address,
        operator: Address,
        approved: bool,
    ) -> Result<()> {
        if owner.is_zero() || operator.is_zero() {
            return Err(Error::InvalidAccount);
        }
        if operator == owner {
            return Err(Error::SelfApproval);
        }
        self.state.set_operator(owner, operator, approved);
        self.state.events.push(Event::ApprovalForAll {
            owner,
            operator,
            approved,
        });
        Ok(())
    }

    /// Apply an offline-signed approval
    ///
    /// The signature must cover (owner, spender, mainId, subId, amount,
    /// owner's current nonce, deadline) under this ledger's signing domain.
    /// A successful permit consumes the nonce, so the same signature can
    /// never be applied twice.
    #[allow(clippy::too_many_arguments)]
    pub fn permit(
        &mut self,
        owner: Address,
        spender: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
        deadline: u64,
        signature: &PermitSignature,
    ) -> Result<()> {
        let now = Utc::now().timestamp().max(0) as u64;
        if now > deadline {
            return Err(Error::ExpiredSignature);
        }
        if owner.is_zero() || spender.is_zero() {
            return Err(Error::InvalidAccount);
        }
        if spender == owner {
            return Err(Error::SelfApproval);
        }

        let nonce = self.state.nonce(owner);
        let struct_hash =
            crypto::permit_struct_hash(owner, spender, main_id, sub_id, amount, nonce, deadline);
        let digest = crypto::permit_digest(&self.domain_separator, &struct_hash);
        let recovered = crypto::recover_address(&digest, signature)?;
        if recovered != owner {
            return Err(Error::InvalidSignature);
        }

        self.state.bump_nonce(owner);
        self.approve(owner, spender, main_id, sub_id, amount)?;
        self.metrics.record_permit();
        tracing::debug!(%owner, %spender, main_id, sub_id, amount, "permit applied");
        Ok(())
    }

    // Read-only queries

    /// Balance of (account, mainId, subId)
    pub fn balance_of(&self, account: Address, main_id: MainId, sub_id: SubId) -> Amount {
        self.state.balance_of(account, main_id, sub_id)
    }

    /// Sum of the account's balances across all subIds under `main_id`
    pub fn main_balance_of(&self, account: Address, main_id: MainId) -> Amount {
        self.state.main_balance_of(account, main_id)
    }

    /// Balances for parallel (account, mainId, subId) triples
    pub fn balance_of_batch(
        &self,
        accounts: &[Address],
        main_ids: &[MainId],
        sub_ids: &[SubId],
    ) -> Result<Vec<Amount>> {
        if accounts.len() != main_ids.len() {
            return Err(Error::LengthMismatch {
                left: accounts.len(),
                right: main_ids.len(),
            });
        }
        if main_ids.len() != sub_ids.len() {
            return Err(Error::LengthMismatch {
                left: main_ids.len(),
                right: sub_ids.len(),
            });
        }
        Ok((0..accounts.len())
            .map(|i| self.state.balance_of(accounts[i], main_ids[i], sub_ids[i]))
            .collect())
    }

    /// Total units across all accounts under `main_id`
    pub fn main_supply(&self, main_id: MainId) -> Amount {
        self.state.main_supply(main_id)
    }

    /// Total units across all accounts of (mainId, subId)
    pub fn sub_supply(&self, main_id: MainId, sub_id: SubId) -> Amount {
        self.state.sub_supply(main_id, sub_id)
    }

    /// Total units across the whole ledger
    pub fn total_supply(&self) -> Amount {
        self.state.total_supply()
    }

    /// Number of mainIds with nonzero supply
    pub fn total_main_ids(&self) -> usize {
        self.state.registry.total_main_ids()
    }

    /// Number of subIds with nonzero supply under `main_id`
    pub fn total_sub_ids(&self, main_id: MainId) -> usize {
        self.state.registry.total_sub_ids(main_id)
    }

    /// MainIds with nonzero supply, in unspecified order
    pub fn main_ids(&self) -> &[MainId] {
        self.state.registry.main_ids()
    }

    /// SubIds with nonzero supply under `main_id`, in unspecified order
    pub fn sub_ids(&self, main_id: MainId) -> &[SubId] {
        self.state.registry.sub_ids(main_id)
    }

    /// Remaining spendable amount of `spender` over `owner`'s
    /// (mainId, subId) units
    pub fn allowance(
        &self,
        owner: Address,
        spender: Address,
        main_id: MainId,
        sub_id: SubId,
    ) -> Amount {
        self.state.allowance(owner, spender, main_id, sub_id)
    }

    /// Whether `operator` holds blanket permission over `owner`'s balances
    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.state.is_approved_for_all(owner, operator)
    }

    /// The account's next permit nonce
    pub fn nonces(&self, account: Address) -> u64 {
        self.state.nonce(account)
    }

    /// The signing-domain separator bound into every permit
    pub fn domain_separator(&self) -> [u8; 32] {
        self.domain_separator
    }

    /// Construction-time configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Operation counters
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Notifications emitted so far, oldest first
    pub fn events(&self) -> &[Event] {
        &self.state.events
    }

    /// Drain the notification buffer
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.state.events)
    }

    // Internals

    /// Snapshot the state iff `to` is programmable (only then can the
    /// operation still fail after mutation)
    fn checkpoint_for(&self, to: Address) -> Option<State> {
        self.bindings.contains_key(&to).then(|| self.state.clone())
    }

    /// Debit `from` and credit `to`; on any error nothing has been written
    fn move_balance(
        &mut self,
        from: Address,
        to: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
    ) -> Result<()> {
        if to.is_zero() {
            return Err(Error::InvalidAccount);
        }
        self.state.debit(from, main_id, sub_id, amount)?;
        self.state
            .credit(to, main_id, sub_id, amount)
            .expect("credit after a successful debit cannot fail");
        Ok(())
    }

    /// Shared body of `transfer_from` and `safe_transfer_from`: authorize,
    /// check balance, move, and only then commit the allowance decrement
    fn transfer_from_inner(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
    ) -> Result<()> {
        if spender.is_zero() || from.is_zero() || to.is_zero() {
            return Err(Error::InvalidAccount);
        }

        let remaining = self.plan_allowance_spend(from, spender, main_id, sub_id, amount)?;

        let balance = self.state.balance_of(from, main_id, sub_id);
        if balance < amount {
            return Err(Error::InsufficientBalance {
                balance,
                needed: amount,
            });
        }

        self.move_balance(from, to, main_id, sub_id, amount)?;
        if let Some(remaining) = remaining {
            self.state.set_allowance(from, spender, main_id, sub_id, remaining);
        }

        self.state.events.push(Event::Transfer {
            operator: spender,
            from,
            to,
            main_id,
            sub_id,
            amount,
        });
        Ok(())
    }

    /// Decide what the allowance record should become, without writing it.
    ///
    /// `None` means no consumption: the spender is the owner, an approved
    /// operator, or holds the unlimited sentinel.
    fn plan_allowance_spend(
        &self,
        owner: Address,
        spender: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
    ) -> Result<Option<Amount>> {
        if owner == spender || self.state.is_approved_for_all(owner, spender) {
            return Ok(None);
        }
        let allowance = self.state.allowance(owner, spender, main_id, sub_id);
        if allowance == UNLIMITED_ALLOWANCE {
            return Ok(None);
        }
        if allowance < amount {
            return Err(Error::InsufficientAllowance {
                allowance,
                needed: amount,
            });
        }
        Ok(Some(allowance - amount))
    }

    /// Run the single-item receiver hook for a programmable `to`
    #[allow(clippy::too_many_arguments)]
    fn notify_single(
        &mut self,
        to: Address,
        operator: Address,
        from: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
        data: &[u8],
    ) -> Result<()> {
        let hook = match self.bindings.get(&to) {
            None => return Ok(()),
            Some(ReceiverBinding::NonReceiver) => return Err(Error::NonReceiverImplementer),
            Some(ReceiverBinding::Receiver(hook)) => Arc::clone(hook),
        };
        match hook.on_dlt_received(self, operator, from, main_id, sub_id, amount, data) {
            Ok(ack) if ack == Ack::single() => Ok(()),
            Ok(_) => {
                tracing::warn!(%to, "receiver returned an unexpected acknowledgement token");
                Err(Error::RejectedByReceiver(
                    "unexpected acknowledgement token".to_string(),
                ))
            }
            Err(reason) => {
                tracing::warn!(%to, %reason, "receiver rejected delivery");
                Err(Error::RejectedByReceiver(reason))
            }
        }
    }

    /// Run the batch receiver hook for a programmable `to`
    #[allow(clippy::too_many_arguments)]
    fn notify_batch(
        &mut self,
        to: Address,
        operator: Address,
        from: Address,
        main_ids: &[MainId],
        sub_ids: &[SubId],
        amounts: &[Amount],
        data: &[u8],
    ) -> Result<()> {
        let hook = match self.bindings.get(&to) {
            None => return Ok(()),
            Some(ReceiverBinding::NonReceiver) => return Err(Error::NonReceiverImplementer),
            Some(ReceiverBinding::Receiver(hook)) => Arc::clone(hook),
        };
        match hook.on_dlt_batch_received(self, operator, from, main_ids, sub_ids, amounts, data) {
            Ok(ack) if ack == Ack::batch() => Ok(()),
            Ok(_) => {
                tracing::warn!(%to, "receiver returned an unexpected acknowledgement token");
                Err(Error::RejectedByReceiver(
                    "unexpected acknowledgement token".to_string(),
                ))
            }
            Err(reason) => {
                tracing::warn!(%to, %reason, "receiver rejected delivery");
                Err(Error::RejectedByReceiver(reason))
            }
        }
    }
}

impl Default for Dlt {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::HookResult;
    use std::cell::RefCell;

    fn account(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn ledger_with_supply(holder: Address) -> Dlt {
        let mut ledger = Dlt::default();
        ledger.mint(holder, 1, 1, 10_000).unwrap();
        ledger
    }

    /// Accepts every delivery and records what it saw
    #[derive(Default)]
    struct Accepting {
        single_calls: RefCell<Vec<(Address, Address, MainId, SubId, Amount, Vec<u8>)>>,
        batch_calls: RefCell<usize>,
    }

    impl DltReceiver for Accepting {
        fn on_dlt_received(
            &self,
            _ledger: &mut Dlt,
            operator: Address,
            from: Address,
            main_id: MainId,
            sub_id: SubId,
            amount: Amount,
            data: &[u8],
        ) -> HookResult {
            self.single_calls.borrow_mut().push((
                operator,
                from,
                main_id,
                sub_id,
                amount,
                data.to_vec(),
            ));
            Ok(Ack::single())
        }

        fn on_dlt_batch_received(
            &self,
            _ledger: &mut Dlt,
            _operator: Address,
            _from: Address,
            _main_ids: &[MainId],
            _sub_ids: &[SubId],
            _amounts: &[Amount],
            _data: &[u8],
        ) -> HookResult {
            *self.batch_calls.borrow_mut() += 1;
            Ok(Ack::batch())
        }
    }

    /// Rejects every delivery with an explicit reason
    struct Revertable;

    impl DltReceiver for Revertable {
        fn on_dlt_received(
            &self,
            _ledger: &mut Dlt,
            _operator: Address,
            _from: Address,
            _main_id: MainId,
            _sub_id: SubId,
            _amount: Amount,
            _data: &[u8],
        ) -> HookResult {
            Err("deliveries are refused here".to_string())
        }

        fn on_dlt_batch_received(
            &self,
            _ledger: &mut Dlt,
            _operator: Address,
            _from: Address,
            _main_ids: &[MainId],
            _sub_ids: &[SubId],
            _amounts: &[Amount],
            _data: &[u8],
        ) -> HookResult {
            Err("deliveries are refused here".to_string())
        }
    }

    /// Returns the wrong token for both hook shapes
    struct WrongToken;

    impl DltReceiver for WrongToken {
        fn on_dlt_received(
            &self,
            _ledger: &mut Dlt,
            _operator: Address,
            _from: Address,
            _main_id: MainId,
            _sub_id: SubId,
            _amount: Amount,
            _data: &[u8],
        ) -> HookResult {
            Ok(Ack::batch())
        }

        fn on_dlt_batch_received(
            &self,
            _ledger: &mut Dlt,
            _operator: Address,
            _from: Address,
            _main_ids: &[MainId],
            _sub_ids: &[SubId],
            _amounts: &[Amount],
            _data: &[u8],
        ) -> HookResult {
            Ok(Ack::single())
        }
    }

    #[test]
    fn test_mint_rejects_sentinel_and_zero_amount() {
        let mut ledger = Dlt::default();
        assert_eq!(
            ledger.mint(Address::ZERO, 1, 1, 100),
            Err(Error::InvalidAccount)
        );
        assert_eq!(ledger.mint(account(1), 1, 1, 0), Err(Error::ZeroAmount));
        assert_eq!(ledger.total_supply(), 0);
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn test_transfer_moves_and_notifies_nobody() {
        let owner = account(1);
        let other = account(2);
        let mut ledger = ledger_with_supply(owner);

        ledger.transfer(owner, other, 1, 1, 4_000).unwrap();
        assert_eq!(ledger.balance_of(owner, 1, 1), 6_000);
        assert_eq!(ledger.balance_of(other, 1, 1), 4_000);
        assert_eq!(ledger.main_balance_of(other, 1), 4_000);

        // Low-level path: even a bound non-receiver is never consulted
        let mut ledger = ledger_with_supply(owner);
        ledger.install_non_receiver(other);
        assert!(ledger.transfer(owner, other, 1, 1, 100).is_ok());
    }

    #[test]
    fn test_self_transfer_is_a_net_noop() {
        let owner = account(1);
        let mut ledger = ledger_with_supply(owner);
        ledger.transfer(owner, owner, 1, 1, 10_000).unwrap();
        assert_eq!(ledger.balance_of(owner, 1, 1), 10_000);
        assert_eq!(ledger.sub_supply(1, 1), 10_000);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let owner = account(1);
        let spender = account(2);
        let mut ledger = ledger_with_supply(owner);

        ledger.approve(owner, spender, 1, 1, 10_000).unwrap();
        ledger
            .transfer_from(spender, owner, spender, 1, 1, 4_000)
            .unwrap();

        assert_eq!(ledger.allowance(owner, spender, 1, 1), 6_000);
        assert_eq!(ledger.balance_of(spender, 1, 1), 4_000);
    }

    #[test]
    fn test_owner_spends_without_allowance() {
        let owner = account(1);
        let other = account(2);
        let mut ledger = ledger_with_supply(owner);

        ledger.transfer_from(owner, owner, other, 1, 1, 1_000).unwrap();
        assert_eq!(ledger.balance_of(other, 1, 1), 1_000);
        assert_eq!(ledger.allowance(owner, owner, 1, 1), 0);
    }

    #[test]
    fn test_operator_spends_without_allowance() {
        let owner = account(1);
        let operator = account(2);
        let mut ledger = ledger_with_supply(owner);

        ledger.set_approval_for_all(owner, operator, true).unwrap();
        ledger
            .transfer_from(operator, owner, operator, 1, 1, 2_500)
            .unwrap();
        assert_eq!(ledger.balance_of(operator, 1, 1), 2_500);

        // Revocation closes the path again
        ledger.set_approval_for_all(owner, operator, false).unwrap();
        assert_eq!(
            ledger.transfer_from(operator, owner, operator, 1, 1, 1),
            Err(Error::InsufficientAllowance {
                allowance: 0,
                needed: 1
            })
        );
    }

    #[test]
    fn test_unlimited_allowance_is_stable() {
        let owner = account(1);
        let spender = account(2);
        let mut ledger = ledger_with_supply(owner);

        ledger
            .approve(owner, spender, 1, 1, UNLIMITED_ALLOWANCE)
            .unwrap();
        ledger
            .transfer_from(spender, owner, spender, 1, 1, 9_999)
            .unwrap();
        assert_eq!(ledger.allowance(owner, spender, 1, 1), UNLIMITED_ALLOWANCE);
    }

    #[test]
    fn test_failed_transfer_never_consumes_allowance() {
        let owner = account(1);
        let spender = account(2);
        let mut ledger = ledger_with_supply(owner);

        // Allowance above the balance: the balance check fails after the
        // allowance plan, and the plan must not have been committed.
        ledger.approve(owner, spender, 1, 1, 20_000).unwrap();
        assert_eq!(
            ledger.transfer_from(spender, owner, spender, 1, 1, 20_000),
            Err(Error::InsufficientBalance {
                balance: 10_000,
                needed: 20_000
            })
        );
        assert_eq!(ledger.allowance(owner, spender, 1, 1), 20_000);
        assert_eq!(ledger.balance_of(owner, 1, 1), 10_000);
    }

    #[test]
    fn test_allowance_checked_before_balance() {
        let owner = account(1);
        let spender = account(2);
        let mut ledger = ledger_with_supply(owner);

        ledger.approve(owner, spender, 1, 1, 10_000).unwrap();
        assert_eq!(
            ledger.transfer_from(spender, owner, spender, 1, 1, 20_000),
            Err(Error::InsufficientAllowance {
                allowance: 10_000,
                needed: 20_000
            })
        );
    }

    #[test]
    fn test_approve_validations() {
        let owner = account(1);
        let mut ledger = Dlt::default();

        assert_eq!(
            ledger.approve(owner, owner, 1, 1, 10),
            Err(Error::SelfApproval)
        );
        assert_eq!(
            ledger.approve(owner, Address::ZERO, 1, 1, 10),
            Err(Error::InvalidAccount)
        );
        assert_eq!(
            ledger.approve(Address::ZERO, owner, 1, 1, 10),
            Err(Error::InvalidAccount)
        );
        assert_eq!(
            ledger.set_approval_for_all(owner, owner, true),
            Err(Error::SelfApproval)
        );
    }

    #[test]
    fn test_approve_is_idempotent_overwrite() {
        let owner = account(1);
        let spender = account(2);
        let mut ledger = Dlt::default();

        ledger.approve(owner, spender, 1, 1, 500).unwrap();
        ledger.approve(owner, spender, 1, 1, 500).unwrap();
        assert_eq!(ledger.allowance(owner, spender, 1, 1), 500);
    }

    #[test]
    fn test_batch_requires_self_or_operator() {
        let owner = account(1);
        let spender = account(2);
        let mut ledger = ledger_with_supply(owner);

        // A per-id allowance is deliberately not enough for batches
        ledger.approve(owner, spender, 1, 1, 10_000).unwrap();
        assert_eq!(
            ledger.safe_batch_transfer_from(spender, owner, spender, &[1], &[1], &[100], &[]),
            Err(Error::NotAuthorized)
        );

        ledger.set_approval_for_all(owner, spender, true).unwrap();
        ledger
            .safe_batch_transfer_from(spender, owner, spender, &[1], &[1], &[100], &[])
            .unwrap();
        assert_eq!(ledger.balance_of(spender, 1, 1), 100);
    }

    #[test]
    fn test_batch_length_mismatch() {
        let owner = account(1);
        let mut ledger = ledger_with_supply(owner);
        assert_eq!(
            ledger.safe_batch_transfer_from(owner, owner, account(2), &[], &[1], &[100], &[]),
            Err(Error::LengthMismatch { left: 0, right: 1 })
        );
        assert_eq!(
            ledger.safe_batch_transfer_from(owner, owner, account(2), &[1], &[1], &[], &[]),
            Err(Error::LengthMismatch { left: 1, right: 0 })
        );
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let owner = account(1);
        let other = account(2);
        let mut ledger = ledger_with_supply(owner);
        ledger.mint(owner, 2, 1, 50).unwrap();

        // Second leg overdraws; the first must not remain applied
        assert_eq!(
            ledger.safe_batch_transfer_from(
                owner,
                owner,
                other,
                &[1, 2],
                &[1, 1],
                &[100, 51],
                &[],
            ),
            Err(Error::InsufficientBalance {
                balance: 50,
                needed: 51
            })
        );
        assert_eq!(ledger.balance_of(owner, 1, 1), 10_000);
        assert_eq!(ledger.balance_of(other, 1, 1), 0);
        assert_eq!(ledger.balance_of(owner, 2, 1), 50);
    }

    #[test]
    fn test_batch_legs_interact_in_order() {
        let owner = account(1);
        let mut ledger = ledger_with_supply(owner);

        // Self-batch: the credit of leg 1 funds the debit of leg 2
        ledger
            .safe_batch_transfer_from(
                owner,
                owner,
                owner,
                &[1, 1],
                &[1, 1],
                &[10_000, 10_000],
                &[],
            )
            .unwrap();
        assert_eq!(ledger.balance_of(owner, 1, 1), 10_000);
    }

    #[test]
    fn test_empty_batch_is_allowed() {
        let owner = account(1);
        let mut ledger = ledger_with_supply(owner);
        ledger
            .safe_batch_transfer_from(owner, owner, account(2), &[], &[], &[], &[])
            .unwrap();
        assert!(matches!(
            ledger.events().last(),
            Some(Event::TransferBatch { .. })
        ));
    }

    #[test]
    fn test_mint_to_receiver_invokes_hook() {
        let receiver = Arc::new(Accepting::default());
        let target = account(9);
        let mut ledger = Dlt::default();
        ledger.install_receiver(target, receiver.clone());

        ledger.mint_with_data(target, 1, 1, 77, b"payload").unwrap();

        let calls = receiver.single_calls.borrow();
        assert_eq!(calls.len(), 1);
        let (operator, from, main_id, sub_id, amount, data) = &calls[0];
        assert!(operator.is_zero());
        assert!(from.is_zero());
        assert_eq!((*main_id, *sub_id, *amount), (1, 1, 77));
        assert_eq!(data, b"payload");
    }

    #[test]
    fn test_mint_to_non_receiver_rolls_back() {
        let target = account(9);
        let mut ledger = Dlt::default();
        ledger.install_non_receiver(target);

        assert_eq!(
            ledger.mint(target, 1, 1, 5_000),
            Err(Error::NonReceiverImplementer)
        );
        assert_eq!(ledger.total_supply(), 0);
        assert_eq!(ledger.total_main_ids(), 0);
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn test_rejection_reason_propagates_verbatim() {
        let target = account(9);
        let mut ledger = Dlt::default();
        ledger.install_receiver(target, Arc::new(Revertable));

        assert_eq!(
            ledger.mint(target, 1, 1, 5_000),
            Err(Error::RejectedByReceiver(
                "deliveries are refused here".to_string()
            ))
        );
        assert_eq!(ledger.total_supply(), 0);
    }

    #[test]
    fn test_wrong_token_is_a_rejection() {
        let target = account(9);
        let mut ledger = Dlt::default();
        ledger.install_receiver(target, Arc::new(WrongToken));

        assert!(matches!(
            ledger.mint(target, 1, 1, 1),
            Err(Error::RejectedByReceiver(_))
        ));
        assert_eq!(ledger.total_supply(), 0);
    }

    #[test]
    fn test_safe_transfer_to_plain_account_skips_hook() {
        let owner = account(1);
        let other = account(2);
        let mut ledger = ledger_with_supply(owner);
        ledger
            .safe_transfer_from(owner, owner, other, 1, 1, 100, &[])
            .unwrap();
        assert_eq!(ledger.balance_of(other, 1, 1), 100);
    }

    #[test]
    fn test_safe_transfer_rejection_restores_everything() {
        let owner = account(1);
        let spender = account(2);
        let target = account(9);
        let mut ledger = ledger_with_supply(owner);
        ledger.install_receiver(target, Arc::new(Revertable));
        ledger.approve(owner, spender, 1, 1, 10_000).unwrap();
        let events_before = ledger.events().len();

        assert!(matches!(
            ledger.safe_transfer_from(spender, owner, target, 1, 1, 100, &[]),
            Err(Error::RejectedByReceiver(_))
        ));

        assert_eq!(ledger.balance_of(owner, 1, 1), 10_000);
        assert_eq!(ledger.balance_of(target, 1, 1), 0);
        // The staged allowance decrement was rolled back with the rest
        assert_eq!(ledger.allowance(owner, spender, 1, 1), 10_000);
        assert_eq!(ledger.events().len(), events_before);
    }

    #[test]
    fn test_batch_hook_sees_full_arrays() {
        let owner = account(1);
        let target = account(9);
        let receiver = Arc::new(Accepting::default());
        let mut ledger = ledger_with_supply(owner);
        ledger.mint(owner, 2, 3, 500).unwrap();
        ledger.install_receiver(target, receiver.clone());

        ledger
            .safe_batch_transfer_from(owner, owner, target, &[1, 2], &[1, 3], &[10, 20], &[])
            .unwrap();
        assert_eq!(*receiver.batch_calls.borrow(), 1);
        assert_eq!(ledger.balance_of(target, 2, 3), 20);
    }

    /// Burns part of what it receives before acknowledging
    struct ReentrantBurner {
        own_address: Address,
    }

    impl DltReceiver for ReentrantBurner {
        fn on_dlt_received(
            &self,
            ledger: &mut Dlt,
            _operator: Address,
            _from: Address,
            main_id: MainId,
            sub_id: SubId,
            amount: Amount,
            _data: &[u8],
        ) -> HookResult {
            // Reentry observes post-transfer state, so the received units
            // are already spendable here.
            ledger
                .burn(self.own_address, main_id, sub_id, amount / 2)
                .map_err(|e| e.to_string())?;
            Ok(Ack::single())
        }

        fn on_dlt_batch_received(
            &self,
            _ledger: &mut Dlt,
            _operator: Address,
            _from: Address,
            _main_ids: &[MainId],
            _sub_ids: &[SubId],
            _amounts: &[Amount],
            _data: &[u8],
        ) -> HookResult {
            Ok(Ack::batch())
        }
    }

    #[test]
    fn test_reentrant_hook_sees_committed_state() {
        let target = account(9);
        let mut ledger = Dlt::default();
        ledger.install_receiver(target, Arc::new(ReentrantBurner { own_address: target }));

        ledger.mint(target, 1, 1, 100).unwrap();
        assert_eq!(ledger.balance_of(target, 1, 1), 50);
        assert_eq!(ledger.total_supply(), 50);
    }

    /// Moves the delivery onward, then refuses it anyway
    struct ReentrantThenReject {
        own_address: Address,
        accomplice: Address,
    }

    impl DltReceiver for ReentrantThenReject {
        fn on_dlt_received(
            &self,
            ledger: &mut Dlt,
            _operator: Address,
            _from: Address,
            main_id: MainId,
            sub_id: SubId,
            amount: Amount,
            _data: &[u8],
        ) -> HookResult {
            ledger
                .transfer(self.own_address, self.accomplice, main_id, sub_id, amount)
                .map_err(|e| e.to_string())?;
            Err("changed my mind".to_string())
        }

        fn on_dlt_batch_received(
            &self,
            _ledger: &mut Dlt,
            _operator: Address,
            _from: Address,
            _main_ids: &[MainId],
            _sub_ids: &[SubId],
            _amounts: &[Amount],
            _data: &[u8],
        ) -> HookResult {
            Err("changed my mind".to_string())
        }
    }

    #[test]
    fn test_rejection_unwinds_reentrant_effects() {
        let owner = account(1);
        let target = account(9);
        let accomplice = account(8);
        let mut ledger = ledger_with_supply(owner);
        ledger.install_receiver(
            target,
            Arc::new(ReentrantThenReject {
                own_address: target,
                accomplice,
            }),
        );

        assert!(matches!(
            ledger.safe_transfer_from(owner, owner, target, 1, 1, 1_000, &[]),
            Err(Error::RejectedByReceiver(_))
        ));

        // The onward transfer made inside the hook is gone too
        assert_eq!(ledger.balance_of(owner, 1, 1), 10_000);
        assert_eq!(ledger.balance_of(target, 1, 1), 0);
        assert_eq!(ledger.balance_of(accomplice, 1, 1), 0);
    }

    #[test]
    fn test_events_cover_the_lifecycle() {
        let owner = account(1);
        let spender = account(2);
        let mut ledger = Dlt::default();

        ledger.mint(owner, 1, 1, 100).unwrap();
        ledger.approve(owner, spender, 1, 1, 100).unwrap();
        ledger.transfer_from(spender, owner, spender, 1, 1, 40).unwrap();
        ledger.burn(spender, 1, 1, 40).unwrap();

        let events = ledger.take_events();
        assert_eq!(events.len(), 4);
        assert!(matches!(
            events[0],
            Event::Transfer { from, amount: 100, .. } if from.is_zero()
        ));
        assert!(matches!(events[1], Event::Approval { amount: 100, .. }));
        assert!(matches!(
            events[2],
            Event::Transfer { operator, amount: 40, .. } if operator == spender
        ));
        assert!(matches!(
            events[3],
            Event::Transfer { to, amount: 40, .. } if to.is_zero()
        ));
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn test_metrics_count_successes_only() {
        let owner = account(1);
        let mut ledger = Dlt::default();

        ledger.mint(owner, 1, 1, 100).unwrap();
        let _ = ledger.mint(Address::ZERO, 1, 1, 100);
        ledger.transfer(owner, account(2), 1, 1, 10).unwrap();

        assert_eq!(ledger.metrics().mints_total.get(), 1);
        assert_eq!(ledger.metrics().transfers_total.get(), 1);
        assert_eq!(ledger.metrics().burns_total.get(), 0);
    }

    #[test]
    fn test_balance_of_batch() {
        let owner = account(1);
        let mut ledger = ledger_with_supply(owner);
        ledger.mint(owner, 2, 1, 42).unwrap();

        let balances = ledger
            .balance_of_batch(&[owner, owner], &[1, 2], &[1, 1])
            .unwrap();
        assert_eq!(balances, vec![10_000, 42]);

        assert_eq!(
            ledger.balance_of_batch(&[owner], &[1, 2], &[1, 1]),
            Err(Error::LengthMismatch { left: 1, right: 2 })
        );
    }
}
