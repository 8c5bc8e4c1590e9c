//! In-memory ledger state
//!
//! All persistent maps live here: balances with their per-mainId aggregates,
//! supply counters, allowances, operator approvals, permit nonces, and the
//! pending notification buffer. `credit` and `debit` are the only balance
//! mutators; each moves the fine balance, the main aggregate, the sub and
//! main supplies, the total supply, and registry membership together, so a
//! partial update is never observable. Records are created on first mint and
//! removed again once they return to zero, which keeps "absent" and "zero"
//! interchangeable.
//!
//! `State` is `Clone`: the transfer engine snapshots it before operations
//! that can still fail after mutation (receiver hooks) and restores the
//! snapshot on failure.

use crate::{
    error::{Error, Result},
    registry::Registry,
    types::{Address, Amount, Event, MainId, SubId},
};
use std::collections::HashMap;

/// One account's holdings under a single mainId
#[derive(Debug, Clone, Default)]
struct MainHolding {
    /// Sum of the sub-balances below
    total: Amount,
    subs: HashMap<SubId, Amount>,
}

/// The full mutable state graph of one ledger instance
#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    balances: HashMap<Address, HashMap<MainId, MainHolding>>,
    main_supply: HashMap<MainId, Amount>,
    sub_supply: HashMap<MainId, HashMap<SubId, Amount>>,
    total_supply: Amount,
    allowances: HashMap<(Address, Address, MainId, SubId), Amount>,
    operators: HashMap<(Address, Address), bool>,
    nonces: HashMap<Address, u64>,
    pub(crate) registry: Registry,
    pub(crate) events: Vec<Event>,
}

impl State {
    // Balance and supply reads; unrecorded keys are implicit zeros.

    pub(crate) fn balance_of(&self, account: Address, main_id: MainId, sub_id: SubId) -> Amount {
        self.balances
            .get(&account)
            .and_then(|mains| mains.get(&main_id))
            .and_then(|holding| holding.subs.get(&sub_id))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn main_balance_of(&self, account: Address, main_id: MainId) -> Amount {
        self.balances
            .get(&account)
            .and_then(|mains| mains.get(&main_id))
            .map_or(0, |holding| holding.total)
    }

    pub(crate) fn main_supply(&self, main_id: MainId) -> Amount {
        self.main_supply.get(&main_id).copied().unwrap_or(0)
    }

    pub(crate) fn sub_supply(&self, main_id: MainId, sub_id: SubId) -> Amount {
        self.sub_supply
            .get(&main_id)
            .and_then(|subs| subs.get(&sub_id))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Add `amount` to (account, mainId, subId), maintaining every aggregate
    /// and registering the ids on the 0 -> nonzero supply transition.
    pub(crate) fn credit(
        &mut self,
        account: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
    ) -> Result<()> {
        if account.is_zero() {
            return Err(Error::InvalidAccount);
        }
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }

        let subs = self.sub_supply.entry(main_id).or_default();
        let supply = subs.entry(sub_id).or_insert(0);
        let first_unit = *supply == 0;
        *supply = supply.checked_add(amount).expect("sub supply overflow");

        let main = self.main_supply.entry(main_id).or_insert(0);
        *main = main.checked_add(amount).expect("main supply overflow");
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .expect("total supply overflow");

        let holding = self
            .balances
            .entry(account)
            .or_default()
            .entry(main_id)
            .or_default();
        holding.total = holding
            .total
            .checked_add(amount)
            .expect("main aggregate overflow");
        let balance = holding.subs.entry(sub_id).or_insert(0);
        *balance = balance.checked_add(amount).expect("balance overflow");

        if first_unit {
            self.registry.register(main_id, sub_id);
        }
        Ok(())
    }

    /// Remove `amount` from (account, mainId, subId), maintaining every
    /// aggregate and deregistering the ids on the nonzero -> 0 supply
    /// transition. Emptied records are deleted so they revert to "absent".
    pub(crate) fn debit(
        &mut self,
        account: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
    ) -> Result<()> {
        if account.is_zero() {
            return Err(Error::InvalidAccount);
        }
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let balance = self.balance_of(account, main_id, sub_id);
        if balance < amount {
            return Err(Error::InsufficientBalance {
                balance,
                needed: amount,
            });
        }

        // Holder side. The lookups cannot miss: the balance check above
        // guarantees every level exists.
        let mains = self.balances.get_mut(&account).expect("balance checked");
        let holding = mains.get_mut(&main_id).expect("balance checked");
        holding.total -= amount;
        let sub_balance = holding.subs.get_mut(&sub_id).expect("balance checked");
        *sub_balance -= amount;
        if *sub_balance == 0 {
            holding.subs.remove(&sub_id);
        }
        if holding.total == 0 {
            mains.remove(&main_id);
        }
        if mains.is_empty() {
            self.balances.remove(&account);
        }

        // Supply side
        let subs = self.sub_supply.get_mut(&main_id).expect("supply covers balance");
        let supply = subs.get_mut(&sub_id).expect("supply covers balance");
        *supply -= amount;
        let exhausted = *supply == 0;
        if exhausted {
            subs.remove(&sub_id);
            if subs.is_empty() {
                self.sub_supply.remove(&main_id);
            }
        }
        let main = self.main_supply.get_mut(&main_id).expect("supply covers balance");
        *main -= amount;
        if *main == 0 {
            self.main_supply.remove(&main_id);
        }
        self.total_supply -= amount;

        if exhausted {
            self.registry.deregister(main_id, sub_id);
        }
        Ok(())
    }

    // Authorization records. Allowances persist at zero after consumption;
    // operator flags and nonces live for the account's lifetime.

    pub(crate) fn allowance(
        &self,
        owner: Address,
        spender: Address,
        main_id: MainId,
        sub_id: SubId,
    ) -> Amount {
        self.allowances
            .get(&(owner, spender, main_id, sub_id))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn set_allowance(
        &mut self,
        owner: Address,
        spender: Address,
        main_id: MainId,
        sub_id: SubId,
        amount: Amount,
    ) {
        self.allowances
            .insert((owner, spender, main_id, sub_id), amount);
    }

    pub(crate) fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.operators
            .get(&(owner, operator))
            .copied()
            .unwrap_or(false)
    }

    pub(crate) fn set_operator(&mut self, owner: Address, operator: Address, approved: bool) {
        self.operators.insert((owner, operator), approved);
    }

    pub(crate) fn nonce(&self, account: Address) -> u64 {
        self.nonces.get(&account).copied().unwrap_or(0)
    }

    /// Consume the account's current nonce, returning the value that was
    /// spent
    pub(crate) fn bump_nonce(&mut self, account: Address) -> u64 {
        let counter = self.nonces.entry(account).or_insert(0);
        let spent = *counter;
        *counter += 1;
        spent
    }
}
