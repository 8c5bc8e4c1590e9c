//! Enumerable identifier registries
//!
//! Tracks which mainIds currently carry nonzero supply and, per mainId,
//! which subIds do. Sets store their entries in a dense vector with an
//! id -> position map on the side: insertion appends, removal swaps the tail
//! entry into the vacated slot and fixes its recorded position. Both are
//! O(1); the price is that enumeration order may change on removal.

use crate::types::{MainId, SubId};
use std::collections::HashMap;

/// Enumerable set of identifiers with O(1) add-if-absent and
/// remove-if-present
#[derive(Debug, Clone, Default)]
pub struct IdSet {
    items: Vec<u64>,
    positions: HashMap<u64, usize>,
}

impl IdSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id`; returns false (and does nothing) if it is already present
    pub fn insert(&mut self, id: u64) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }
        self.positions.insert(id, self.items.len());
        self.items.push(id);
        true
    }

    /// Remove `id` by swapping the last entry into its slot; returns false
    /// (and does nothing) if it is absent
    pub fn remove(&mut self, id: u64) -> bool {
        let Some(position) = self.positions.remove(&id) else {
            return false;
        };
        let last = self.items.pop().expect("positions and items agree");
        if last != id {
            self.items[position] = last;
            self.positions.insert(last, position);
        }
        true
    }

    /// Membership test
    pub fn contains(&self, id: u64) -> bool {
        self.positions.contains_key(&id)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries in their current (unspecified) order
    pub fn as_slice(&self) -> &[u64] {
        &self.items
    }
}

const EMPTY: &[u64] = &[];

/// Two-level registry: the set of active mainIds and, per mainId, the set of
/// active subIds
///
/// An id is active exactly while its supply is nonzero; the ledger drives
/// `register`/`deregister` from the 0 <-> nonzero supply transitions.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    main_ids: IdSet,
    sub_ids: HashMap<MainId, IdSet>,
}

impl Registry {
    /// Record that (mainId, subId) just received its first unit
    pub fn register(&mut self, main_id: MainId, sub_id: SubId) {
        self.main_ids.insert(main_id);
        self.sub_ids.entry(main_id).or_default().insert(sub_id);
    }

    /// Record that (mainId, subId) just lost its last unit; drops the mainId
    /// too when no subId under it remains active
    pub fn deregister(&mut self, main_id: MainId, sub_id: SubId) {
        if let Some(subs) = self.sub_ids.get_mut(&main_id) {
            subs.remove(sub_id);
            if subs.is_empty() {
                self.sub_ids.remove(&main_id);
                self.main_ids.remove(main_id);
            }
        }
    }

    /// Whether `main_id` currently has nonzero supply
    pub fn contains_main(&self, main_id: MainId) -> bool {
        self.main_ids.contains(main_id)
    }

    /// Whether (mainId, subId) currently has nonzero supply
    pub fn contains_sub(&self, main_id: MainId, sub_id: SubId) -> bool {
        self.sub_ids
            .get(&main_id)
            .is_some_and(|subs| subs.contains(sub_id))
    }

    /// Number of active mainIds
    pub fn total_main_ids(&self) -> usize {
        self.main_ids.len()
    }

    /// Number of active subIds under `main_id`
    pub fn total_sub_ids(&self, main_id: MainId) -> usize {
        self.sub_ids.get(&main_id).map_or(0, IdSet::len)
    }

    /// Active mainIds in their current (unspecified) order
    pub fn main_ids(&self) -> &[MainId] {
        self.main_ids.as_slice()
    }

    /// Active subIds under `main_id` in their current (unspecified) order
    pub fn sub_ids(&self, main_id: MainId) -> &[SubId] {
        self.sub_ids.get(&main_id).map_or(EMPTY, IdSet::as_slice)
    }
}
