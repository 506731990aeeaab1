//! Per-block copy-on-read state overlay.
//!
//! While a candidate block is being assembled, every touched account is
//! copied from the global state exactly once and mutated only in the
//! overlay. Validation of a competing block can then proceed on the global
//! state without seeing half-applied assembly effects; a failed candidate is
//! simply dropped with its overlay.

use shared_types::{Account, Address};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::error::{Result, StateError};
use crate::global::GlobalState;

/// Copy-on-read snapshot of the accounts a block in flight has touched.
#[derive(Debug, Default)]
pub struct StateCopy {
    entries: HashMap<Address, Account>,
}

impl StateCopy {
    /// Create an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a mutable handle for an account, copying it from the global
    /// state on first touch. Fails if the account exists nowhere.
    pub fn touch<'a>(
        &'a mut self,
        global: &GlobalState,
        address: &Address,
    ) -> Result<&'a mut Account> {
        match self.entries.entry(*address) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let account = global
                    .get(address)
                    .cloned()
                    .ok_or(StateError::UnknownAccount(*address))?;
                Ok(entry.insert(account))
            }
        }
    }

    /// Read-only view of a touched account.
    pub fn get(&self, address: &Address) -> Option<&Account> {
        self.entries.get(address)
    }

    /// Mutable view of an already-touched account.
    pub fn get_mut(&mut self, address: &Address) -> Option<&mut Account> {
        self.entries.get_mut(address)
    }

    /// Whether the account was already touched.
    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    /// Number of touched accounts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no account was touched.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge every touched account back into the global state by address
    /// replacement.
    pub fn merge_into(self, global: &mut GlobalState) {
        for account in self.entries.into_values() {
            global.put(account);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(balance: u64) -> (GlobalState, Address) {
        let mut state = GlobalState::new();
        let mut account = Account::new([1u8; 32]);
        account.balance = balance;
        let id = account.id();
        state.put(account);
        (state, id)
    }

    #[test]
    fn test_touch_copies_once() {
        let (mut state, id) = state_with(100);
        let mut overlay = StateCopy::new();

        overlay.touch(&state, &id).unwrap().balance -= 30;
        // The global state is unchanged until merge.
        assert_eq!(state.get(&id).unwrap().balance, 100);

        // A second touch returns the already-mutated copy.
        assert_eq!(overlay.touch(&state, &id).unwrap().balance, 70);

        overlay.merge_into(&mut state);
        assert_eq!(state.get(&id).unwrap().balance, 70);
    }

    #[test]
    fn test_touch_unknown_account_fails() {
        let state = GlobalState::new();
        let mut overlay = StateCopy::new();
        assert_eq!(
            overlay.touch(&state, &[9u8; 32]).unwrap_err(),
            StateError::UnknownAccount([9u8; 32])
        );
    }

    #[test]
    fn test_dropped_overlay_leaves_state_untouched() {
        let (mut state, id) = state_with(50);
        {
            let mut overlay = StateCopy::new();
            overlay.touch(&state, &id).unwrap().balance = 0;
        }
        assert_eq!(state.get(&id).unwrap().balance, 50);
        let _ = &mut state;
    }
}
