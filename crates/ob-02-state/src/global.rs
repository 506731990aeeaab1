//! The global account state and root-key registry.

use shared_types::{Account, Address};
use std::collections::HashMap;

use crate::error::{Result, StateError};

/// The global mapping from account address to account.
///
/// Root accounts additionally appear in the root registry; they may sign
/// account and config transactions and are exempt from balance requirements.
#[derive(Debug, Default)]
pub struct GlobalState {
    accounts: HashMap<Address, Account>,
    root_accounts: HashMap<Address, Account>,
}

impl GlobalState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an account by address.
    pub fn get(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Look up an account, failing with `UnknownAccount`.
    pub fn get_or_err(&self, address: &Address) -> Result<&Account> {
        self.get(address)
            .ok_or(StateError::UnknownAccount(*address))
    }

    /// Mutable account lookup, failing with `UnknownAccount`.
    pub fn get_mut(&mut self, address: &Address) -> Result<&mut Account> {
        self.accounts
            .get_mut(address)
            .ok_or(StateError::UnknownAccount(*address))
    }

    /// Insert or replace an account under its derived address.
    pub fn put(&mut self, account: Account) {
        self.accounts.insert(account.id(), account);
    }

    /// Remove an account, returning it if present.
    pub fn delete(&mut self, address: &Address) -> Option<Account> {
        self.accounts.remove(address)
    }

    /// Whether an account exists at the address.
    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Whether the address belongs to a registered root account.
    pub fn is_root(&self, address: &Address) -> bool {
        self.root_accounts.contains_key(address)
    }

    /// Register a root account. It is inserted into the state as well.
    pub fn add_root(&mut self, account: Account) {
        self.root_accounts.insert(account.id(), account.clone());
        self.put(account);
    }

    /// Iterate over the registered root accounts.
    pub fn root_accounts(&self) -> impl Iterator<Item = &Account> {
        self.root_accounts.values()
    }

    /// Iterate over all accounts.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the state holds no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Sum of all balances. Used by conservation checks.
    pub fn total_balance(&self) -> u128 {
        self.accounts.values().map(|a| a.balance as u128).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_keys_by_derived_address() {
        let mut state = GlobalState::new();
        let account = Account::new([3u8; 32]);
        let id = account.id();
        state.put(account);
        assert!(state.contains(&id));
        assert!(state.get(&[3u8; 32]).is_none());
    }

    #[test]
    fn test_root_registration_inserts_into_state() {
        let mut state = GlobalState::new();
        let root = Account::new([9u8; 32]);
        let id = root.id();
        state.add_root(root);
        assert!(state.is_root(&id));
        assert!(state.contains(&id));
        assert!(!state.is_root(&[0u8; 32]));
    }

    #[test]
    fn test_unknown_account_error() {
        let mut state = GlobalState::new();
        assert_eq!(
            state.get_mut(&[1u8; 32]).unwrap_err(),
            StateError::UnknownAccount([1u8; 32])
        );
    }
}
