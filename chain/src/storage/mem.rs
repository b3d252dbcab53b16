//! In-memory chain store.
//!
//! Useful for unit tests and single-process simulations. Persisted state
//! is just cloned into fields, so "durability" is the lifetime of the
//! value.

use crate::types::{Account, Address, Block};

use super::{ChainStore, StorageError};

/// In-memory implementation of [`ChainStore`].
#[derive(Default)]
pub struct MemStore {
    chain: Vec<Block>,
    accounts: Option<Vec<(Address, Account)>>,
}

impl MemStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks currently persisted.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Returns `true` if no blocks are persisted.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl ChainStore for MemStore {
    fn load_chain(&self) -> Result<Vec<Block>, StorageError> {
        Ok(self.chain.clone())
    }

    fn persist_chain(&mut self, chain: &[Block]) -> Result<(), StorageError> {
        self.chain = chain.to_vec();
        Ok(())
    }

    fn load_accounts(&self) -> Option<Vec<(Address, Account)>> {
        self.accounts.clone()
    }

    fn persist_accounts(&mut self, accounts: &[(Address, Account)]) -> Result<(), StorageError> {
        self.accounts = Some(accounts.to_vec());
        Ok(())
    }
}
