//! Storage backends for the committed chain.
//!
//! The ledger talks to persistence through the small [`ChainStore`]
//! trait. Two implementations are provided:
//!
//! - [`mem::MemStore`]: keeps everything in memory, for tests.
//! - [`disk::DiskStore`]: the per-node directory layout used by real
//!   nodes (`chain.json` + `accounts.json`).
//!
//! The chain file is the canonical source of truth; the accounts file is
//! a cache that the ledger can always rebuild by replaying the chain.

use crate::types::{Account, Address, Block};

pub mod disk;
pub mod mem;

pub use disk::DiskStore;
pub use mem::MemStore;

/// Errors raised by chain persistence.
///
/// Write failures are fatal for the node: a commit must never be
/// advertised before it is durable. Read failures of the accounts cache
/// are recoverable by replay; a corrupt or unlinkable chain file is not.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt chain file: {0}")]
    CorruptChain(String),
}

/// Abstract persistence interface used by the ledger.
///
/// Implementations persist the whole chain vector on every call; commit
/// cadence is one block per epoch, so the simplicity wins over
/// incremental appends.
pub trait ChainStore {
    /// Loads the committed chain, oldest block first. An absent chain
    /// file is an empty chain; an unparsable one is an error.
    fn load_chain(&self) -> Result<Vec<Block>, StorageError>;

    /// Durably replaces the committed chain.
    fn persist_chain(&mut self, chain: &[Block]) -> Result<(), StorageError>;

    /// Loads the accounts cache if present and parsable; `None` means
    /// the caller should rebuild it by replaying the chain.
    fn load_accounts(&self) -> Option<Vec<(Address, Account)>>;

    /// Persists the accounts cache. Entries are `[address, account]`
    /// pairs sorted by address.
    fn persist_accounts(&mut self, accounts: &[(Address, Account)]) -> Result<(), StorageError>;
}
