//! Per-node on-disk chain storage.
//!
//! Layout inside the node's data directory:
//!
//! - `chain.json`: array of blocks in commit order (source of truth),
//! - `accounts.json`: array of `[address, {balance, nonce}]` entries
//!   (cache, regenerable from the chain),
//!
//! next to the `keypair.pub` / `keypair.priv` PEM files managed by
//! [`crate::crypto::Keypair`]. Writes go through a temp file followed by
//! a rename so a crash mid-write leaves the previous file intact.

use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{Account, Address, Block};

use super::{ChainStore, StorageError};

/// File holding the committed chain.
pub const CHAIN_FILE: &str = "chain.json";
/// File holding the derived accounts cache.
pub const ACCOUNTS_FILE: &str = "accounts.json";

/// JSON-file-backed [`ChainStore`].
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Opens (creating if needed) the data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(DiskStore { dir })
    }

    /// Directory this store writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_atomic(&self, file: &str, contents: &[u8]) -> Result<(), StorageError> {
        let tmp = self.dir.join(format!("{file}.tmp"));
        let target = self.dir.join(file);
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }
}

impl ChainStore for DiskStore {
    fn load_chain(&self) -> Result<Vec<Block>, StorageError> {
        let path = self.dir.join(CHAIN_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| StorageError::CorruptChain(e.to_string()))
    }

    fn persist_chain(&mut self, chain: &[Block]) -> Result<(), StorageError> {
        let json = serde_json::to_vec(chain)
            .map_err(|e| StorageError::CorruptChain(format!("encode chain: {e}")))?;
        self.write_atomic(CHAIN_FILE, &json)
    }

    fn load_accounts(&self) -> Option<Vec<(Address, Account)>> {
        let path = self.dir.join(ACCOUNTS_FILE);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(entries) => Some(entries),
            Err(e) => {
                tracing::warn!("accounts cache unreadable, will replay chain: {e}");
                None
            }
        }
    }

    fn persist_accounts(&mut self, accounts: &[(Address, Account)]) -> Result<(), StorageError> {
        let json = serde_json::to_vec(accounts)
            .map_err(|e| StorageError::CorruptChain(format!("encode accounts: {e}")))?;
        self.write_atomic(ACCOUNTS_FILE, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::types::Hash256;

    #[test]
    fn missing_chain_file_is_an_empty_chain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DiskStore::open(dir.path()).expect("open");
        assert!(store.load_chain().expect("load").is_empty());
    }

    #[test]
    fn chain_roundtrips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = DiskStore::open(dir.path()).expect("open");

        let kp = Keypair::generate();
        let block = crate::testutil::bare_block(&kp, 1, Hash256::ZERO);
        store.persist_chain(&[block.clone()]).expect("persist");

        let loaded = store.load_chain().expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].hash, block.hash);
    }

    #[test]
    fn corrupt_chain_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DiskStore::open(dir.path()).expect("open");
        fs::write(dir.path().join(CHAIN_FILE), b"{ not json").expect("write garbage");
        assert!(matches!(
            store.load_chain(),
            Err(StorageError::CorruptChain(_))
        ));
    }

    #[test]
    fn corrupt_accounts_cache_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = DiskStore::open(dir.path()).expect("open");
        fs::write(dir.path().join(ACCOUNTS_FILE), b"[[broken").expect("write garbage");
        assert!(store.load_accounts().is_none());

        let addr = Keypair::generate().address();
        let acct = Account {
            balance: 10,
            nonce: 2,
        };
        store.persist_accounts(&[(addr, acct)]).expect("persist");
        let loaded = store.load_accounts().expect("cache present");
        assert_eq!(loaded, vec![(addr, acct)]);
    }
}
