//! Committed chain and derived account state.
//!
//! The ledger exclusively owns the block log and the account map. The
//! chain file is the canonical source: the account map is a cache that
//! [`Ledger::replay`] can rebuild from genesis at any time. Persistence
//! failures during [`Ledger::append`] are fatal: a commit is never
//! advertised before it is durable.
//!
//! Slashing is a local, per-observer side effect: the debit is applied to
//! the observer's account map (and re-applied after replay) but is not
//! recorded in any block.

use std::collections::{HashMap, HashSet};

use crate::crypto;
use crate::merkle::{self, ProofStep};
use crate::storage::{ChainStore, StorageError};
use crate::types::{Account, Address, Block, BlockHeader, Hash256, Transaction, TxSender};

/// Errors raised by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The stored chain fails hash or linkage verification. The node
    /// refuses to start on this.
    #[error("chain verification failed: {0}")]
    BrokenChain(String),
    /// A block was appended out of epoch order.
    #[error("block epoch {got} is not the successor of head epoch {head}")]
    NonSuccessor { head: u64, got: u64 },
}

/// Inclusion proof for a committed transaction, anchored at a block's
/// `txRoot`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxProof {
    pub block_epoch: u64,
    pub block_hash: Hash256,
    pub tx_root: Hash256,
    pub proof: Vec<ProofStep>,
}

/// Read-only view of account state, the seam between the ledger and the
/// deterministic transaction filter.
pub trait AccountLookup {
    /// Account for `addr`; missing accounts read as `(0, 0)`.
    fn account_of(&self, addr: &Address) -> Account;
}

impl AccountLookup for HashMap<Address, Account> {
    fn account_of(&self, addr: &Address) -> Account {
        self.get(addr).copied().unwrap_or_default()
    }
}

impl<S: ChainStore> AccountLookup for Ledger<S> {
    fn account_of(&self, addr: &Address) -> Account {
        Ledger::account_of(self, addr)
    }
}

/// Append-only block log plus the derived account map.
pub struct Ledger<S: ChainStore> {
    store: S,
    chain: Vec<Block>,
    accounts: HashMap<Address, Account>,
    /// Slash debits actually applied, by address. Slashed-once per chain;
    /// re-applied after every replay so the cache stays consistent.
    slashed: HashMap<Address, u64>,
    /// Dedup keys of every transaction committed so far, for idempotent
    /// ingress.
    committed_tx_keys: HashSet<String>,
}

impl<S: ChainStore> Ledger<S> {
    /// Opens the ledger from a store.
    ///
    /// The chain is loaded and fully verified (content hashes and
    /// `previousHash` linkage); a broken chain refuses to load. The
    /// accounts cache is used when parsable, otherwise the chain is
    /// replayed.
    pub fn open(store: S) -> Result<Self, LedgerError> {
        let chain = store.load_chain()?;
        Self::verify_chain(&chain)?;

        let mut ledger = Ledger {
            store,
            chain,
            accounts: HashMap::new(),
            slashed: HashMap::new(),
            committed_tx_keys: HashSet::new(),
        };

        match ledger.store.load_accounts() {
            Some(entries) => {
                ledger.accounts = entries.into_iter().collect();
            }
            None => ledger.rebuild_accounts(),
        }
        for block in &ledger.chain {
            for tx in &block.transactions {
                ledger.committed_tx_keys.insert(tx.dedup_key());
            }
        }
        Ok(ledger)
    }

    /// Verifies content hashes, epoch succession, and hash linkage of a
    /// candidate chain.
    pub fn verify_chain(chain: &[Block]) -> Result<(), LedgerError> {
        let mut prev_hash = Hash256::ZERO;
        let mut prev_epoch = 0u64;
        for block in chain {
            if block.compute_hash() != block.hash {
                return Err(LedgerError::BrokenChain(format!(
                    "content hash mismatch at epoch {}",
                    block.epoch
                )));
            }
            if block.epoch != prev_epoch + 1 {
                return Err(LedgerError::BrokenChain(format!(
                    "epoch gap: {} follows {}",
                    block.epoch, prev_epoch
                )));
            }
            if block.previous_hash != prev_hash {
                return Err(LedgerError::BrokenChain(format!(
                    "previousHash linkage broken at epoch {}",
                    block.epoch
                )));
            }
            prev_hash = block.hash;
            prev_epoch = block.epoch;
        }
        Ok(())
    }

    /// Epoch and hash of the committed head; `(0, ZERO)` for an empty
    /// chain.
    pub fn head(&self) -> (u64, Hash256) {
        match self.chain.last() {
            Some(b) => (b.epoch, b.hash),
            None => (0, Hash256::ZERO),
        }
    }

    /// Number of committed blocks.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Returns `true` for an empty chain.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Full committed chain, oldest first.
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    /// Clones the most recent `limit` blocks, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<Block> {
        let start = self.chain.len().saturating_sub(limit);
        self.chain[start..].to_vec()
    }

    /// Account state for `addr`.
    pub fn account_of(&self, addr: &Address) -> Account {
        self.accounts.account_of(addr)
    }

    /// Whether a transaction with this dedup key has already been
    /// committed.
    pub fn has_committed_tx(&self, dedup_key: &str) -> bool {
        self.committed_tx_keys.contains(dedup_key)
    }

    /// Appends a consensus-validated block.
    ///
    /// Atomically applies rewards, then the transactions in listed
    /// order, and persists chain + accounts. A persistence failure here
    /// is fatal to the caller.
    pub fn append(&mut self, block: Block) -> Result<(), LedgerError> {
        let (head_epoch, head_hash) = self.head();
        if block.epoch != head_epoch + 1 {
            return Err(LedgerError::NonSuccessor {
                head: head_epoch,
                got: block.epoch,
            });
        }
        if block.previous_hash != head_hash {
            // Provisional catch-up accept: consensus validated the block
            // as our head's immediate successor by epoch, but we have not
            // seen its ancestor. The next sync pass reconciles the chain.
            tracing::warn!(
                epoch = block.epoch,
                "appending block with unknown ancestor (catch-up)"
            );
        }

        Self::apply_block(&mut self.accounts, &block);
        for tx in &block.transactions {
            self.committed_tx_keys.insert(tx.dedup_key());
        }
        self.chain.push(block);
        self.persist()?;
        Ok(())
    }

    /// Clears the account map and reapplies every block from genesis,
    /// then re-applies recorded slash debits.
    pub fn replay(&mut self) {
        self.rebuild_accounts();
        self.committed_tx_keys.clear();
        for block in &self.chain {
            for tx in &block.transactions {
                self.committed_tx_keys.insert(tx.dedup_key());
            }
        }
    }

    fn rebuild_accounts(&mut self) {
        self.accounts.clear();
        for block in &self.chain {
            Self::apply_block(&mut self.accounts, block);
        }
        for (addr, debit) in &self.slashed {
            let acct = self.accounts.entry(*addr).or_default();
            acct.balance = acct.balance.saturating_sub(*debit);
        }
    }

    /// Replaces the whole chain (gossip catch-up), verifying it first,
    /// then replays and persists. The swap is atomic with respect to the
    /// owning event loop.
    pub fn replace_chain(&mut self, chain: Vec<Block>) -> Result<(), LedgerError> {
        Self::verify_chain(&chain)?;
        self.chain = chain;
        self.replay();
        self.persist()?;
        Ok(())
    }

    /// Applies one block to an account map: rewards first, then the
    /// transactions in listed order.
    pub fn apply_block(accounts: &mut HashMap<Address, Account>, block: &Block) {
        for (addr, amount) in &block.rewards {
            accounts.entry(*addr).or_default().balance += amount;
        }
        for tx in &block.transactions {
            Self::apply_tx(accounts, tx);
        }
    }

    fn apply_tx(accounts: &mut HashMap<Address, Account>, tx: &Transaction) {
        match tx.from {
            TxSender::Coinbase => {
                accounts.entry(tx.to).or_default().balance += tx.amount;
            }
            TxSender::Addr(from) => {
                let sender = accounts.entry(from).or_default();
                debug_assert!(sender.balance >= tx.amount, "filter admitted an overdraft");
                sender.balance = sender.balance.saturating_sub(tx.amount);
                sender.nonce = tx.nonce;
                accounts.entry(tx.to).or_default().balance += tx.amount;
            }
        }
    }

    /// Block at the given epoch, if committed.
    pub fn block_at(&self, epoch: u64) -> Option<&Block> {
        // Epochs are dense and 1-based along the committed chain.
        epoch
            .checked_sub(1)
            .and_then(|i| self.chain.get(i as usize))
            .filter(|b| b.epoch == epoch)
            .or_else(|| self.chain.iter().find(|b| b.epoch == epoch))
    }

    /// Block with the given hash, if committed.
    pub fn block_by_hash(&self, hash: &Hash256) -> Option<&Block> {
        self.chain.iter().rev().find(|b| b.hash == *hash)
    }

    /// Headers of the most recent `limit` blocks, oldest first.
    pub fn headers(&self, limit: usize) -> Vec<BlockHeader> {
        let start = self.chain.len().saturating_sub(limit);
        self.chain[start..].iter().map(Block::header).collect()
    }

    /// Merkle inclusion proof for a committed transaction.
    pub fn proof_for(&self, tx_hash: &Hash256) -> Option<TxProof> {
        for block in self.chain.iter().rev() {
            let leaves: Vec<Hash256> = block
                .transactions
                .iter()
                .map(crypto::hash_canonical)
                .collect();
            if let Some(index) = leaves.iter().position(|l| l == tx_hash) {
                let proof = merkle::proof(&leaves, index)?;
                return Some(TxProof {
                    block_epoch: block.epoch,
                    block_hash: block.hash,
                    tx_root: block.tx_root,
                    proof,
                });
            }
        }
        None
    }

    /// Applies an equivocation slash to `addr`.
    ///
    /// Debits `min(balance, amount)`, at most once per address for the
    /// lifetime of this chain. Returns the debit actually applied, or
    /// `None` when the address was already slashed.
    pub fn apply_slash(&mut self, addr: Address, amount: u64) -> Result<Option<u64>, LedgerError> {
        if self.slashed.contains_key(&addr) {
            return Ok(None);
        }
        let acct = self.accounts.entry(addr).or_default();
        let debit = acct.balance.min(amount);
        acct.balance -= debit;
        self.slashed.insert(addr, debit);
        self.persist_accounts()?;
        Ok(Some(debit))
    }

    /// Whether `addr` has been slashed on this chain.
    pub fn is_slashed(&self, addr: &Address) -> bool {
        self.slashed.contains_key(addr)
    }

    /// Number of addresses slashed by this observer.
    pub fn slashed_count(&self) -> usize {
        self.slashed.len()
    }

    /// Sum of slash debits actually applied.
    pub fn slashed_total(&self) -> u64 {
        self.slashed.values().sum()
    }

    /// Sum of all balances. With the conservation invariant this equals
    /// total minted minus total slashed.
    pub fn total_balance(&self) -> u64 {
        self.accounts.values().map(|a| a.balance).sum()
    }

    fn persist(&mut self) -> Result<(), LedgerError> {
        self.store.persist_chain(&self.chain)?;
        self.persist_accounts()
    }

    fn persist_accounts(&mut self) -> Result<(), LedgerError> {
        let mut entries: Vec<(Address, Account)> =
            self.accounts.iter().map(|(a, acct)| (*a, *acct)).collect();
        entries.sort_by_key(|(a, _)| *a);
        self.store.persist_accounts(&entries)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::storage::MemStore;
    use crate::testutil::bare_block;

    /// Minted total across a chain: rewards plus coinbase amounts.
    fn minted(chain: &[Block]) -> u64 {
        chain
            .iter()
            .map(|b| {
                b.rewards.values().sum::<u64>()
                    + b.transactions
                        .iter()
                        .filter(|tx| tx.is_coinbase())
                        .map(|tx| tx.amount)
                        .sum::<u64>()
            })
            .sum()
    }

    fn block_with_txs(
        kp: &Keypair,
        epoch: u64,
        previous_hash: Hash256,
        txs: Vec<Transaction>,
    ) -> Block {
        let mut block = bare_block(kp, epoch, previous_hash);
        block.transactions = txs;
        block.tx_root = merkle::root(
            &block
                .transactions
                .iter()
                .map(crypto::hash_canonical)
                .collect::<Vec<_>>(),
        );
        block.hash = block.compute_hash();
        block.leader_signature = kp.sign(block.hash.as_bytes());
        block
    }

    #[test]
    fn empty_ledger_has_zero_head() {
        let ledger = Ledger::open(MemStore::new()).expect("open");
        assert_eq!(ledger.head(), (0, Hash256::ZERO));
        assert_eq!(ledger.account_of(&crate::testutil::dummy_addr(1)), Account::default());
    }

    #[test]
    fn append_applies_coinbase_and_transfer() {
        let leader = Keypair::generate();
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let mut ledger = Ledger::open(MemStore::new()).expect("open");

        let mint = Transaction::coinbase(alice.address(), 1_000, 42);
        let b1 = block_with_txs(&leader, 1, Hash256::ZERO, vec![mint]);
        ledger.append(b1.clone()).expect("append 1");
        assert_eq!(ledger.account_of(&alice.address()).balance, 1_000);
        // Coinbase never advances the recipient nonce.
        assert_eq!(ledger.account_of(&alice.address()).nonce, 0);

        let pay = Transaction::signed(&alice, bob.address(), 100, 1, 43);
        let b2 = block_with_txs(&leader, 2, b1.hash, vec![pay]);
        ledger.append(b2).expect("append 2");

        let a = ledger.account_of(&alice.address());
        assert_eq!((a.balance, a.nonce), (900, 1));
        assert_eq!(ledger.account_of(&bob.address()).balance, 100);
    }

    #[test]
    fn append_rejects_epoch_gap() {
        let leader = Keypair::generate();
        let mut ledger = Ledger::open(MemStore::new()).expect("open");
        let b3 = bare_block(&leader, 3, Hash256::ZERO);
        assert!(matches!(
            ledger.append(b3),
            Err(LedgerError::NonSuccessor { head: 0, got: 3 })
        ));
    }

    #[test]
    fn replay_matches_incremental_state() {
        let leader = Keypair::generate();
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let mut ledger = Ledger::open(MemStore::new()).expect("open");

        let b1 = block_with_txs(
            &leader,
            1,
            Hash256::ZERO,
            vec![Transaction::coinbase(alice.address(), 500, 1)],
        );
        let b2 = block_with_txs(
            &leader,
            2,
            b1.hash,
            vec![Transaction::signed(&alice, bob.address(), 123, 1, 2)],
        );
        ledger.append(b1).expect("append 1");
        ledger.append(b2).expect("append 2");

        let before: HashMap<Address, Account> = ledger.accounts.clone();
        ledger.replay();
        assert_eq!(ledger.accounts, before);
    }

    #[test]
    fn conservation_holds_after_slash() {
        let leader = Keypair::generate();
        let alice = Keypair::generate();
        let mut ledger = Ledger::open(MemStore::new()).expect("open");

        let b1 = block_with_txs(
            &leader,
            1,
            Hash256::ZERO,
            vec![Transaction::coinbase(alice.address(), 300, 1)],
        );
        ledger.append(b1).expect("append");

        let debit = ledger
            .apply_slash(alice.address(), 500)
            .expect("slash io")
            .expect("first slash applies");
        assert_eq!(debit, 300); // min(balance, slashAmount)
        assert_eq!(
            ledger.total_balance(),
            minted(ledger.chain()) - ledger.slashed_total()
        );

        // Slashed-once semantics.
        assert!(ledger.apply_slash(alice.address(), 500).expect("io").is_none());
        assert_eq!(ledger.slashed_count(), 1);

        // Replay keeps the slash debit.
        ledger.replay();
        assert_eq!(ledger.account_of(&alice.address()).balance, 0);
    }

    #[test]
    fn proof_for_committed_tx_verifies() {
        let leader = Keypair::generate();
        let alice = Keypair::generate();
        let mut ledger = Ledger::open(MemStore::new()).expect("open");

        let txs = vec![
            Transaction::coinbase(alice.address(), 10, 1),
            Transaction::coinbase(alice.address(), 20, 2),
            Transaction::coinbase(alice.address(), 30, 3),
        ];
        let b1 = block_with_txs(&leader, 1, Hash256::ZERO, txs.clone());
        ledger.append(b1).expect("append");

        let target = txs[1].tx_hash();
        let proof = ledger.proof_for(&target).expect("tx committed");
        assert_eq!(proof.block_epoch, 1);
        assert!(merkle::verify(target, &proof.proof, proof.tx_root));

        assert!(ledger.proof_for(&Hash256([9u8; 32])).is_none());
    }

    #[test]
    fn broken_linkage_refuses_to_open() {
        let leader = Keypair::generate();
        let mut store = MemStore::new();
        let b1 = bare_block(&leader, 1, Hash256::ZERO);
        // Second block does not link to the first.
        let b2 = bare_block(&leader, 2, Hash256([7u8; 32]));
        store.persist_chain(&[b1, b2]).expect("persist");

        assert!(matches!(
            Ledger::open(store),
            Err(LedgerError::BrokenChain(_))
        ));
    }

    #[test]
    fn missing_accounts_cache_triggers_replay_on_open() {
        let leader = Keypair::generate();
        let alice = Keypair::generate();

        let mut store = MemStore::new();
        let b1 = block_with_txs(
            &leader,
            1,
            Hash256::ZERO,
            vec![Transaction::coinbase(alice.address(), 77, 1)],
        );
        store.persist_chain(&[b1]).expect("persist chain only");

        let ledger = Ledger::open(store).expect("open");
        assert_eq!(ledger.account_of(&alice.address()).balance, 77);
    }

    #[test]
    fn committed_tx_keys_survive_reopen() {
        let leader = Keypair::generate();
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        let pay = Transaction::signed(&alice, bob.address(), 5, 1, 9);
        let key = pay.dedup_key();

        let mut store = MemStore::new();
        let b1 = block_with_txs(
            &leader,
            1,
            Hash256::ZERO,
            vec![Transaction::coinbase(alice.address(), 100, 1)],
        );
        let b2 = block_with_txs(&leader, 2, b1.hash, vec![pay]);
        store.persist_chain(&[b1, b2]).expect("persist");

        let ledger = Ledger::open(store).expect("open");
        assert!(ledger.has_committed_tx(&key));
    }
}
