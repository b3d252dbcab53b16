//! Pending transaction pool.
//!
//! HTTP ingress pushes transactions here; the block builder snapshots
//! them when the node leads an epoch. Submission is idempotent on the
//! transaction's dedup key (the signature for signed transfers, the
//! content hash for coinbase mints), including keys that were already
//! committed, so a replayed transaction never re-enters the pool.

use std::collections::HashSet;

use crate::types::Transaction;

/// FIFO pool of pending transactions with replay protection.
#[derive(Default)]
pub struct TxPool {
    pending: Vec<Transaction>,
    seen: HashSet<String>,
}

impl TxPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a transaction.
    ///
    /// Returns `false` without queueing when an identical submission was
    /// seen before (pending or committed).
    pub fn submit(&mut self, tx: Transaction) -> bool {
        if !self.seen.insert(tx.dedup_key()) {
            return false;
        }
        self.pending.push(tx);
        true
    }

    /// Clones the pending transactions in arrival order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.pending.clone()
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every pending transaction that was included in a committed
    /// block, keeping their dedup keys so resubmissions stay rejected.
    pub fn prune(&mut self, included: &[Transaction]) {
        let included_keys: HashSet<String> =
            included.iter().map(Transaction::dedup_key).collect();
        self.pending.retain(|tx| !included_keys.contains(&tx.dedup_key()));
    }

    /// Marks externally observed keys (e.g. from a synced chain) as seen.
    pub fn mark_seen<I: IntoIterator<Item = String>>(&mut self, keys: I) {
        self.seen.extend(keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::testutil::dummy_addr;
    use crate::types::Transaction;

    #[test]
    fn duplicate_submission_is_rejected() {
        let kp = Keypair::generate();
        let tx = Transaction::signed(&kp, dummy_addr(1), 10, 1, 100);

        let mut pool = TxPool::new();
        assert!(pool.submit(tx.clone()));
        assert!(!pool.submit(tx));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn distinct_coinbase_mints_coexist() {
        let mut pool = TxPool::new();
        assert!(pool.submit(Transaction::coinbase(dummy_addr(1), 10, 1_000)));
        assert!(pool.submit(Transaction::coinbase(dummy_addr(1), 10, 2_000)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn prune_removes_included_and_blocks_resubmission() {
        let kp = Keypair::generate();
        let tx = Transaction::signed(&kp, dummy_addr(1), 10, 1, 100);
        let other = Transaction::signed(&kp, dummy_addr(2), 20, 2, 101);

        let mut pool = TxPool::new();
        pool.submit(tx.clone());
        pool.submit(other.clone());

        pool.prune(std::slice::from_ref(&tx));
        assert_eq!(pool.snapshot(), vec![other]);

        // The committed transaction cannot come back.
        assert!(!pool.submit(tx));
    }

    #[test]
    fn snapshot_preserves_arrival_order() {
        let kp = Keypair::generate();
        let first = Transaction::signed(&kp, dummy_addr(1), 1, 1, 1);
        let second = Transaction::signed(&kp, dummy_addr(1), 2, 2, 2);

        let mut pool = TxPool::new();
        pool.submit(first.clone());
        pool.submit(second.clone());
        assert_eq!(pool.snapshot(), vec![first, second]);
    }
}
