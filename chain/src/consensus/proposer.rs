//! Deterministic block assembly.
//!
//! Given the pending pools, the ledger snapshot, and the next
//! effectiveness map, the builder produces a candidate block any honest
//! node can reproduce bit-for-bit: the transaction filter is a
//! single-pass fold over balance/nonce overlays in input order, rewards
//! are a floored proportional split of the per-epoch pool, and the three
//! Merkle commitments are computed over canonical hashes.

use std::collections::{BTreeMap, HashMap};

use crate::crypto::{self, Keypair};
use crate::ledger::AccountLookup;
use crate::merkle;
use crate::types::{Account, Address, Block, Hash256, Receipt, Transaction, TxSender};

use super::config::ConsensusConfig;

/// Assembles candidate blocks for the epochs this node leads.
#[derive(Clone, Debug)]
pub struct BlockBuilder {
    /// Reward pool distributed each epoch.
    pub reward_per_epoch: u64,
}

impl BlockBuilder {
    /// Constructs a builder from the consensus configuration.
    pub fn from_config(cfg: &ConsensusConfig) -> Self {
        Self {
            reward_per_epoch: cfg.reward_per_epoch,
        }
    }

    /// Runs the deterministic transaction filter.
    ///
    /// Candidates are processed in input order against balance and nonce
    /// overlays seeded from the ledger. Coinbase mints are accepted
    /// unconditionally; a transfer is kept only if the overlay balance
    /// covers it and its nonce is exactly the overlay nonce plus one,
    /// which also rejects the second of two same-nonce submissions.
    ///
    /// Returns the accepted list (input order preserved) and the overlay
    /// of touched accounts after applying it.
    pub fn filter_transactions<A: AccountLookup>(
        accounts: &A,
        candidates: &[Transaction],
    ) -> (Vec<Transaction>, HashMap<Address, Account>) {
        let mut overlay: HashMap<Address, Account> = HashMap::new();
        let mut accepted = Vec::new();

        for tx in candidates {
            match tx.from {
                TxSender::Coinbase => {
                    let to = overlay
                        .entry(tx.to)
                        .or_insert_with(|| accounts.account_of(&tx.to));
                    to.balance += tx.amount;
                    accepted.push(tx.clone());
                }
                TxSender::Addr(from) => {
                    let sender = overlay
                        .entry(from)
                        .or_insert_with(|| accounts.account_of(&from));
                    if sender.balance < tx.amount || tx.nonce != sender.nonce + 1 {
                        continue;
                    }
                    sender.balance -= tx.amount;
                    sender.nonce = tx.nonce;
                    let to = overlay
                        .entry(tx.to)
                        .or_insert_with(|| accounts.account_of(&tx.to));
                    to.balance += tx.amount;
                    accepted.push(tx.clone());
                }
            }
        }

        (accepted, overlay)
    }

    /// Splits the reward pool proportionally to the new effectiveness
    /// scores, flooring into integer units. Zero shares are omitted; a
    /// zero effectiveness total emits no rewards at all.
    pub fn compute_rewards(
        pool: u64,
        effectiveness: &BTreeMap<Address, f64>,
    ) -> BTreeMap<Address, u64> {
        let total: f64 = effectiveness.values().sum();
        if total <= 0.0 {
            return BTreeMap::new();
        }
        effectiveness
            .iter()
            .filter_map(|(addr, e)| {
                let share = ((pool as f64) * e / total).floor() as u64;
                (share > 0).then_some((*addr, share))
            })
            .collect()
    }

    /// Merkle root over the touched-account snapshot after applying the
    /// block: each leaf is the canonical hash of `"{addr}:{balance}:{nonce}"`,
    /// accounts sorted by address ascending.
    pub fn state_root<A: AccountLookup>(
        accounts: &A,
        overlay: &HashMap<Address, Account>,
        rewards: &BTreeMap<Address, u64>,
    ) -> Hash256 {
        let mut touched: BTreeMap<Address, Account> = overlay
            .iter()
            .map(|(addr, acct)| (*addr, *acct))
            .collect();
        for (addr, amount) in rewards {
            let acct = touched
                .entry(*addr)
                .or_insert_with(|| accounts.account_of(addr));
            acct.balance += amount;
        }

        let leaves: Vec<Hash256> = touched
            .iter()
            .map(|(addr, acct)| {
                crypto::hash_canonical(&format!("{addr}:{}:{}", acct.balance, acct.nonce))
            })
            .collect();
        merkle::root(&leaves)
    }

    /// Assembles, hashes, and signs a candidate block for `epoch`.
    ///
    /// `effectiveness` is the post-epoch map from
    /// [`crate::receipts::ReceiptEngine::next_effectiveness`]; the vote
    /// map is left empty for the quorum round.
    #[allow(clippy::too_many_arguments)]
    pub fn build<A: AccountLookup>(
        &self,
        accounts: &A,
        epoch: u64,
        previous_hash: Hash256,
        keypair: &Keypair,
        receipts: Vec<Receipt>,
        candidates: &[Transaction],
        effectiveness: BTreeMap<Address, f64>,
        timestamp: u64,
    ) -> Block {
        let (transactions, overlay) = Self::filter_transactions(accounts, candidates);
        let rewards = Self::compute_rewards(self.reward_per_epoch, &effectiveness);

        let tx_leaves: Vec<Hash256> = transactions.iter().map(crypto::hash_canonical).collect();
        let receipt_leaves: Vec<Hash256> = receipts.iter().map(crypto::hash_canonical).collect();
        let state_root = Self::state_root(accounts, &overlay, &rewards);

        let mut block = Block {
            epoch,
            previous_hash,
            leader: keypair.address(),
            leader_pub_key: keypair.public_key_b64(),
            timestamp,
            receipts,
            transactions,
            effectiveness_updates: effectiveness,
            rewards,
            tx_root: merkle::root(&tx_leaves),
            receipt_root: merkle::root(&receipt_leaves),
            state_root,
            hash: Hash256::ZERO,
            leader_signature: String::new(),
            votes: BTreeMap::new(),
        };
        block.hash = block.compute_hash();
        block.leader_signature = keypair.sign(block.hash.as_bytes());
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::testutil::dummy_addr;

    fn base_accounts(entries: &[(Address, u64, u64)]) -> HashMap<Address, Account> {
        entries
            .iter()
            .map(|(addr, balance, nonce)| {
                (
                    *addr,
                    Account {
                        balance: *balance,
                        nonce: *nonce,
                    },
                )
            })
            .collect()
    }

    fn transfer(from: &Keypair, to: Address, amount: u64, nonce: u64) -> Transaction {
        Transaction::signed(from, to, amount, nonce, 1_700_000_000_000 + nonce)
    }

    #[test]
    fn coinbase_is_accepted_unconditionally_and_never_debited() {
        let accounts = base_accounts(&[]);
        let mint = Transaction::coinbase(dummy_addr(1), 1_000, 5);

        let (accepted, overlay) = BlockBuilder::filter_transactions(&accounts, &[mint]);
        assert_eq!(accepted.len(), 1);
        assert_eq!(overlay[&dummy_addr(1)].balance, 1_000);
        assert_eq!(overlay[&dummy_addr(1)].nonce, 0);
    }

    #[test]
    fn overdraft_and_nonce_gap_are_rejected() {
        let alice = Keypair::generate();
        let accounts = base_accounts(&[(alice.address(), 100, 0)]);

        let overdraft = transfer(&alice, dummy_addr(2), 500, 1);
        let gap = transfer(&alice, dummy_addr(2), 10, 3); // nonce 3 while account nonce is 0
        let ok = transfer(&alice, dummy_addr(2), 10, 1);

        let (accepted, _) =
            BlockBuilder::filter_transactions(&accounts, &[overdraft, gap, ok.clone()]);
        assert_eq!(accepted, vec![ok]);
    }

    #[test]
    fn second_spend_of_same_nonce_is_rejected() {
        let alice = Keypair::generate();
        let accounts = base_accounts(&[(alice.address(), 1_000, 0)]);

        let first = transfer(&alice, dummy_addr(2), 600, 1);
        let second = transfer(&alice, dummy_addr(3), 600, 1);

        let (accepted, overlay) =
            BlockBuilder::filter_transactions(&accounts, &[first.clone(), second]);
        assert_eq!(accepted, vec![first]);
        assert_eq!(overlay[&alice.address()].balance, 400);
        assert_eq!(overlay[&alice.address()].nonce, 1);
    }

    #[test]
    fn chained_spends_within_one_block_use_overlay_state() {
        let alice = Keypair::generate();
        let accounts = base_accounts(&[(alice.address(), 100, 0)]);

        // The second transfer is only valid against the overlay nonce.
        let t1 = transfer(&alice, dummy_addr(2), 40, 1);
        let t2 = transfer(&alice, dummy_addr(2), 40, 2);
        let (accepted, overlay) =
            BlockBuilder::filter_transactions(&accounts, &[t1.clone(), t2.clone()]);
        assert_eq!(accepted, vec![t1, t2]);
        assert_eq!(overlay[&alice.address()].balance, 20);
        assert_eq!(overlay[&alice.address()].nonce, 2);
    }

    #[test]
    fn rewards_split_proportionally_with_floor() {
        let eff = BTreeMap::from([
            (dummy_addr(1), 0.6),
            (dummy_addr(2), 0.3),
            (dummy_addr(3), 0.0),
        ]);
        let rewards = BlockBuilder::compute_rewards(100, &eff);
        assert_eq!(rewards.get(&dummy_addr(1)), Some(&66));
        assert_eq!(rewards.get(&dummy_addr(2)), Some(&33));
        assert_eq!(rewards.get(&dummy_addr(3)), None); // zero shares omitted
    }

    #[test]
    fn zero_total_effectiveness_emits_no_rewards() {
        let eff = BTreeMap::from([(dummy_addr(1), 0.0)]);
        assert!(BlockBuilder::compute_rewards(100, &eff).is_empty());
        assert!(BlockBuilder::compute_rewards(100, &BTreeMap::new()).is_empty());
    }

    #[test]
    fn empty_block_has_zero_tx_root_and_single_tx_root_is_its_hash() {
        let leader = Keypair::generate();
        let builder = BlockBuilder {
            reward_per_epoch: 100,
        };
        let accounts = base_accounts(&[]);

        let empty = builder.build(
            &accounts,
            1,
            Hash256::ZERO,
            &leader,
            Vec::new(),
            &[],
            BTreeMap::new(),
            1_700_000_000_000,
        );
        assert_eq!(empty.tx_root, Hash256::ZERO);
        assert_eq!(empty.receipt_root, Hash256::ZERO);

        let mint = Transaction::coinbase(dummy_addr(1), 7, 3);
        let single = builder.build(
            &accounts,
            1,
            Hash256::ZERO,
            &leader,
            Vec::new(),
            std::slice::from_ref(&mint),
            BTreeMap::new(),
            1_700_000_000_000,
        );
        assert_eq!(single.tx_root, crypto::hash_canonical(&mint));
    }

    #[test]
    fn build_is_deterministic_for_fixed_inputs() {
        let leader = Keypair::generate();
        let alice = Keypair::generate();
        let builder = BlockBuilder {
            reward_per_epoch: 100,
        };
        let accounts = base_accounts(&[(alice.address(), 500, 0)]);
        let candidates = vec![
            transfer(&alice, dummy_addr(2), 100, 1),
            Transaction::coinbase(dummy_addr(3), 50, 9),
        ];
        let eff = BTreeMap::from([(alice.address(), 0.25)]);

        let a = builder.build(
            &accounts,
            4,
            Hash256::ZERO,
            &leader,
            Vec::new(),
            &candidates,
            eff.clone(),
            1_700_000_000_000,
        );
        let b = builder.build(
            &accounts,
            4,
            Hash256::ZERO,
            &leader,
            Vec::new(),
            &candidates,
            eff,
            1_700_000_000_000,
        );
        assert_eq!(a.hash, b.hash);
        assert_eq!(a, b);
    }

    #[test]
    fn built_block_hash_and_signature_verify() {
        let leader = Keypair::generate();
        let builder = BlockBuilder {
            reward_per_epoch: 100,
        };
        let accounts = base_accounts(&[]);
        let block = builder.build(
            &accounts,
            1,
            Hash256::ZERO,
            &leader,
            Vec::new(),
            &[],
            BTreeMap::new(),
            1_700_000_000_000,
        );
        assert_eq!(block.hash, block.compute_hash());
        assert!(block.verify_leader_signature());
        assert!(block.votes.is_empty());
    }
}
