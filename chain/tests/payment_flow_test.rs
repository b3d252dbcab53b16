//! Ledger-level payment flows: minting, sequential transfers, replay
//! protection, double spends, and cold sync.

use std::collections::BTreeMap;

use chain::{Block, BlockBuilder, ChainStore, Keypair, Ledger, MemStore, Transaction, TxPool};

/// Builds and commits the next block from the pending pool, with the
/// reward pool disabled so balances stay literal.
fn commit_next(ledger: &mut Ledger<MemStore>, leader: &Keypair, pool: &mut TxPool) -> Block {
    let (head_epoch, head_hash) = ledger.head();
    let builder = BlockBuilder {
        reward_per_epoch: 0,
    };
    let block = builder.build(
        ledger,
        head_epoch + 1,
        head_hash,
        leader,
        Vec::new(),
        &pool.snapshot(),
        BTreeMap::new(),
        1_700_000_000_000 + head_epoch,
    );
    ledger.append(block.clone()).expect("append block");
    pool.prune(&block.transactions);
    block
}

#[test]
fn mint_then_two_sequential_transfers() {
    let leader = Keypair::generate();
    let n1 = Keypair::generate();
    let n2 = Keypair::generate();
    let mut ledger = Ledger::open(MemStore::new()).expect("open ledger");
    let mut pool = TxPool::new();

    // Faucet mint of 1000 to n1; the coinbase nonce is its timestamp
    // and the account nonce stays untouched.
    let t0 = 1_699_999_999_999;
    assert!(pool.submit(Transaction::coinbase(n1.address(), 1_000, t0)));
    let b1 = commit_next(&mut ledger, &leader, &mut pool);
    assert_eq!(b1.transactions[0].nonce, t0);
    let a1 = ledger.account_of(&n1.address());
    assert_eq!((a1.balance, a1.nonce), (1_000, 0));

    // n1 -> n2: 100 at nonce 1.
    assert!(pool.submit(Transaction::signed(&n1, n2.address(), 100, 1, t0 + 1)));
    commit_next(&mut ledger, &leader, &mut pool);
    let a1 = ledger.account_of(&n1.address());
    assert_eq!((a1.balance, a1.nonce), (900, 1));
    assert_eq!(ledger.account_of(&n2.address()).balance, 100);

    // n1 -> n2: 200 at nonce 2.
    assert!(pool.submit(Transaction::signed(&n1, n2.address(), 200, 2, t0 + 2)));
    commit_next(&mut ledger, &leader, &mut pool);
    let a1 = ledger.account_of(&n1.address());
    assert_eq!((a1.balance, a1.nonce), (700, 2));
    assert_eq!(ledger.account_of(&n2.address()).balance, 300);

    // Conservation: everything in circulation was minted.
    assert_eq!(ledger.total_balance(), 1_000);
}

#[test]
fn committed_transaction_cannot_be_replayed() {
    let leader = Keypair::generate();
    let n1 = Keypair::generate();
    let n2 = Keypair::generate();
    let mut ledger = Ledger::open(MemStore::new()).expect("open ledger");
    let mut pool = TxPool::new();

    pool.submit(Transaction::coinbase(n1.address(), 500, 1));
    commit_next(&mut ledger, &leader, &mut pool);

    let pay = Transaction::signed(&n1, n2.address(), 100, 1, 2);
    pool.submit(pay.clone());
    commit_next(&mut ledger, &leader, &mut pool);
    assert_eq!(ledger.account_of(&n1.address()).balance, 400);

    // The exact signed bytes come back: the pool refuses them and the
    // ledger remembers the commitment.
    assert!(!pool.submit(pay.clone()));
    assert!(ledger.has_committed_tx(&pay.dedup_key()));

    // And no later block picks it up.
    let b3 = commit_next(&mut ledger, &leader, &mut pool);
    assert!(b3.transactions.is_empty());
    assert_eq!(ledger.account_of(&n1.address()).balance, 400);
}

#[test]
fn double_spend_of_one_nonce_lands_exactly_once() {
    let leader = Keypair::generate();
    let n1 = Keypair::generate();
    let n2 = Keypair::generate();
    let n3 = Keypair::generate();
    let mut ledger = Ledger::open(MemStore::new()).expect("open ledger");
    let mut pool = TxPool::new();

    pool.submit(Transaction::coinbase(n1.address(), 1_000, 1));
    commit_next(&mut ledger, &leader, &mut pool);

    // Two conflicting spends of nonce 1, each for 600.
    let first = Transaction::signed(&n1, n2.address(), 600, 1, 2);
    let second = Transaction::signed(&n1, n3.address(), 600, 1, 3);
    pool.submit(first.clone());
    pool.submit(second);

    let block = commit_next(&mut ledger, &leader, &mut pool);
    assert_eq!(block.transactions, vec![first]);
    assert_eq!(ledger.account_of(&n1.address()).balance, 400);
    assert_eq!(ledger.account_of(&n2.address()).balance, 600);
    assert_eq!(ledger.account_of(&n3.address()).balance, 0);
}

#[test]
fn nonce_gap_waits_for_the_missing_nonce() {
    let leader = Keypair::generate();
    let n1 = Keypair::generate();
    let n2 = Keypair::generate();
    let mut ledger = Ledger::open(MemStore::new()).expect("open ledger");
    let mut pool = TxPool::new();

    pool.submit(Transaction::coinbase(n1.address(), 1_000, 1));
    commit_next(&mut ledger, &leader, &mut pool);
    pool.submit(Transaction::signed(&n1, n2.address(), 10, 1, 2));
    commit_next(&mut ledger, &leader, &mut pool);
    assert_eq!(ledger.account_of(&n1.address()).nonce, 1);

    // Nonce 3 while the account sits at 1: filtered out, stays pending.
    pool.submit(Transaction::signed(&n1, n2.address(), 30, 3, 3));
    let skipped = commit_next(&mut ledger, &leader, &mut pool);
    assert!(skipped.transactions.is_empty());
    assert_eq!(ledger.account_of(&n1.address()).nonce, 1);

    // Once nonce 2 arrives it clears; the single-pass filter walks the
    // pool in arrival order, so the still-earlier nonce-3 entry has to
    // wait one more block.
    pool.submit(Transaction::signed(&n1, n2.address(), 20, 2, 4));
    let cleared = commit_next(&mut ledger, &leader, &mut pool);
    let nonces: Vec<u64> = cleared.transactions.iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, vec![2]);
    assert_eq!(ledger.account_of(&n1.address()).nonce, 2);

    let followup = commit_next(&mut ledger, &leader, &mut pool);
    let nonces: Vec<u64> = followup.transactions.iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, vec![3]);
    let a1 = ledger.account_of(&n1.address());
    assert_eq!((a1.balance, a1.nonce), (940, 3));
}

#[test]
fn cold_sync_reproduces_every_account() {
    let leader = Keypair::generate();
    let n1 = Keypair::generate();
    let n2 = Keypair::generate();
    let mut ledger = Ledger::open(MemStore::new()).expect("open ledger");
    let mut pool = TxPool::new();

    pool.submit(Transaction::coinbase(n1.address(), 1_000, 1));
    commit_next(&mut ledger, &leader, &mut pool);
    pool.submit(Transaction::signed(&n1, n2.address(), 250, 1, 2));
    commit_next(&mut ledger, &leader, &mut pool);
    pool.submit(Transaction::signed(&n2, n1.address(), 50, 1, 3));
    commit_next(&mut ledger, &leader, &mut pool);

    // A fresh node receives only the chain file and replays it.
    let mut fresh_store = MemStore::new();
    fresh_store
        .persist_chain(ledger.chain())
        .expect("hand over the chain");
    let synced = Ledger::open(fresh_store).expect("replay from genesis");

    assert_eq!(synced.head(), ledger.head());
    for addr in [leader.address(), n1.address(), n2.address()] {
        assert_eq!(synced.account_of(&addr), ledger.account_of(&addr));
    }
}

#[test]
fn pending_nonce_gap_is_order_insensitive_within_one_block() {
    let leader = Keypair::generate();
    let n1 = Keypair::generate();
    let n2 = Keypair::generate();
    let mut ledger = Ledger::open(MemStore::new()).expect("open ledger");
    let mut pool = TxPool::new();

    pool.submit(Transaction::coinbase(n1.address(), 100, 1));
    commit_next(&mut ledger, &leader, &mut pool);

    // Sequential nonces submitted together clear in one block.
    pool.submit(Transaction::signed(&n1, n2.address(), 10, 1, 2));
    pool.submit(Transaction::signed(&n1, n2.address(), 10, 2, 3));
    let block = commit_next(&mut ledger, &leader, &mut pool);
    assert_eq!(block.transactions.len(), 2);
    assert_eq!(ledger.account_of(&n1.address()).nonce, 2);
}
