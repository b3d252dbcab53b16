//! Shared helpers for unit tests.

use std::collections::BTreeMap;

use crate::crypto::Keypair;
use crate::types::{ADDRESS_LEN, Address, Block, Hash256};

/// Fixed-byte address for tests that don't need a real key.
pub(crate) fn dummy_addr(byte: u8) -> Address {
    Address([byte; ADDRESS_LEN])
}

/// A minimal hashed-and-signed block with no payload.
pub(crate) fn bare_block(kp: &Keypair, epoch: u64, previous_hash: Hash256) -> Block {
    let mut block = Block {
        epoch,
        previous_hash,
        leader: kp.address(),
        leader_pub_key: kp.public_key_b64(),
        timestamp: 1_700_000_000_000 + epoch,
        receipts: Vec::new(),
        transactions: Vec::new(),
        effectiveness_updates: BTreeMap::new(),
        rewards: BTreeMap::new(),
        tx_root: Hash256::ZERO,
        receipt_root: Hash256::ZERO,
        state_root: Hash256::ZERO,
        hash: Hash256::ZERO,
        leader_signature: String::new(),
        votes: BTreeMap::new(),
    };
    block.hash = block.compute_hash();
    block.leader_signature = kp.sign(block.hash.as_bytes());
    block
}
