//! Deterministic leader election.
//!
//! Every honest node derives the same leader for `(epoch, view)` from
//! the sorted list of known validator addresses: the first four bytes of
//! `SHA-256("epoch-{E}-view-{V}")`, read as a big-endian unsigned
//! integer, index into the list modulo its length. The address sort is
//! total, so ties are impossible by construction.

use crate::crypto;
use crate::types::Address;

/// Elects the leader for `(epoch, view)` over `validators`.
///
/// The slice is sorted internally; callers may pass it in any order.
/// Returns `None` only for an empty validator set.
pub fn elect_leader(epoch: u64, view: u64, validators: &[Address]) -> Option<Address> {
    if validators.is_empty() {
        return None;
    }
    let mut sorted: Vec<Address> = validators.to_vec();
    sorted.sort();
    sorted.dedup();

    let digest = crypto::sha256(format!("epoch-{epoch}-view-{view}").as_bytes());
    let prefix = u32::from_be_bytes(
        digest.as_bytes()[..4]
            .try_into()
            .expect("digest has at least 4 bytes"),
    );
    let idx = (prefix as usize) % sorted.len();
    Some(sorted[idx])
}
