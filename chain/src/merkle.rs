//! Merkle commitments over ordered leaf sequences.
//!
//! The tree pairs adjacent nodes level by level; when a level has an odd
//! count the last hash is duplicated. The parent of `(left, right)` is
//! `SHA-256(left || right)`. An empty input commits to the all-zero root
//! and a single leaf is its own root.
//!
//! Proofs record, per level, the sibling digest and whether it sits on
//! the left of the running hash during reconstruction.

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::types::{HASH_LEN, Hash256};

/// One level of a Merkle inclusion proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofStep {
    /// Digest of the sibling node at this level.
    pub sibling: Hash256,
    /// `true` if the sibling is concatenated on the left of the running
    /// hash, `false` if on the right.
    pub sibling_is_left: bool,
}

fn parent(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = [0u8; HASH_LEN * 2];
    buf[..HASH_LEN].copy_from_slice(left.as_bytes());
    buf[HASH_LEN..].copy_from_slice(right.as_bytes());
    crypto::sha256(&buf)
}

/// Computes the Merkle root of an ordered leaf sequence.
pub fn root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            // Odd level: duplicate the last hash.
            level.push(*level.last().expect("level is non-empty"));
        }
        level = level
            .chunks_exact(2)
            .map(|pair| parent(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

/// Builds the inclusion proof for the leaf at `index`.
///
/// Returns `None` when the index is out of range. The proof for a
/// single-leaf tree is empty: the leaf is the root.
pub fn proof(leaves: &[Hash256], index: usize) -> Option<Vec<ProofStep>> {
    if index >= leaves.len() {
        return None;
    }

    let mut steps = Vec::new();
    let mut level: Vec<Hash256> = leaves.to_vec();
    let mut pos = index;

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().expect("level is non-empty"));
        }

        let (sibling_pos, sibling_is_left) = if pos % 2 == 0 {
            (pos + 1, false)
        } else {
            (pos - 1, true)
        };
        steps.push(ProofStep {
            sibling: level[sibling_pos],
            sibling_is_left,
        });

        level = level
            .chunks_exact(2)
            .map(|pair| parent(&pair[0], &pair[1]))
            .collect();
        pos /= 2;
    }

    Some(steps)
}

/// Replays a proof from `leaf` and compares the result against `root`.
pub fn verify(leaf: Hash256, steps: &[ProofStep], expected_root: Hash256) -> bool {
    let mut running = leaf;
    for step in steps {
        running = if step.sibling_is_left {
            parent(&step.sibling, &running)
        } else {
            parent(&running, &step.sibling)
        };
    }
    running == expected_root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> Hash256 {
        crypto::sha256(&[byte])
    }

    fn leaves(n: u8) -> Vec<Hash256> {
        (0..n).map(leaf).collect()
    }

    #[test]
    fn empty_input_yields_zero_root() {
        assert_eq!(root(&[]), Hash256::ZERO);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaf(1);
        assert_eq!(root(&[l]), l);
        // And its proof is empty.
        let p = proof(&[l], 0).expect("index in range");
        assert!(p.is_empty());
        assert!(verify(l, &p, l));
    }

    #[test]
    fn two_leaves_hash_in_order() {
        let (a, b) = (leaf(1), leaf(2));
        assert_eq!(root(&[a, b]), parent(&a, &b));
        assert_ne!(root(&[a, b]), root(&[b, a]));
    }

    #[test]
    fn odd_level_duplicates_last_leaf() {
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        let expected = parent(&parent(&a, &b), &parent(&c, &c));
        assert_eq!(root(&[a, b, c]), expected);
    }

    #[test]
    fn proofs_verify_for_every_index_and_size() {
        for n in 1..=9u8 {
            let ls = leaves(n);
            let r = root(&ls);
            for (i, l) in ls.iter().enumerate() {
                let p = proof(&ls, i).expect("index in range");
                assert!(verify(*l, &p, r), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn proof_fails_against_wrong_leaf_or_root() {
        let ls = leaves(6);
        let r = root(&ls);
        let p = proof(&ls, 2).expect("index in range");
        assert!(!verify(ls[3], &p, r));
        assert!(!verify(ls[2], &p, leaf(99)));
    }

    #[test]
    fn out_of_range_index_has_no_proof() {
        let ls = leaves(4);
        assert!(proof(&ls, 4).is_none());
        assert!(proof(&[], 0).is_none());
    }
}
