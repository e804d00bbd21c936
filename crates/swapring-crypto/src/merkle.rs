//! Merkle trees over hex-encoded leaf hashes
//!
//! Custody snapshots commit to the holding set with a Merkle root;
//! inclusion proofs carry the bottom-up sibling path. Odd layers
//! duplicate their last node.

use crate::hash::hash_all;
use swapring_types::ProofSibling;

fn decode(hash_hex: &str) -> Option<[u8; 32]> {
    hex::decode(hash_hex).ok()?.try_into().ok()
}

fn parent(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    hash_all(&[left, right])
}

/// Merkle root over hex leaf hashes; `None` for an empty leaf set
pub fn merkle_root(leaves: &[String]) -> Option<String> {
    if leaves.is_empty() {
        return None;
    }
    let mut layer: Vec<[u8; 32]> = leaves.iter().map(|l| decode(l)).collect::<Option<_>>()?;
    while layer.len() > 1 {
        let mut next = Vec::with_capacity((layer.len() + 1) / 2);
        for chunk in layer.chunks(2) {
            let left = chunk[0];
            let right = chunk.get(1).copied().unwrap_or(left);
            next.push(parent(&left, &right));
        }
        layer = next;
    }
    Some(hex::encode(layer[0]))
}

/// Sibling path for the leaf at `index`, bottom-up
pub fn merkle_proof(leaves: &[String], index: usize) -> Vec<ProofSibling> {
    if leaves.is_empty() || index >= leaves.len() {
        return vec![];
    }
    let Some(mut layer) = leaves
        .iter()
        .map(|l| decode(l))
        .collect::<Option<Vec<[u8; 32]>>>()
    else {
        return vec![];
    };

    let mut proof = Vec::new();
    let mut current_index = index;

    while layer.len() > 1 {
        let sibling_index = if current_index % 2 == 0 {
            current_index + 1
        } else {
            current_index - 1
        };

        if sibling_index < layer.len() {
            proof.push(ProofSibling {
                left: current_index % 2 == 1,
                hash: hex::encode(layer[sibling_index]),
            });
        } else {
            // Odd layer: the node pairs with a duplicate of itself.
            proof.push(ProofSibling {
                left: false,
                hash: hex::encode(layer[current_index]),
            });
        }

        let mut next = Vec::with_capacity((layer.len() + 1) / 2);
        for chunk in layer.chunks(2) {
            let left = chunk[0];
            let right = chunk.get(1).copied().unwrap_or(left);
            next.push(parent(&left, &right));
        }
        layer = next;
        current_index /= 2;
    }

    proof
}

/// Verify a sibling path from a hex leaf hash up to a hex root
pub fn verify_merkle_proof(leaf_hex: &str, proof: &[ProofSibling], root_hex: &str) -> bool {
    let Some(mut current) = decode(leaf_hex) else {
        return false;
    };
    for sibling in proof {
        let Some(sib) = decode(&sibling.hash) else {
            return false;
        };
        current = if sibling.left {
            parent(&sib, &current)
        } else {
            parent(&current, &sib)
        };
    }
    hex::encode(current) == root_hex
}
