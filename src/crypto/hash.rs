//! SHA-256 hashing and merkle tree construction.

use sha2::{Digest, Sha256};

use crate::types::Hash256;

pub fn sha256(bytes: &[u8]) -> Hash256 {
    Sha256::digest(bytes).into()
}

/// Merkle root over a list of leaf hashes, duplicating the last element at
/// every level with an odd count.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = Vec::with_capacity(64);
                buf.extend_from_slice(&pair[0]);
                buf.extend_from_slice(&pair[1]);
                sha256(&buf)
            })
            .collect();
    }
    level[0]
}
