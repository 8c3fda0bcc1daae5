//! Block and header types for the hybrid VRF/PoS/PoW consensus core.

#![allow(dead_code)]

use std::collections::BTreeMap;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::crypto::hash::{merkle_root, sha256};
use crate::types::{Hash256, PubKey, Signature, Transaction, VRFAnnouncement, VRFOutput, VRFProof};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BlockHeader {
    pub height: u64,
    pub round: u32,
    pub timestamp: i64,
    pub previous_hash: Hash256,
    pub proposer: PubKey,
    pub vrf_output: VRFOutput,
    pub vrf_proof: VRFProof,
    pub all_vrf_announcements: Vec<VRFAnnouncement>,
    pub rewarded_nodes: Vec<PubKey>,
    pub merkle_root: Hash256,
    pub nonce: u64,
    #[serde(with = "u256_serde")]
    pub difficulty_target: U256,
}

/// `primitive_types::U256` has no serde impl by default; persist it as its
/// 32-byte big-endian encoding, matching every other fixed-width field here.
mod u256_serde {
    use primitive_types::U256;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &U256, ser: S) -> Result<S::Ok, S::Error> {
        let mut buf = [0u8; 32];
        v.to_big_endian(&mut buf);
        buf.serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<U256, D::Error> {
        let buf = <[u8; 32]>::deserialize(de)?;
        Ok(U256::from_big_endian(&buf))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Post-validation BFT finality signatures, keyed by signer. Excluded
    /// from `hash()` and from the PoW header digest.
    pub signatures: BTreeMap<PubKey, Signature>,
}

impl Block {
    /// `block.hash = SHA-256(canonical_serialize(block \ {signatures}))`.
    pub fn hash(&self) -> Hash256 {
        sha256(&self.canonical_header_bytes())
    }

    /// Canonical big-endian encoding of the header, used both for `hash()`
    /// and as the PoW digest input. Field order matches `BlockHeader`.
    pub fn canonical_header_bytes(&self) -> Vec<u8> {
        let h = &self.header;
        let mut buf = Vec::new();
        buf.extend_from_slice(&h.height.to_be_bytes());
        buf.extend_from_slice(&(h.round as u64).to_be_bytes());
        buf.extend_from_slice(&h.timestamp.to_be_bytes());
        buf.extend_from_slice(&h.previous_hash);
        buf.extend_from_slice(&h.proposer.0);
        buf.extend_from_slice(h.vrf_output.as_bytes());
        buf.extend_from_slice(h.vrf_proof.as_bytes());

        buf.extend_from_slice(&(h.all_vrf_announcements.len() as u32).to_be_bytes());
        for ann in &h.all_vrf_announcements {
            buf.extend_from_slice(&(ann.round as u64).to_be_bytes());
            buf.extend_from_slice(&ann.public_key.0);
            buf.extend_from_slice(ann.vrf_output.as_bytes());
            buf.extend_from_slice(ann.vrf_proof.as_bytes());
            buf.extend_from_slice(&ann.score.to_be_bytes());
            buf.extend_from_slice(&ann.timestamp.to_be_bytes());
        }

        buf.extend_from_slice(&(h.rewarded_nodes.len() as u32).to_be_bytes());
        for pk in &h.rewarded_nodes {
            buf.extend_from_slice(&pk.0);
        }

        buf.extend_from_slice(&h.merkle_root);
        buf.extend_from_slice(&h.nonce.to_be_bytes());
        let mut target_bytes = [0u8; 32];
        h.difficulty_target.to_big_endian(&mut target_bytes);
        buf.extend_from_slice(&target_bytes);

        buf
    }

    /// `merkle_root = MerkleRoot(SHA-256(tx_i))` with odd-last-duplication.
    pub fn compute_merkle_root(transactions: &[Transaction]) -> Hash256 {
        let leaves: Vec<Hash256> = transactions.iter().map(|tx| tx.hash()).collect();
        merkle_root(&leaves)
    }

    /// `SHA-256(serialize(header)) < difficulty_target` — the PoW check.
    /// Uses the same canonical header bytes as `hash()`, since `signatures`
    /// are never part of the PoW digest either.
    pub fn meets_difficulty(&self) -> bool {
        let digest = sha256(&self.canonical_header_bytes());
        U256::from_big_endian(&digest) < self.header.difficulty_target
    }
}
