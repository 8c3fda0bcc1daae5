//! Core data types for the hybrid VRF/PoS/PoW consensus core.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};

/// 32-byte Ed25519 verifying-key encoding. A plain byte array newtype so it is
/// `Copy` and usable directly as a map key (announcement dedup, reward lists).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PubKey(pub [u8; 32]);

impl PubKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for PubKey {
    fn from(b: [u8; 32]) -> Self {
        Self(b)
    }
}

impl std::fmt::Display for PubKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// 64-byte Ed25519 signature encoding.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signature(#[serde(with = "serde_big_array")] pub [u8; 64]);

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; 64])
    }
}

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// Manual serde support for `[u8; 64]`, which serde's derive does not cover
/// past the blanket array impls. Kept local rather than pulling in the
/// `serde-big-array` crate for a single 64-byte field.
mod serde_big_array {
    use serde::de::{SeqAccess, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], ser: S) -> Result<S::Ok, S::Error> {
        let mut tup = ser.serialize_tuple(64)?;
        for b in bytes {
            tup.serialize_element(b)?;
        }
        tup.end()
    }

    struct ArrVisitor;

    impl<'de> Visitor<'de> for ArrVisitor {
        type Value = [u8; 64];

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "64 bytes")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = [0u8; 64];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
            }
            Ok(out)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 64], D::Error> {
        de.deserialize_tuple(64, ArrVisitor)
    }
}

/// SHA-256 digest, used for block hashes, previous-hash links, merkle roots.
pub type Hash256 = [u8; 32];

/// VRF output, a dedicated newtype (not a bare `[u8; 32]`) so the crate cannot
/// accidentally swap a hash for a VRF output at a call boundary. `Ord` is
/// lexicographic over the byte array, which is exactly the tie-break rule
/// the score calculator and validator both need.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VRFOutput(pub [u8; 32]);

impl VRFOutput {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// VRF proof, the Ed25519 signature over the VRF input under the spec-literal
/// construction (`proof = sign(sk, input)`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VRFProof(#[serde(with = "serde_big_array")] pub [u8; 64]);

impl VRFProof {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// One super-node's VRF submission for a given round.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VRFAnnouncement {
    pub round: u32,
    pub public_key: PubKey,
    pub vrf_output: VRFOutput,
    pub vrf_proof: VRFProof,
    /// In `[0, 1]`; locally computed by the announcer, re-checked by every validator.
    pub score: f64,
    pub timestamp: i64,
}

/// Kind of value transfer a transaction performs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxType {
    Transfer,
    Stake,
    Unstake,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub from: PubKey,
    pub to: PubKey,
    pub amount: u64,
    pub fee: u64,
    pub timestamp: i64,
    pub nonce: u64,
    pub signature: Signature,
    pub tx_type: TxType,
}

impl Transaction {
    /// SHA-256 of the canonical encoding with the signature field zeroed out —
    /// this is both the hash that gets signed and the hash used for dedup.
    pub fn hash(&self) -> Hash256 {
        crate::crypto::hash::sha256(&self.canonical_bytes_without_signature())
    }

    /// Big-endian canonical encoding, signature excluded. Field order matches
    /// the struct definition above.
    pub fn canonical_bytes_without_signature(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 32 + 8 + 8 + 8 + 8 + 1);
        buf.extend_from_slice(&self.from.0);
        buf.extend_from_slice(&self.to.0);
        buf.extend_from_slice(&self.amount.to_be_bytes());
        buf.extend_from_slice(&self.fee.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.push(match self.tx_type {
            TxType::Transfer => 0,
            TxType::Stake => 1,
            TxType::Unstake => 2,
        });
        buf
    }
}

/// Per-account ledger entry. Authoritative copy lives behind the storage
/// facade (`StateStore`); this struct is the value type moved in and out.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AccountState {
    pub public_key: PubKey,
    pub balance: u64,
    pub nonce: u64,
    pub stake_amount: u64,
    pub updated_at: i64,
}

/// Chain-wide counters and aggregates, also behind the storage facade.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChainState {
    pub current_height: u64,
    pub current_round: u32,
    pub current_epoch: u64,
    pub total_supply: u64,
    pub active_super_nodes: u64,
    pub current_difficulty: u64,
}

/// Applies a transaction's effect to the `from`/`to` account states it
/// touches, per the stake bookkeeping rule in SPEC_FULL §3.1. The caller is
/// responsible for having validated the transaction first (signature,
/// balance sufficiency, nonce ordering) — this function only performs the
/// arithmetic.
pub fn apply_transaction(tx: &Transaction, from: &mut AccountState, to: &mut AccountState) {
    match tx.tx_type {
        TxType::Transfer => {
            from.balance = from.balance.saturating_sub(tx.amount + tx.fee);
            to.balance = to.balance.saturating_add(tx.amount);
        }
        TxType::Stake => {
            from.balance = from.balance.saturating_sub(tx.amount + tx.fee);
            from.stake_amount = from.stake_amount.saturating_add(tx.amount);
        }
        TxType::Unstake => {
            from.stake_amount = from.stake_amount.saturating_sub(tx.amount);
            from.balance = from
                .balance
                .saturating_add(tx.amount)
                .saturating_sub(tx.fee);
        }
    }
    from.nonce = tx.nonce;
    from.updated_at = tx.timestamp;
    if tx.tx_type == TxType::Transfer {
        to.updated_at = tx.timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk(b: u8) -> PubKey {
        PubKey([b; 32])
    }

    #[test]
    fn transfer_moves_balance_and_burns_fee() {
        let tx = Transaction {
            from: pk(1),
            to: pk(2),
            amount: 100,
            fee: 5,
            timestamp: 1000,
            nonce: 1,
            signature: Signature::default(),
            tx_type: TxType::Transfer,
        };
        let mut from = AccountState {
            public_key: pk(1),
            balance: 200,
            ..Default::default()
        };
        let mut to = AccountState {
            public_key: pk(2),
            balance: 0,
            ..Default::default()
        };
        apply_transaction(&tx, &mut from, &mut to);
        assert_eq!(from.balance, 95);
        assert_eq!(to.balance, 100);
        assert_eq!(from.nonce, 1);
    }

    #[test]
    fn stake_moves_balance_into_stake_amount_same_account() {
        let tx = Transaction {
            from: pk(1),
            to: pk(1),
            amount: 50,
            fee: 1,
            timestamp: 1000,
            nonce: 2,
            signature: Signature::default(),
            tx_type: TxType::Stake,
        };
        let mut acct = AccountState {
            public_key: pk(1),
            balance: 100,
            ..Default::default()
        };
        let mut acct2 = acct.clone();
        apply_transaction(&tx, &mut acct, &mut acct2);
        assert_eq!(acct.balance, 49);
        assert_eq!(acct.stake_amount, 50);
    }

    #[test]
    fn unstake_returns_balance_minus_fee() {
        let tx = Transaction {
            from: pk(1),
            to: pk(1),
            amount: 50,
            fee: 2,
            timestamp: 1000,
            nonce: 3,
            signature: Signature::default(),
            tx_type: TxType::Unstake,
        };
        let mut acct = AccountState {
            public_key: pk(1),
            balance: 10,
            stake_amount: 50,
            ..Default::default()
        };
        let mut acct2 = acct.clone();
        apply_transaction(&tx, &mut acct, &mut acct2);
        assert_eq!(acct.stake_amount, 0);
        assert_eq!(acct.balance, 58);
    }

    #[test]
    fn vrf_output_ord_is_lexicographic() {
        let a = VRFOutput([0u8; 32]);
        let mut b = [0u8; 32];
        b[0] = 1;
        let b = VRFOutput(b);
        assert!(a < b);
    }

    #[test]
    fn transaction_hash_excludes_signature() {
        let mut tx = Transaction {
            from: pk(1),
            to: pk(2),
            amount: 1,
            fee: 0,
            timestamp: 1,
            nonce: 1,
            signature: Signature([0u8; 64]),
            tx_type: TxType::Transfer,
        };
        let h1 = tx.hash();
        tx.signature = Signature([1u8; 64]);
        let h2 = tx.hash();
        assert_eq!(h1, h2);
    }
}
