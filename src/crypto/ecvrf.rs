//! ECVRF (Elliptic Curve Verifiable Random Function) implementation.
//!
//! This module implements RFC 9381-based VRF for cryptographic randomness.
//! Kept unused in this tree: leader selection goes through [`crate::crypto::vrf`]'s
//! simplified hash-based construction instead (see its doc comment for why), so
//! this stays as the documented substitution point if a full RFC 9381 VRF is
//! wired in later.

#![allow(dead_code)]

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ECVRFError {
    #[error("Invalid proof")]
    InvalidProof,
    #[error("Verification failed")]
    VerificationFailed,
    #[error("Invalid key")]
    InvalidKey,
}

/// ECVRF Output: 32-byte deterministic but unpredictable output
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ECVRFOutput {
    pub bytes: [u8; 32],
}

impl ECVRFOutput {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Convert output to u64 for lottery/selection
    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.bytes[0..8].try_into().unwrap())
    }

    /// Convert to hex string
    pub fn to_hex(self) -> String {
        hex::encode(self.bytes)
    }
}

/// ECVRF Proof: 80 bytes per RFC 9381
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ECVRFProof {
    pub bytes: [u8; 80],
}

impl Serialize for ECVRFProof {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        hex::encode(self.bytes).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ECVRFProof {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str: String = Deserialize::deserialize(deserializer)?;
        let bytes_vec = hex::decode(&hex_str).map_err(serde::de::Error::custom)?;
        if bytes_vec.len() != 80 {
            return Err(serde::de::Error::custom("Invalid ECVRFProof length"));
        }
        let mut bytes = [0u8; 80];
        bytes.copy_from_slice(&bytes_vec);
        Ok(ECVRFProof::new(bytes))
    }
}

impl ECVRFProof {
    pub fn new(bytes: [u8; 80]) -> Self {
        Self { bytes }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

/// ECVRF-Edwards25519-SHA512-TAI implementation
/// Based on RFC 9381 but simplified for TimeCoin
#[allow(clippy::upper_case_acronyms)]
pub struct ECVRF;

impl ECVRF {
    /// Evaluate VRF: deterministic evaluation of (secret_key, input) -> (output, proof)
    pub fn evaluate(
        secret_key: &SigningKey,
        input: &[u8],
    ) -> Result<(ECVRFOutput, ECVRFProof), ECVRFError> {
        // Hash input to create a seed
        let mut hasher = Sha512::new();
        hasher.update(b"ECVRF-Edwards25519-SHA512-TAI");
        hasher.update(secret_key.to_bytes());
        hasher.update(input);

        let hash = hasher.finalize();
        let mut output_bytes = [0u8; 32];
        output_bytes.copy_from_slice(&hash[0..32]);

        let mut proof_bytes = [0u8; 80];
        // First 32 bytes of proof: output hash
        proof_bytes[0..32].copy_from_slice(&hash[0..32]);
        // Next 32 bytes: input hash
        let mut input_hasher = Sha512::new();
        input_hasher.update(input);
        let input_hash = input_hasher.finalize();
        proof_bytes[32..64].copy_from_slice(&input_hash[0..32]);
        // Last 16 bytes: signature prefix (first 16 bytes of Ed25519 signature)
        let message = Self::signing_message(&output_bytes, input);
        let sig = secret_key.sign(&message);
        proof_bytes[64..80].copy_from_slice(&sig.to_bytes()[0..16]);

        Ok((ECVRFOutput::new(output_bytes), ECVRFProof::new(proof_bytes)))
    }

    /// Verify VRF output using public key
    pub fn verify(
        _public_key: &VerifyingKey,
        input: &[u8],
        _output: &ECVRFOutput,
        proof: &ECVRFProof,
    ) -> Result<(), ECVRFError> {
        // Verify proof structure (basic sanity check)
        let mut input_hasher = Sha512::new();
        input_hasher.update(input);
        let input_hash = input_hasher.finalize();
        let input_hash_bytes: &[u8] = &input_hash;

        // Check that proof contains the expected input hash
        if proof.bytes[32..64] != input_hash_bytes[0..32] {
            return Err(ECVRFError::InvalidProof);
        }

        // In a full RFC 9381 implementation, we would verify the curve point
        // and Schnorr-like proof signature. For this simplified version,
        // we check that the proof is well-formed.
        // The actual verification happens when comparing outputs deterministically.

        Ok(())
    }

    /// Proof to Hash: convert proof to deterministic output
    /// This is used when receiving a proof from another validator
    pub fn proof_to_hash(proof: &ECVRFProof) -> ECVRFOutput {
        let mut hasher = Sha512::new();
        hasher.update(b"ECVRF-proof-to-hash");
        hasher.update(proof.bytes);
        let hash = hasher.finalize();

        let mut output_bytes = [0u8; 32];
        output_bytes.copy_from_slice(&hash[0..32]);
        ECVRFOutput::new(output_bytes)
    }

    fn signing_message(output: &[u8; 32], input: &[u8]) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(b"ECVRF-sign");
        msg.extend_from_slice(output);
        msg.extend_from_slice(input);
        msg
    }
}
