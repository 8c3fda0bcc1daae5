//! Thin wrappers over `ed25519-dalek` that translate its error type into
//! [`CryptoError`] and work with the crate's `PubKey`/`Signature` newtypes.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::CryptoError;
use crate::types::{PubKey, Signature};

pub fn sign(sk: &SigningKey, message: &[u8]) -> Signature {
    Signature(sk.sign(message).to_bytes())
}

pub fn verify(pk: &PubKey, message: &[u8], sig: &Signature) -> Result<(), CryptoError> {
    let vk = VerifyingKey::from_bytes(&pk.0).map_err(|_| CryptoError::InvalidKey)?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig.0);
    vk.verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

pub fn public_key_of(sk: &SigningKey) -> PubKey {
    PubKey(sk.verifying_key().to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_then_verify_roundtrips() {
        let sk = SigningKey::generate(&mut OsRng);
        let pk = public_key_of(&sk);
        let msg = b"round 7";
        let sig = sign(&sk, msg);
        assert!(verify(&pk, msg, &sig).is_ok());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let sk = SigningKey::generate(&mut OsRng);
        let pk = public_key_of(&sk);
        let sig = sign(&sk, b"round 7");
        assert!(verify(&pk, b"round 8", &sig).is_err());
    }
}
