//! Ed25519 signing/verification over raw byte buffers.

use ed25519_dalek::{Signature, Signer, SigningKey as DalekSigningKey, Verifier, VerifyingKey};
use hydra_primitives::buf::{Buf32, Buf64};

pub type VerificationKeyBytes = Buf32;

/// A local party's signing key.
pub struct SigningKey(DalekSigningKey);

impl SigningKey {
    pub fn generate<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        Self(DalekSigningKey::generate(rng))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(DalekSigningKey::from_bytes(bytes))
    }

    pub fn verification_key_bytes(&self) -> VerificationKeyBytes {
        Buf32::from(self.0.verifying_key().to_bytes())
    }
}

/// Signs `msg` (expected to be the canonical byte encoding of a snapshot or
/// other protocol payload) with `sk`, returning a 64-byte Ed25519 signature.
pub fn sign_bytes(msg: &[u8], sk: &SigningKey) -> Buf64 {
    let sig: Signature = sk.0.sign(msg);
    Buf64::from(sig.to_bytes())
}

/// Verifies `sig` over `msg` against the claimed verification key `pk`.
/// Returns `false` (never panics) on any malformed input.
pub fn verify_bytes(sig: &Buf64, msg: &[u8], pk: &VerificationKeyBytes) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(pk.as_bytes()) else {
        return false;
    };
    let sig = Signature::from_bytes(sig.as_bytes());
    vk.verify(msg, &sig).is_ok()
}
