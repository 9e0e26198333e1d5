//! Collection of per-party signatures over one snapshot's canonical bytes.
//!
//! This is not a cryptographic signature-aggregation scheme (no BLS/MuSig2
//! folding); a [`MultiSignature`] is simply the set of individual signatures
//! from every party, which is what the protocol actually requires.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use hydra_primitives::party::Party;
use hydra_primitives::buf::Buf64;
use serde::{Deserialize, Serialize};

use crate::sign::{verify_bytes, VerificationKeyBytes};

/// A fully collected multi-signature: one signature per party, keyed by
/// party so the set is canonically ordered regardless of arrival order.
#[derive(Clone, Eq, PartialEq, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct MultiSignature {
    signatures: BTreeMap<Party, Buf64>,
}

impl MultiSignature {
    pub fn signatures(&self) -> &BTreeMap<Party, Buf64> {
        &self.signatures
    }
}

/// In-flight signature collection for a snapshot that has not yet reached
/// unanimity.
#[derive(Clone, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct SignatureCollector {
    signatures: BTreeMap<Party, Buf64>,
}

impl SignatureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `sig` from `party` over `msg`, verifying it against `pk`
    /// first. Returns `true` if the signature was new and valid; duplicate
    /// submissions from the same party are a no-op (idempotent).
    pub fn record(&mut self, party: Party, pk: &VerificationKeyBytes, sig: Buf64, msg: &[u8]) -> bool {
        if self.signatures.contains_key(&party) {
            return false;
        }
        if !verify_bytes(&sig, msg, pk) {
            return false;
        }
        self.signatures.insert(party, sig);
        true
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Promotes the collector into a [`MultiSignature`] once every party in
    /// `required` has signed. Returns `None` otherwise.
    pub fn try_complete(self, required: &[Party]) -> Result<MultiSignature, Self> {
        if required.iter().all(|p| self.signatures.contains_key(p)) {
            Ok(MultiSignature {
                signatures: self.signatures,
            })
        } else {
            Err(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use hydra_primitives::buf::Buf32;
    use rand::rngs::OsRng;

    use super::*;
    use crate::sign::{sign_bytes, SigningKey};

    fn fixture(n: u8) -> (Party, SigningKey) {
        let sk = SigningKey::generate(&mut OsRng);
        let party = Party(Buf32::from(*sk.verification_key_bytes().as_bytes()));
        let _ = n;
        (party, sk)
    }

    #[test]
    fn unanimity_required_before_completion() {
        let (p1, sk1) = fixture(1);
        let (p2, sk2) = fixture(2);
        let required = vec![p1, p2];
        let msg = b"snapshot bytes";

        let mut collector = SignatureCollector::new();
        let pk1 = sk1.verification_key_bytes();
        assert!(collector.record(p1, &pk1, sign_bytes(msg, &sk1), msg));

        let collector = match collector.try_complete(&required) {
            Ok(_) => panic!("should not be complete with one signature missing"),
            Err(c) => c,
        };

        let mut collector = collector;
        let pk2 = sk2.verification_key_bytes();
        assert!(collector.record(p2, &pk2, sign_bytes(msg, &sk2), msg));
        let full = collector.try_complete(&required).expect("complete");
        assert_eq!(full.signatures().len(), 2);
    }

    #[test]
    fn duplicate_signature_from_same_party_is_noop() {
        let (p1, sk1) = fixture(1);
        let pk1 = sk1.verification_key_bytes();
        let msg = b"snapshot bytes";

        let mut collector = SignatureCollector::new();
        assert!(collector.record(p1, &pk1, sign_bytes(msg, &sk1), msg));
        assert!(!collector.record(p1, &pk1, sign_bytes(msg, &sk1), msg));
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn invalid_signature_is_rejected() {
        let (p1, sk1) = fixture(1);
        let (_, sk2) = fixture(2);
        let pk1 = sk1.verification_key_bytes();
        let msg = b"snapshot bytes";

        let mut collector = SignatureCollector::new();
        // Signed by the wrong key.
        assert!(!collector.record(p1, &pk1, sign_bytes(msg, &sk2), msg));
        assert!(collector.is_empty());
    }
}
