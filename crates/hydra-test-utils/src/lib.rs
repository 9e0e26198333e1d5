//! A trivial in-memory [`Ledger`] plus `arbitrary`-based fixture helpers,
//! shared by every crate's test suite so they don't each reinvent one.

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use hydra_ledger::Ledger;
use hydra_primitives::buf::Buf32;
use hydra_primitives::party::Party;
use serde::{Deserialize, Serialize};

/// A UTxO set that is just a sorted bag of opaque ids.
#[derive(Clone, Debug, Eq, PartialEq, Default, BorshSerialize, BorshDeserialize, Serialize, Deserialize, Arbitrary)]
pub struct ToyUtxo(pub Vec<u64>);

/// A transaction that consumes nothing and produces one new id, or fails if
/// that id is already present (lets tests exercise validation failure).
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize, Arbitrary)]
pub struct ToyTx(pub u64);

/// Reference `Ledger` implementation. Ledger transaction-validation proper is
/// an external collaborator this repository doesn't implement (see scope
/// notes); this is the stand-in the shipped node binary instantiates the
/// engine with.
#[derive(Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ToyLedger;

impl Ledger for ToyLedger {
    type Tx = ToyTx;
    type UTxO = ToyUtxo;
    type ValidationError = String;

    fn apply_tx(utxo: &Self::UTxO, tx: &Self::Tx) -> Result<Self::UTxO, Self::ValidationError> {
        if utxo.0.contains(&tx.0) {
            return Err(format!("id {} already present", tx.0));
        }
        let mut next = utxo.0.clone();
        next.push(tx.0);
        next.sort_unstable();
        Ok(ToyUtxo(next))
    }

    fn union_utxo(a: &Self::UTxO, b: &Self::UTxO) -> Self::UTxO {
        let mut out = a.0.clone();
        out.extend(b.0.iter().copied());
        out.sort_unstable();
        out.dedup();
        ToyUtxo(out)
    }
}

/// Deterministic party fixture for tests that don't care about real keys,
/// only about distinct, orderable identities.
pub fn toy_party(tag: u8) -> Party {
    Party::from_verification_key_bytes([tag; 32])
}

/// Generates an arbitrary value of `T` from a fixed seed, for property-style
/// tests that want varied-but-reproducible fixtures without a full fuzzing
/// harness.
pub fn arbitrary_from_seed<'a, T: Arbitrary<'a>>(seed: &'a [u8]) -> Option<T> {
    let mut u = arbitrary::Unstructured::new(seed);
    T::arbitrary(&mut u).ok()
}

pub fn zero_head_id() -> hydra_primitives::party::HeadId {
    hydra_primitives::party::HeadId(Buf32::zero())
}
