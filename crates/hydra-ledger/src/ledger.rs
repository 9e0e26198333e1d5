//! The `Ledger` collaborator interface.
//!
//! The core head-logic state machine is generic over this trait so that it
//! never needs to know the concrete shape of transactions or UTxOs. One
//! production implementation and one trivial test implementation
//! (`hydra-test-utils`) both satisfy it.

use std::fmt::Debug;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{de::DeserializeOwned, Serialize};

/// A UTxO-based ledger's transaction-application rules, abstracted away from
/// the head-logic engine.
pub trait Ledger: Clone + BorshSerialize + BorshDeserialize + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Opaque transaction type; the core never inspects its contents. Needs
    /// `serde` on top of `borsh` since it also crosses the client-facing
    /// JSON API boundary, not just the signed wire/persistence path.
    type Tx: Clone + Debug + Eq + BorshSerialize + BorshDeserialize + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Opaque UTxO-set type; the core only ever compares, unions, and diffs it.
    type UTxO: Clone
        + Debug
        + Eq
        + BorshSerialize
        + BorshDeserialize
        + Serialize
        + DeserializeOwned
        + Default
        + Send
        + Sync
        + 'static;

    /// Validation failure returned by [`Ledger::apply_tx`].
    type ValidationError: Debug + std::fmt::Display + Clone + Send + Sync + 'static;

    /// The empty UTxO set.
    fn empty_utxo() -> Self::UTxO {
        Self::UTxO::default()
    }

    /// Applies `tx` to `utxo`, returning the resulting UTxO set or a
    /// validation error. Must be a pure function of its arguments.
    fn apply_tx(utxo: &Self::UTxO, tx: &Self::Tx) -> Result<Self::UTxO, Self::ValidationError>;

    /// Applies a sequence of transactions in order, short-circuiting on the
    /// first failure.
    fn apply_txs(
        mut utxo: Self::UTxO,
        txs: &[Self::Tx],
    ) -> Result<Self::UTxO, Self::ValidationError> {
        for tx in txs {
            utxo = Self::apply_tx(&utxo, tx)?;
        }
        Ok(utxo)
    }

    /// Set union of two UTxO sets (used to combine per-party commits into
    /// the head's opening UTxO).
    fn union_utxo(a: &Self::UTxO, b: &Self::UTxO) -> Self::UTxO;
}
