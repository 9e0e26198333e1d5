//! Snapshots and the canonical byte encoding used to sign them.

use borsh::{BorshDeserialize, BorshSerialize};
use hydra_crypto::MultiSignature;
use hydra_primitives::party::HeadId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ledger::Ledger;

/// A party-unanimous-agreement candidate: a UTxO set plus the ordered
/// transactions that produced it from the previous snapshot.
///
/// `number` is monotone within a head's timeline; `0` is reserved for the
/// post-commit "initial" snapshot with no confirmed txs.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot<L: Ledger> {
    pub number: u64,
    pub utxo: L::UTxO,
    #[serde(rename = "confirmedTransactions")]
    pub confirmed_txs: Vec<L::Tx>,
}

impl<L: Ledger> Snapshot<L> {
    pub fn initial(utxo: L::UTxO) -> Self {
        Self {
            number: 0,
            utxo,
            confirmed_txs: Vec::new(),
        }
    }
}

/// Either the head's initial (unsigned) post-commit snapshot, or a later
/// snapshot confirmed by a full-party-set [`MultiSignature`].
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfirmedSnapshot<L: Ledger> {
    Initial { utxo: L::UTxO },
    Confirmed {
        snapshot: Snapshot<L>,
        multi_sig: MultiSignature,
    },
}

impl<L: Ledger> ConfirmedSnapshot<L> {
    pub fn number(&self) -> u64 {
        match self {
            ConfirmedSnapshot::Initial { .. } => 0,
            ConfirmedSnapshot::Confirmed { snapshot, .. } => snapshot.number,
        }
    }

    pub fn utxo(&self) -> &L::UTxO {
        match self {
            ConfirmedSnapshot::Initial { utxo } => utxo,
            ConfirmedSnapshot::Confirmed { snapshot, .. } => &snapshot.utxo,
        }
    }

    pub fn confirmed_txs(&self) -> &[L::Tx] {
        match self {
            ConfirmedSnapshot::Initial { .. } => &[],
            ConfirmedSnapshot::Confirmed { snapshot, .. } => &snapshot.confirmed_txs,
        }
    }
}

/// Produces the stable, endian-fixed byte encoding that every party signs
/// and verifies over for a given snapshot:
/// `headId ‖ number(u64 big-endian) ‖ sha256(borsh(utxo)) ‖ sha256(borsh(confirmedTxs))`.
///
/// Both hashed components use `borsh` for the inner encoding since it is a
/// stable binary format (unlike, say, `HashMap` iteration order under serde);
/// callers must ensure `L::UTxO`/`L::Tx` borsh impls are themselves canonical
/// (e.g. back onto sorted collections).
pub fn canonical_snapshot_bytes<L: Ledger>(head_id: &HeadId, number: u64, utxo: &L::UTxO, confirmed_txs: &[L::Tx]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 8 + 32 + 32);
    out.extend_from_slice(head_id.0.as_bytes());
    out.extend_from_slice(&number.to_be_bytes());
    out.extend_from_slice(&hash_borsh(utxo));
    out.extend_from_slice(&hash_borsh_seq(confirmed_txs));
    out
}

fn hash_borsh<T: BorshSerialize>(value: &T) -> [u8; 32] {
    let mut buf = Vec::new();
    value
        .serialize(&mut buf)
        .expect("borsh serialization to an in-memory buffer cannot fail");
    Sha256::digest(&buf).into()
}

fn hash_borsh_seq<T: BorshSerialize>(values: &[T]) -> [u8; 32] {
    let mut buf = Vec::new();
    for v in values {
        v.serialize(&mut buf)
            .expect("borsh serialization to an in-memory buffer cannot fail");
    }
    Sha256::digest(&buf).into()
}
