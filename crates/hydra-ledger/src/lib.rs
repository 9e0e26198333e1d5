//! The `Ledger` collaborator abstraction plus snapshots built on top of it.

pub mod ledger;
pub mod snapshot;

pub use ledger::Ledger;
pub use snapshot::{canonical_snapshot_bytes, ConfirmedSnapshot, Snapshot};

#[cfg(test)]
mod tests {
    use borsh::{BorshDeserialize, BorshSerialize};
    use hydra_primitives::party::HeadId;
    use hydra_primitives::buf::Buf32;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Clone, Debug, Eq, PartialEq, Default, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
    struct ToyUtxo(Vec<u64>);

    #[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
    struct ToyTx(u64);

    #[derive(Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
    struct ToyLedger;

    impl Ledger for ToyLedger {
        type Tx = ToyTx;
        type UTxO = ToyUtxo;
        type ValidationError = String;

        fn apply_tx(utxo: &Self::UTxO, tx: &Self::Tx) -> Result<Self::UTxO, Self::ValidationError> {
            let mut next = utxo.0.clone();
            next.push(tx.0);
            Ok(ToyUtxo(next))
        }

        fn union_utxo(a: &Self::UTxO, b: &Self::UTxO) -> Self::UTxO {
            let mut out = a.0.clone();
            out.extend(b.0.iter().copied());
            out.sort_unstable();
            ToyUtxo(out)
        }
    }

    #[test]
    fn canonical_bytes_are_deterministic_and_sensitive_to_every_field() {
        let head_id = HeadId(Buf32::from([7u8; 32]));
        let utxo = ToyUtxo(vec![1, 2, 3]);
        let txs = vec![ToyTx(1), ToyTx(2)];

        let a = canonical_snapshot_bytes::<ToyLedger>(&head_id, 5, &utxo, &txs);
        let b = canonical_snapshot_bytes::<ToyLedger>(&head_id, 5, &utxo, &txs);
        assert_eq!(a, b);

        let different_number = canonical_snapshot_bytes::<ToyLedger>(&head_id, 6, &utxo, &txs);
        assert_ne!(a, different_number);

        let different_utxo = canonical_snapshot_bytes::<ToyLedger>(&head_id, 5, &ToyUtxo(vec![9]), &txs);
        assert_ne!(a, different_utxo);

        let different_txs = canonical_snapshot_bytes::<ToyLedger>(&head_id, 5, &utxo, &[ToyTx(9)]);
        assert_ne!(a, different_txs);
    }

    #[test]
    fn apply_txs_short_circuits_on_first_failure() {
        #[derive(Clone, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
        struct FailingLedger;

        impl Ledger for FailingLedger {
            type Tx = u64;
            type UTxO = u64;
            type ValidationError = String;

            fn apply_tx(utxo: &u64, tx: &u64) -> Result<u64, String> {
                if *tx == 0 {
                    Err("zero not allowed".into())
                } else {
                    Ok(utxo + tx)
                }
            }

            fn union_utxo(a: &u64, b: &u64) -> u64 {
                a + b
            }
        }

        let result = FailingLedger::apply_txs(0, &[1, 2, 0, 3]);
        assert_eq!(result, Err("zero not allowed".to_string()));
    }
}
