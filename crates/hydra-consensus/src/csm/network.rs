//! Network-driven transitions: the coordinated snapshot protocol.

use hydra_crypto::multisig::SignatureCollector;
use hydra_crypto::sign_bytes;
use hydra_ledger::{canonical_snapshot_bytes, ConfirmedSnapshot, Ledger, Snapshot};

use crate::env::Env;
use crate::messages::{Effect, NetworkInput, NetworkMessage, Outcome, ServerOutput};
use crate::state::{EngineState, HeadState, SeenSnapshot};

pub fn handle_network<L: Ledger>(
    env: &Env,
    engine: EngineState<L>,
    input: NetworkInput<L>,
) -> Outcome<L> {
    match (&engine.head, &input.msg) {
        (HeadState::Open(_), NetworkMessage::ReqTx { .. }) => handle_req_tx(engine, input),
        (HeadState::Open(_), NetworkMessage::ReqSn { .. }) => handle_req_sn(env, engine, input),
        (HeadState::Open(_), NetworkMessage::AckSn { .. }) => handle_ack_sn(env, engine, input),
        _ => Outcome::unchanged(engine),
    }
}

fn handle_req_tx<L: Ledger>(mut engine: EngineState<L>, input: NetworkInput<L>) -> Outcome<L> {
    let NetworkMessage::ReqTx { tx } = input.msg.clone() else {
        unreachable!()
    };
    let HeadState::Open(mut s) = engine.head else {
        unreachable!()
    };

    match L::apply_tx(&s.coordinated.seen_utxo, &tx) {
        Ok(new_utxo) => {
            s.coordinated.seen_txs.push(tx.clone());
            s.coordinated.all_txs.push(tx.clone());
            s.coordinated.seen_utxo = new_utxo;
            engine.head = HeadState::Open(s);
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::TxValid { tx },
                }],
            )
        }
        Err(_) if input.ttl > 1 => {
            // Inputs the tx spends aren't visible yet (e.g. its own
            // dependency is still in flight); give it another lap rather
            // than rejecting outright.
            engine.head = HeadState::Open(s);
            Outcome::unchanged_with(
                engine,
                vec![Effect::RequeueNetwork {
                    input: NetworkInput {
                        ttl: input.ttl - 1,
                        ..input
                    },
                }],
            )
        }
        Err(e) => {
            engine.head = HeadState::Open(s);
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::TxInvalid {
                        tx,
                        reason: format!("ReqTx from relay failed validation: {e}"),
                    },
                }],
            )
        }
    }
}

fn handle_req_sn<L: Ledger>(env: &Env, mut engine: EngineState<L>, input: NetworkInput<L>) -> Outcome<L> {
    let NetworkMessage::ReqSn { leader, number, txs } = input.msg.clone() else {
        unreachable!()
    };
    let HeadState::Open(mut s) = engine.head else {
        unreachable!()
    };

    let expected_leader = s.params.leader_for(number);
    let expected_number = s.coordinated.confirmed_snapshot.number() + 1;
    if leader != expected_leader || leader != input.sender || number != expected_number {
        engine.head = HeadState::Open(s);
        return Outcome::unchanged_with(
            engine,
            vec![Effect::ClientEffect {
                output: ServerOutput::InvalidInput {
                    reason: "ReqSn from unexpected leader or snapshot number".into(),
                },
            }],
        );
    }

    if !txs.iter().all(|tx| s.coordinated.all_txs.contains(tx)) {
        engine.head = HeadState::Open(s);
        return Outcome::unchanged_with(
            engine,
            vec![Effect::ClientEffect {
                output: ServerOutput::InvalidInput {
                    reason: "ReqSn proposes a transaction this party never saw via ReqTx".into(),
                },
            }],
        );
    }

    let base_utxo = s.coordinated.confirmed_snapshot.utxo().clone();
    let candidate_utxo = match L::apply_txs(base_utxo, &txs) {
        Ok(u) => u,
        Err(e) => {
            engine.head = HeadState::Open(s);
            return Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::InvalidInput {
                        reason: format!("ReqSn proposes an inapplicable transaction set: {e}"),
                    },
                }],
            );
        }
    };

    let candidate = Snapshot::<L> {
        number,
        utxo: candidate_utxo,
        confirmed_txs: txs,
    };
    let msg_bytes = canonical_snapshot_bytes::<L>(&s.head_id, candidate.number, &candidate.utxo, &candidate.confirmed_txs);
    let our_sig = sign_bytes(&msg_bytes, &env.signing_key);

    let mut collector = SignatureCollector::new();
    collector.record(env.party, &env.signing_key.verification_key_bytes(), our_sig, &msg_bytes);

    s.coordinated.seen_snapshot = Some(SeenSnapshot {
        candidate,
        sigs: collector,
    });
    engine.head = HeadState::Open(s);

    Outcome::unchanged_with(
        engine,
        vec![Effect::NetworkBroadcast {
            msg: NetworkMessage::AckSn {
                party: env.party,
                snapshot_sig: our_sig,
                number,
            },
        }],
    )
}

fn handle_ack_sn<L: Ledger>(env: &Env, mut engine: EngineState<L>, input: NetworkInput<L>) -> Outcome<L> {
    let NetworkMessage::AckSn { party, snapshot_sig, number } = input.msg else {
        unreachable!()
    };
    let HeadState::Open(mut s) = engine.head else {
        unreachable!()
    };

    let Some(mut seen) = s.coordinated.seen_snapshot.take() else {
        engine.head = HeadState::Open(s);
        return Outcome::unchanged(engine);
    };
    if seen.candidate.number != number || party != input.sender {
        s.coordinated.seen_snapshot = Some(seen);
        engine.head = HeadState::Open(s);
        return Outcome::unchanged(engine);
    }

    let msg_bytes = canonical_snapshot_bytes::<L>(
        &s.head_id,
        seen.candidate.number,
        &seen.candidate.utxo,
        &seen.candidate.confirmed_txs,
    );
    seen.sigs.record(party, &party.0, snapshot_sig, &msg_bytes);

    match seen.sigs.try_complete(s.params.parties()) {
        Ok(multi_sig) => {
            let confirmed_txs = seen.candidate.confirmed_txs.clone();
            s.coordinated.confirmed_snapshot = ConfirmedSnapshot::Confirmed {
                snapshot: seen.candidate.clone(),
                multi_sig,
            };
            s.coordinated.seen_snapshot = None;
            s.coordinated
                .local_txs
                .retain(|tx| !confirmed_txs.contains(tx));
            s.coordinated
                .seen_txs
                .retain(|tx| !confirmed_txs.contains(tx));
            s.coordinated
                .all_txs
                .retain(|tx| !confirmed_txs.contains(tx));

            let snapshot = seen.candidate;
            engine.head = HeadState::Open(s);
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::SnapshotConfirmed { snapshot },
                }],
            )
        }
        Err(sigs) => {
            s.coordinated.seen_snapshot = Some(SeenSnapshot {
                candidate: seen.candidate,
                sigs,
            });
            engine.head = HeadState::Open(s);
            Outcome::unchanged(engine)
        }
    }
}
