//! Time-driven transitions: snapshot-leader initiation and delayed-event
//! firing (leader rotation and the `ReadyToFanoutTick` sweep).

use hydra_crypto::multisig::SignatureCollector;
use hydra_crypto::sign_bytes;
use hydra_ledger::{canonical_snapshot_bytes, Ledger, Snapshot};

use crate::env::Env;
use crate::messages::{Effect, NetworkMessage, Outcome, ServerOutput};
use crate::state::{EngineState, HeadState, SeenSnapshot};

pub fn handle_tick<L: Ledger>(env: &Env, mut engine: EngineState<L>, now: u64) -> Outcome<L> {
    match &engine.head {
        HeadState::Open(_) => maybe_initiate_snapshot(env, engine),

        HeadState::Closed(s) if !s.ready_to_fanout && now >= s.contestation_deadline => {
            let HeadState::Closed(mut s) = engine.head else {
                unreachable!()
            };
            s.ready_to_fanout = true;
            engine.head = HeadState::Closed(s);
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::ReadyToFanout,
                }],
            )
        }

        _ => Outcome::unchanged(engine),
    }
}

fn maybe_initiate_snapshot<L: Ledger>(env: &Env, mut engine: EngineState<L>) -> Outcome<L> {
    let HeadState::Open(mut s) = engine.head else {
        unreachable!()
    };

    if s.coordinated.seen_snapshot.is_some() {
        engine.head = HeadState::Open(s);
        return Outcome::unchanged(engine);
    }

    let next_number = s.coordinated.confirmed_snapshot.number() + 1;
    if s.params.leader_for(next_number) != env.party {
        engine.head = HeadState::Open(s);
        return Outcome::unchanged(engine);
    }

    let pending: Vec<L::Tx> = s
        .coordinated
        .all_txs
        .iter()
        .filter(|tx| !s.coordinated.confirmed_snapshot.confirmed_txs().contains(tx))
        .cloned()
        .collect();
    if pending.is_empty() {
        engine.head = HeadState::Open(s);
        return Outcome::unchanged(engine);
    }

    let base_utxo = s.coordinated.confirmed_snapshot.utxo().clone();
    let candidate_utxo = match L::apply_txs(base_utxo, &pending) {
        Ok(u) => u,
        Err(_) => {
            // A previously-seen tx no longer applies cleanly against the
            // current confirmed base (e.g. conflicts with another seen tx);
            // skip this round rather than propose an invalid snapshot.
            engine.head = HeadState::Open(s);
            return Outcome::unchanged(engine);
        }
    };

    let candidate = Snapshot::<L> {
        number: next_number,
        utxo: candidate_utxo,
        confirmed_txs: pending.clone(),
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
            msg: NetworkMessage::ReqSn {
                leader: env.party,
                number: next_number,
                txs: pending,
            },
        }],
    )
}
