//! Chain-driven transitions: on-chain observations and rollback.

use hydra_ledger::{ConfirmedSnapshot, Ledger};

use crate::env::Env;
use crate::messages::{ChainEvent, ChainInput, Effect, Outcome, ServerOutput};
use crate::state::{ChainState, ClosedState, CoordinatedState, EngineState, HeadState, InitialState, OpenState};

pub fn handle_chain<L: Ledger>(env: &Env, engine: EngineState<L>, input: ChainInput<L>) -> Outcome<L> {
    match input {
        ChainInput::Observation { event, new_chain_state } => {
            handle_observation(env, engine, event, new_chain_state)
        }
        ChainInput::Rollback { to_chain_state } => handle_rollback(engine, to_chain_state),
        ChainInput::PostTxFailed { reason } => Outcome::unchanged_with(
            engine,
            vec![Effect::ClientEffect {
                output: ServerOutput::PostTxOnChainFailed { reason },
            }],
        ),
    }
}

fn checkpoint<L: Ledger>(mut engine: EngineState<L>) -> EngineState<L> {
    let point = engine.head.chain_state().point.clone();
    engine.history.push(engine.head.clone(), point);
    engine
}

fn handle_observation<L: Ledger>(
    env: &Env,
    engine: EngineState<L>,
    event: ChainEvent<L>,
    new_chain_state: ChainState,
) -> Outcome<L> {
    let mut engine = checkpoint(engine);

    match (&engine.head, event) {
        (
            HeadState::Idle { .. },
            ChainEvent::ObservedInit {
                head_id,
                params,
                seed_tx_in,
            },
        ) if params.contains(&env.party) => {
            engine.head = HeadState::Initial(InitialState {
                head_id,
                params: params.clone(),
                committed: Default::default(),
                chain_state: new_chain_state,
                seed_tx_in,
            });
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::HeadIsInitializing { head_id, params },
                }],
            )
        }

        (HeadState::Initial(_), ChainEvent::ObservedCommit { party, utxo }) => {
            let HeadState::Initial(mut s) = engine.head else {
                unreachable!()
            };
            s.committed.insert(party, utxo.clone());
            s.chain_state = new_chain_state;
            engine.head = HeadState::Initial(s);
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::Committed { party, utxo },
                }],
            )
        }

        (HeadState::Initial(s), ChainEvent::ObservedCollectCom) => {
            let head_id = s.head_id;
            let params = s.params.clone();
            let initial_utxo = s
                .committed
                .values()
                .fold(L::empty_utxo(), |acc, u| L::union_utxo(&acc, u));

            engine.head = HeadState::Open(OpenState {
                head_id,
                params,
                coordinated: CoordinatedState {
                    initial_utxo: initial_utxo.clone(),
                    local_txs: Vec::new(),
                    seen_txs: Vec::new(),
                    seen_utxo: initial_utxo.clone(),
                    confirmed_snapshot: ConfirmedSnapshot::Initial {
                        utxo: initial_utxo.clone(),
                    },
                    seen_snapshot: None,
                    all_txs: Vec::new(),
                },
                chain_state: new_chain_state,
            });
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::HeadIsOpen {
                        head_id,
                        utxo: initial_utxo,
                    },
                }],
            )
        }

        (HeadState::Initial(s), ChainEvent::ObservedAbort) => {
            let head_id = s.head_id;
            let utxo = s
                .committed
                .values()
                .fold(L::empty_utxo(), |acc, u| L::union_utxo(&acc, u));
            engine.head = HeadState::Final {
                head_id,
                final_utxo: utxo.clone(),
                chain_state: new_chain_state,
            };
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::HeadIsAborted { utxo },
                }],
            )
        }

        (HeadState::Open(s), ChainEvent::ObservedClose { snapshot_number, deadline }) => {
            let head_id = s.head_id;
            let params = s.params.clone();
            let confirmed_snapshot = s.coordinated.confirmed_snapshot.clone();
            engine.head = HeadState::Closed(ClosedState {
                head_id,
                params,
                confirmed_snapshot,
                closed_snapshot_number: snapshot_number,
                contestation_deadline: deadline,
                ready_to_fanout: false,
                chain_state: new_chain_state,
            });
            Outcome::unchanged_with(
                engine,
                vec![
                    Effect::ClientEffect {
                        output: ServerOutput::HeadIsClosed {
                            snapshot_number,
                            deadline,
                        },
                    },
                    Effect::Delay {
                        until: deadline,
                        event: crate::messages::DelayedEvent::ReadyToFanoutTick { head_id },
                    },
                ],
            )
        }

        (HeadState::Closed(s), ChainEvent::ObservedContest { snapshot_number }) => {
            let mut s = s.clone();
            // Decided in DESIGN.md: extend the deadline by a full
            // contestation period from its current value rather than from
            // "now" (the chain observation carries no wall-clock time), and
            // un-flip `ready_to_fanout` since the window just reopened.
            s.contestation_deadline = s
                .contestation_deadline
                .saturating_add(env.contestation_period.as_millis() as u64);
            s.ready_to_fanout = false;
            s.closed_snapshot_number = snapshot_number;
            s.chain_state = new_chain_state;
            engine.head = HeadState::Closed(s);
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::HeadIsContested { snapshot_number },
                }],
            )
        }

        (HeadState::Closed(s), ChainEvent::ObservedFanout) => {
            let head_id = s.head_id;
            let utxo = match &s.confirmed_snapshot {
                ConfirmedSnapshot::Initial { utxo } => utxo.clone(),
                ConfirmedSnapshot::Confirmed { snapshot, .. } => snapshot.utxo.clone(),
            };
            engine.head = HeadState::Final {
                head_id,
                final_utxo: utxo.clone(),
                chain_state: new_chain_state,
            };
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::HeadIsFinalized { utxo },
                }],
            )
        }

        (_, _event) => {
            // An observation that doesn't apply to the current state (e.g. a
            // stale/duplicate callback from the Chain Observer Adapter);
            // ignored rather than treated as an error.
            Outcome::unchanged(engine)
        }
    }
}

fn handle_rollback<L: Ledger>(engine: EngineState<L>, to_chain_state: ChainState) -> Outcome<L> {
    match engine.history.find_at_or_before(to_chain_state.point.height) {
        Some((restored_head, _)) => {
            let restored_head = restored_head.clone();
            let new_engine = EngineState {
                head: restored_head,
                history: engine.history,
            };
            Outcome::unchanged_with(
                new_engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::RolledBack,
                }],
            )
        }
        None => {
            // Rollback target older than anything the ring retained; the
            // node cannot recover locally and surfaces this as a failed
            // command rather than silently continuing on wrong state.
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::CommandFailed {
                        reason: format!(
                            "rollback target height {} exceeds local checkpoint history",
                            to_chain_state.point.height
                        ),
                    },
                }],
            )
        }
    }
}
