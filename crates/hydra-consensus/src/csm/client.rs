//! Client-driven transitions.

use hydra_ledger::{ConfirmedSnapshot, Ledger};
use hydra_primitives::party::{ContestationPeriod, HeadParameters};

use crate::env::Env;
use crate::messages::{ClientCommand, Effect, Outcome, PostChainTx, ServerOutput};
use crate::state::{EngineState, HeadState};

pub fn handle_client<L: Ledger>(
    env: &Env,
    mut engine: EngineState<L>,
    cmd: ClientCommand<L>,
) -> Outcome<L> {
    match (&engine.head, cmd) {
        (HeadState::Idle { .. }, ClientCommand::Init) => {
            // The core does not choose `params`/`seed`; in a full
            // implementation these would come from CLI-supplied
            // configuration threaded through `Env`. Here we surface the
            // request to the Chain collaborator, which is the one that
            // knows how to mint a HeadId.
            let effects = vec![Effect::OnChainEffect {
                tx: PostChainTx::InitTx {
                    params: HeadParameters::new(
                        env.all_parties(),
                        ContestationPeriod::from_duration(env.contestation_period),
                    ),
                    seed_tx_in: hydra_primitives::buf::Buf32::zero(),
                },
            }];
            Outcome::unchanged_with(engine, effects)
        }

        (HeadState::Initial(s), ClientCommand::Commit { utxo }) => {
            if s.committed.contains_key(&env.party) {
                return command_failed(engine, "already committed");
            }
            let effects = vec![Effect::OnChainEffect {
                tx: PostChainTx::CommitTx {
                    party: env.party,
                    utxo,
                },
            }];
            Outcome::unchanged_with(engine, effects)
        }

        (HeadState::Initial(s), ClientCommand::Abort) => {
            let effects = vec![Effect::OnChainEffect {
                tx: PostChainTx::AbortTx {
                    committed: s.committed.clone(),
                },
            }];
            Outcome::unchanged_with(engine, effects)
        }

        (HeadState::Open(s), ClientCommand::NewTx { tx }) => {
            match L::apply_tx(&s.coordinated.seen_utxo, &tx) {
                Ok(new_utxo) => {
                    let HeadState::Open(mut s) = engine.head else {
                        unreachable!()
                    };
                    s.coordinated.local_txs.push(tx.clone());
                    s.coordinated.seen_txs.push(tx.clone());
                    s.coordinated.all_txs.push(tx.clone());
                    s.coordinated.seen_utxo = new_utxo;
                    engine.head = HeadState::Open(s);
                    Outcome::unchanged_with(
                        engine,
                        vec![
                            Effect::NetworkBroadcast {
                                msg: crate::messages::NetworkMessage::ReqTx { tx: tx.clone() },
                            },
                            Effect::ClientEffect {
                                output: ServerOutput::TxValid { tx },
                            },
                        ],
                    )
                }
                Err(e) => Outcome::unchanged_with(
                    engine,
                    vec![Effect::ClientEffect {
                        output: ServerOutput::TxInvalid {
                            tx,
                            reason: e.to_string(),
                        },
                    }],
                ),
            }
        }

        (HeadState::Open(s), ClientCommand::GetUTxO) => {
            let utxo = s.coordinated.confirmed_snapshot.utxo().clone();
            Outcome::unchanged_with(
                engine,
                vec![Effect::ClientEffect {
                    output: ServerOutput::GetUTxOResponse { utxo },
                }],
            )
        }

        (HeadState::Open(s), ClientCommand::Close) => {
            let effects = vec![Effect::OnChainEffect {
                tx: PostChainTx::CloseTx {
                    confirmed_snapshot: s.coordinated.confirmed_snapshot.clone(),
                },
            }];
            Outcome::unchanged_with(engine, effects)
        }

        (HeadState::Closed(s), ClientCommand::Contest) => {
            // Only worth contesting if this party's local snapshot is
            // actually ahead of what the chain observed at close time;
            // otherwise there's nothing newer to substitute in.
            if s.confirmed_snapshot.number() <= s.closed_snapshot_number {
                return command_failed(engine, "local snapshot is not newer than the closed snapshot");
            }
            let effects = vec![Effect::OnChainEffect {
                tx: PostChainTx::ContestTx {
                    confirmed_snapshot: s.confirmed_snapshot.clone(),
                },
            }];
            Outcome::unchanged_with(engine, effects)
        }

        (HeadState::Closed(s), ClientCommand::Fanout) => {
            if !s.ready_to_fanout {
                return command_failed(engine, "not yet ready to fanout");
            }
            let utxo = match &s.confirmed_snapshot {
                ConfirmedSnapshot::Initial { utxo } => utxo.clone(),
                ConfirmedSnapshot::Confirmed { snapshot, .. } => snapshot.utxo.clone(),
            };
            Outcome::unchanged_with(
                engine,
                vec![Effect::OnChainEffect {
                    tx: PostChainTx::FanoutTx { utxo },
                }],
            )
        }

        (_, _cmd) => command_failed(engine, "command not valid in current state"),
    }
}

fn command_failed<L: Ledger>(engine: EngineState<L>, reason: &str) -> Outcome<L> {
    Outcome::unchanged_with(
        engine,
        vec![Effect::ClientEffect {
            output: ServerOutput::CommandFailed {
                reason: reason.to_string(),
            },
        }],
    )
}
