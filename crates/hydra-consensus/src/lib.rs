//! The deterministic head-logic core: typed lifecycle state, inputs/effects,
//! and the pure `step` function the Node Runtime drives.
//!
//! Everything in this crate is free of I/O. Persistence, networking, chain
//! observation, and wall-clock time all live in sibling crates and are
//! plugged in by the runtime that calls [`step`].

pub mod csm;
pub mod env;
pub mod errors;
pub mod messages;
pub mod state;

pub use csm::step;
pub use env::Env;
pub use errors::Error;
pub use messages::{
    ChainEvent, ChainInput, ClientCommand, DelayedEvent, Effect, Input, NetworkInput,
    NetworkMessage, Outcome, PostChainTx, ServerOutput,
};
pub use state::{ChainPoint, ChainState, EngineState, HeadState};

#[cfg(test)]
mod tests {
    use hydra_ledger::ConfirmedSnapshot;
    use hydra_primitives::party::{ContestationPeriod, HeadId, HeadParameters, Party};
    use hydra_primitives::buf::Buf32;
    use hydra_test_utils::{ToyLedger, ToyTx, ToyUtxo};
    use rand::rngs::OsRng;

    use super::*;

    fn env_for(party: Party, sk: hydra_crypto::SigningKey) -> Env {
        Env::new(party, sk, std::time::Duration::from_secs(60))
    }

    fn chain_state(height: u64) -> ChainState {
        ChainState {
            point: ChainPoint {
                height,
                block_hash: Buf32::zero(),
            },
        }
    }

    fn idle_engine() -> EngineState<ToyLedger> {
        EngineState::new(HeadState::idle(chain_state(0)), 16)
    }

    /// Drives a single-party engine from `Idle` to `Open` via
    /// `ObservedInit`/`ObservedCommit`/`ObservedCollectCom`, returning the
    /// resulting engine state.
    fn open_single_party(
        env: &Env,
        head_id: HeadId,
        party: Party,
        utxo: ToyUtxo,
    ) -> EngineState<ToyLedger> {
        let params = HeadParameters::new(
            vec![party],
            ContestationPeriod::from_duration(std::time::Duration::from_secs(60)),
        );
        let outcome = step(
            env,
            idle_engine(),
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedInit {
                    head_id,
                    params,
                    seed_tx_in: Buf32::zero(),
                },
                new_chain_state: chain_state(1),
            }),
        );
        let outcome = step(
            env,
            outcome.new_state,
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedCommit { party, utxo },
                new_chain_state: chain_state(2),
            }),
        );
        let outcome = step(
            env,
            outcome.new_state,
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedCollectCom,
                new_chain_state: chain_state(3),
            }),
        );
        outcome.new_state
    }

    #[test]
    fn init_command_requests_a_chain_post_without_changing_state() {
        let sk = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party = Party(Buf32::from(*sk.verification_key_bytes().as_bytes()));
        let env = env_for(party, sk);

        let outcome = step(&env, idle_engine(), Input::Client(ClientCommand::Init));
        assert!(matches!(outcome.new_state.head, HeadState::Idle { .. }));
        assert_eq!(outcome.effects.len(), 1);
        assert!(matches!(outcome.effects[0], Effect::OnChainEffect { .. }));
    }

    #[test]
    fn observed_init_for_a_foreign_party_set_is_ignored() {
        let sk = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party = Party(Buf32::from(*sk.verification_key_bytes().as_bytes()));
        let env = env_for(party, sk);

        let other = Party(Buf32::from([0xAAu8; 32]));
        let head_id = HeadId(Buf32::from([9u8; 32]));
        let params = HeadParameters::new(
            vec![other],
            ContestationPeriod::from_duration(std::time::Duration::from_secs(60)),
        );
        let outcome = step(
            &env,
            idle_engine(),
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedInit {
                    head_id,
                    params,
                    seed_tx_in: Buf32::zero(),
                },
                new_chain_state: chain_state(1),
            }),
        );
        assert!(matches!(outcome.new_state.head, HeadState::Idle { .. }));
        assert!(outcome.effects.is_empty());
    }

    #[test]
    fn observed_init_moves_idle_to_initial() {
        let sk = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party = Party(Buf32::from(*sk.verification_key_bytes().as_bytes()));
        let env = env_for(party, sk);

        let head_id = HeadId(Buf32::from([9u8; 32]));
        let params = HeadParameters::new(
            vec![party],
            ContestationPeriod::from_duration(std::time::Duration::from_secs(60)),
        );
        let outcome = step(
            &env,
            idle_engine(),
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedInit {
                    head_id,
                    params,
                    seed_tx_in: Buf32::zero(),
                },
                new_chain_state: chain_state(1),
            }),
        );
        assert!(matches!(outcome.new_state.head, HeadState::Initial(_)));
        assert_eq!(outcome.new_state.head.head_id(), Some(head_id));
    }

    #[test]
    fn full_lifecycle_to_open_with_single_party() {
        let sk = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party = Party(Buf32::from(*sk.verification_key_bytes().as_bytes()));
        let env = env_for(party, sk);

        let head_id = HeadId(Buf32::from([1u8; 32]));
        let params = HeadParameters::new(
            vec![party],
            ContestationPeriod::from_duration(std::time::Duration::from_secs(60)),
        );

        let engine = idle_engine();
        let outcome = step(
            &env,
            engine,
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedInit {
                    head_id,
                    params,
                    seed_tx_in: Buf32::zero(),
                },
                new_chain_state: chain_state(1),
            }),
        );

        let outcome = step(
            &env,
            outcome.new_state,
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedCommit {
                    party,
                    utxo: ToyUtxo(vec![42]),
                },
                new_chain_state: chain_state(2),
            }),
        );

        let outcome = step(
            &env,
            outcome.new_state,
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedCollectCom,
                new_chain_state: chain_state(3),
            }),
        );

        match &outcome.new_state.head {
            HeadState::Open(s) => {
                assert_eq!(s.coordinated.initial_utxo, ToyUtxo(vec![42]));
                assert!(matches!(
                    s.coordinated.confirmed_snapshot,
                    ConfirmedSnapshot::Initial { .. }
                ));
            }
            other => panic!("expected Open, got {other:?}"),
        }
    }

    #[test]
    fn rollback_restores_a_prior_checkpoint() {
        let sk = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party = Party(Buf32::from(*sk.verification_key_bytes().as_bytes()));
        let env = env_for(party, sk);

        let head_id = HeadId(Buf32::from([3u8; 32]));
        let params = HeadParameters::new(
            vec![party],
            ContestationPeriod::from_duration(std::time::Duration::from_secs(60)),
        );

        let outcome = step(
            &env,
            idle_engine(),
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedInit {
                    head_id,
                    params,
                    seed_tx_in: Buf32::zero(),
                },
                new_chain_state: chain_state(1),
            }),
        );
        assert!(matches!(outcome.new_state.head, HeadState::Initial(_)));

        let rolled_back = step(
            &env,
            outcome.new_state,
            Input::Chain(ChainInput::Rollback {
                to_chain_state: chain_state(0),
            }),
        );
        assert!(matches!(rolled_back.new_state.head, HeadState::Idle { .. }));
    }

    #[test]
    fn new_tx_broadcasts_and_reports_valid() {
        let sk = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party = Party(Buf32::from(*sk.verification_key_bytes().as_bytes()));
        let env = env_for(party, sk);

        let head_id = HeadId(Buf32::from([4u8; 32]));
        let params = HeadParameters::new(
            vec![party],
            ContestationPeriod::from_duration(std::time::Duration::from_secs(60)),
        );

        let outcome = step(
            &env,
            idle_engine(),
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedInit {
                    head_id,
                    params,
                    seed_tx_in: Buf32::zero(),
                },
                new_chain_state: chain_state(1),
            }),
        );
        let outcome = step(
            &env,
            outcome.new_state,
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedCommit {
                    party,
                    utxo: ToyUtxo(vec![1]),
                },
                new_chain_state: chain_state(2),
            }),
        );
        let outcome = step(
            &env,
            outcome.new_state,
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedCollectCom,
                new_chain_state: chain_state(3),
            }),
        );

        let outcome = step(
            &env,
            outcome.new_state,
            Input::Client(ClientCommand::NewTx { tx: ToyTx(7) }),
        );
        assert_eq!(outcome.effects.len(), 2);
        assert!(matches!(outcome.effects[1], Effect::ClientEffect {
            output: ServerOutput::TxValid { .. }
        }));
    }

    #[test]
    fn full_lifecycle_through_close_and_fanout() {
        let sk = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party = Party(Buf32::from(*sk.verification_key_bytes().as_bytes()));
        let env = env_for(party, sk);
        let head_id = HeadId(Buf32::from([5u8; 32]));

        let state = open_single_party(&env, head_id, party, ToyUtxo(vec![7]));

        let outcome = step(&env, state, Input::Client(ClientCommand::Close));
        assert!(matches!(outcome.new_state.head, HeadState::Open(_)));
        assert!(matches!(outcome.effects[0], Effect::OnChainEffect {
            tx: PostChainTx::CloseTx { .. }
        }));

        let outcome = step(
            &env,
            outcome.new_state,
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedClose {
                    snapshot_number: 0,
                    deadline: 1_000,
                },
                new_chain_state: chain_state(4),
            }),
        );
        assert!(matches!(outcome.new_state.head, HeadState::Closed(_)));
        assert_eq!(outcome.effects.len(), 2);
        assert!(matches!(outcome.effects[0], Effect::ClientEffect {
            output: ServerOutput::HeadIsClosed { .. }
        }));
        assert!(matches!(outcome.effects[1], Effect::Delay { .. }));

        let outcome = step(&env, outcome.new_state, Input::Tick { now: 1_000 });
        match &outcome.new_state.head {
            HeadState::Closed(s) => assert!(s.ready_to_fanout),
            other => panic!("expected Closed, got {other:?}"),
        }
        assert!(matches!(outcome.effects[0], Effect::ClientEffect {
            output: ServerOutput::ReadyToFanout
        }));

        let outcome = step(&env, outcome.new_state, Input::Client(ClientCommand::Fanout));
        assert!(matches!(outcome.effects[0], Effect::OnChainEffect {
            tx: PostChainTx::FanoutTx { .. }
        }));

        let outcome = step(
            &env,
            outcome.new_state,
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedFanout,
                new_chain_state: chain_state(5),
            }),
        );
        assert!(matches!(outcome.new_state.head, HeadState::Final { .. }));
    }

    #[test]
    fn contest_is_rejected_when_local_snapshot_is_not_newer_than_closed() {
        let sk = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party = Party(Buf32::from(*sk.verification_key_bytes().as_bytes()));
        let env = env_for(party, sk);
        let head_id = HeadId(Buf32::from([6u8; 32]));

        let state = open_single_party(&env, head_id, party, ToyUtxo(vec![1]));
        let outcome = step(
            &env,
            state,
            Input::Chain(ChainInput::Observation {
                event: ChainEvent::ObservedClose {
                    snapshot_number: 0,
                    deadline: 1_000,
                },
                new_chain_state: chain_state(4),
            }),
        );

        let outcome = step(&env, outcome.new_state, Input::Client(ClientCommand::Contest));
        assert!(matches!(outcome.new_state.head, HeadState::Closed(_)));
        assert_eq!(outcome.effects.len(), 1);
        assert!(matches!(outcome.effects[0], Effect::ClientEffect {
            output: ServerOutput::CommandFailed { .. }
        }));
    }

    #[test]
    fn req_sn_rejects_a_tx_never_seen_via_req_tx() {
        let sk = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party = Party(Buf32::from(*sk.verification_key_bytes().as_bytes()));
        let env = env_for(party, sk);
        let head_id = HeadId(Buf32::from([7u8; 32]));

        let state = open_single_party(&env, head_id, party, ToyUtxo(vec![1]));
        let outcome = step(
            &env,
            state,
            Input::Network(NetworkInput {
                sender: party,
                ttl: 5,
                msg: NetworkMessage::ReqSn {
                    leader: party,
                    number: 1,
                    txs: vec![ToyTx(99)],
                },
            }),
        );
        assert!(matches!(outcome.new_state.head, HeadState::Open(s) if s.coordinated.seen_snapshot.is_none()));
        assert!(matches!(outcome.effects[0], Effect::ClientEffect {
            output: ServerOutput::InvalidInput { .. }
        }));
    }

    /// S4/S5-style scenario: two parties exchange `ReqTx`/`ReqSn`/`AckSn` to
    /// a unanimous `SnapshotConfirmed`, and the leader's `all_txs` bookkeeping
    /// is trimmed once the snapshot is confirmed.
    #[test]
    fn multi_party_snapshot_confirmation_trims_all_txs() {
        let sk_a = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party_a = Party(Buf32::from(*sk_a.verification_key_bytes().as_bytes()));
        let sk_b = hydra_crypto::SigningKey::generate(&mut OsRng);
        let party_b = Party(Buf32::from(*sk_b.verification_key_bytes().as_bytes()));

        let params = HeadParameters::new(
            vec![party_a, party_b],
            ContestationPeriod::from_duration(std::time::Duration::from_secs(60)),
        );
        let leader = params.leader_for(1);
        let follower = if leader == party_a { party_b } else { party_a };
        let leader_sk = if leader == party_a { sk_a } else { sk_b };
        let follower_sk = if leader == party_a { sk_b } else { sk_a };

        let env_leader = Env::new(leader, leader_sk, std::time::Duration::from_secs(60))
            .with_other_parties(vec![follower]);
        let env_follower = Env::new(follower, follower_sk, std::time::Duration::from_secs(60))
            .with_other_parties(vec![leader]);

        let head_id = HeadId(Buf32::from([8u8; 32]));

        let open_two_party = |env: &Env, self_utxo: ToyUtxo, other_party: Party, other_utxo: ToyUtxo| {
            let outcome = step(
                env,
                idle_engine(),
                Input::Chain(ChainInput::Observation {
                    event: ChainEvent::ObservedInit {
                        head_id,
                        params: params.clone(),
                        seed_tx_in: Buf32::zero(),
                    },
                    new_chain_state: chain_state(1),
                }),
            );
            let outcome = step(
                env,
                outcome.new_state,
                Input::Chain(ChainInput::Observation {
                    event: ChainEvent::ObservedCommit {
                        party: env.party,
                        utxo: self_utxo,
                    },
                    new_chain_state: chain_state(2),
                }),
            );
            let outcome = step(
                env,
                outcome.new_state,
                Input::Chain(ChainInput::Observation {
                    event: ChainEvent::ObservedCommit {
                        party: other_party,
                        utxo: other_utxo,
                    },
                    new_chain_state: chain_state(3),
                }),
            );
            let outcome = step(
                env,
                outcome.new_state,
                Input::Chain(ChainInput::Observation {
                    event: ChainEvent::ObservedCollectCom,
                    new_chain_state: chain_state(4),
                }),
            );
            outcome.new_state
        };

        let leader_state = open_two_party(&env_leader, ToyUtxo(vec![1]), follower, ToyUtxo(vec![2]));
        let follower_state = open_two_party(&env_follower, ToyUtxo(vec![2]), leader, ToyUtxo(vec![1]));

        // Leader submits a tx locally and broadcasts it.
        let outcome = step(
            &env_leader,
            leader_state,
            Input::Client(ClientCommand::NewTx { tx: ToyTx(99) }),
        );
        let leader_state = outcome.new_state;

        // Follower receives it via ReqTx.
        let outcome = step(
            &env_follower,
            follower_state,
            Input::Network(NetworkInput {
                sender: leader,
                ttl: 5,
                msg: NetworkMessage::ReqTx { tx: ToyTx(99) },
            }),
        );
        assert!(matches!(outcome.effects[0], Effect::ClientEffect {
            output: ServerOutput::TxValid { .. }
        }));
        let follower_state = outcome.new_state;

        // Leader's tick proposes a snapshot over the pending tx.
        let outcome = step(&env_leader, leader_state, Input::Tick { now: 0 });
        let leader_state = outcome.new_state;

        // Follower accepts the proposal and acks.
        let outcome = step(
            &env_follower,
            follower_state,
            Input::Network(NetworkInput {
                sender: leader,
                ttl: 5,
                msg: NetworkMessage::ReqSn {
                    leader,
                    number: 1,
                    txs: vec![ToyTx(99)],
                },
            }),
        );
        let Effect::NetworkBroadcast {
            msg: NetworkMessage::AckSn { party: ack_party, snapshot_sig, number },
        } = outcome.effects[0].clone()
        else {
            panic!("expected AckSn broadcast, got {:?}", outcome.effects);
        };
        assert_eq!(ack_party, follower);

        // Leader receives the follower's ack, reaching unanimity.
        let outcome = step(
            &env_leader,
            leader_state,
            Input::Network(NetworkInput {
                sender: follower,
                ttl: 5,
                msg: NetworkMessage::AckSn { party: ack_party, snapshot_sig, number },
            }),
        );
        assert!(matches!(outcome.effects[0], Effect::ClientEffect {
            output: ServerOutput::SnapshotConfirmed { .. }
        }));
        match &outcome.new_state.head {
            HeadState::Open(s) => {
                assert_eq!(s.coordinated.confirmed_snapshot.number(), 1);
                assert!(s.coordinated.all_txs.is_empty());
                assert!(s.coordinated.seen_txs.is_empty());
                assert!(s.coordinated.local_txs.is_empty());
            }
            other => panic!("expected Open, got {other:?}"),
        }
    }
}
