//! Inputs, effects, and the wire/client message shapes the state machine
//! consumes and produces.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use hydra_ledger::ConfirmedSnapshot;
use hydra_ledger::Ledger;
use hydra_primitives::buf::{Buf32, Buf64};
use hydra_primitives::party::{HeadId, HeadParameters, Party};
use serde::{Deserialize, Serialize};

use crate::state::ChainState;

/// Commands issued by the local client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum ClientCommand<L: Ledger> {
    Init,
    Commit { utxo: L::UTxO },
    Abort,
    NewTx {
        #[serde(rename = "transaction")]
        tx: L::Tx,
    },
    GetUTxO,
    Close,
    Contest,
    Fanout,
}

/// Messages exchanged with peers. Signed by the sender party;
/// the signature itself lives in the transport envelope ([`NetworkInput`])
/// rather than the message, since `AckSn` already carries an explicit sig.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum NetworkMessage<L: Ledger> {
    ReqTx { tx: L::Tx },
    ReqSn { leader: Party, number: u64, txs: Vec<L::Tx> },
    AckSn { party: Party, snapshot_sig: Buf64, number: u64 },
}

/// A network message as delivered by the transport, with TTL for bounded
/// `ReqTx` retry and the envelope signature used to authenticate `sender`.
#[derive(Clone, Debug)]
pub struct NetworkInput<L: Ledger> {
    pub sender: Party,
    pub ttl: u32,
    pub msg: NetworkMessage<L>,
}

/// Chain observations mapped by the Chain Observer Adapter.
#[derive(Clone, Debug)]
pub enum ChainEvent<L: Ledger> {
    ObservedInit {
        head_id: HeadId,
        params: HeadParameters,
        seed_tx_in: Buf32,
    },
    ObservedCommit {
        party: Party,
        utxo: L::UTxO,
    },
    ObservedCollectCom,
    ObservedAbort,
    ObservedClose {
        snapshot_number: u64,
        deadline: u64,
    },
    ObservedContest {
        snapshot_number: u64,
    },
    ObservedFanout,
}

/// A chain-tagged input: either a fresh observation (with the chain-state
/// view it produces), a rollback, or a failure report for a previously
/// requested post.
#[derive(Clone, Debug)]
pub enum ChainInput<L: Ledger> {
    Observation {
        event: ChainEvent<L>,
        new_chain_state: ChainState,
    },
    Rollback {
        to_chain_state: ChainState,
    },
    PostTxFailed {
        reason: String,
    },
}

/// The union of everything that can arrive at the Input Queue.
#[derive(Clone, Debug)]
pub enum Input<L: Ledger> {
    Client(ClientCommand<L>),
    Network(NetworkInput<L>),
    Chain(ChainInput<L>),
    Tick { now: u64 },
}

/// A chain transaction the core asks the Chain collaborator to post. The
/// core never constructs or submits the transaction itself.
#[derive(Clone, Debug)]
pub enum PostChainTx<L: Ledger> {
    InitTx {
        params: HeadParameters,
        seed_tx_in: Buf32,
    },
    CommitTx {
        party: Party,
        utxo: L::UTxO,
    },
    AbortTx {
        committed: BTreeMap<Party, L::UTxO>,
    },
    CollectComTx,
    CloseTx {
        confirmed_snapshot: ConfirmedSnapshot<L>,
    },
    ContestTx {
        confirmed_snapshot: ConfirmedSnapshot<L>,
    },
    FanoutTx {
        utxo: L::UTxO,
    },
}

/// Output kinds delivered to API subscribers. `seq`/`timestamp` framing is
/// added at the API Server boundary, not here. Variant names double as the
/// wire `tag`, so they keep their Rust (PascalCase) spelling; only field names
/// are renamed to camelCase.
/// `PeerConnected`/`PeerDisconnected` are part of the external tag union
/// (see the API Server crate) but are never constructed by `step`: peer
/// liveness has no core state transition, so the Network Relay publishes
/// those two facts straight to the API Server, bypassing this type and the
/// Input Queue entirely.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum ServerOutput<L: Ledger> {
    HeadIsInitializing {
        #[serde(rename = "headId")]
        head_id: HeadId,
        params: HeadParameters,
    },
    Committed {
        party: Party,
        utxo: L::UTxO,
    },
    HeadIsOpen {
        #[serde(rename = "headId")]
        head_id: HeadId,
        utxo: L::UTxO,
    },
    HeadIsClosed {
        #[serde(rename = "snapshotNumber")]
        snapshot_number: u64,
        deadline: u64,
    },
    HeadIsContested {
        #[serde(rename = "snapshotNumber")]
        snapshot_number: u64,
    },
    ReadyToFanout,
    HeadIsAborted {
        utxo: L::UTxO,
    },
    HeadIsFinalized {
        utxo: L::UTxO,
    },
    CommandFailed {
        reason: String,
    },
    TxValid {
        #[serde(rename = "transaction")]
        tx: L::Tx,
    },
    TxInvalid {
        #[serde(rename = "transaction")]
        tx: L::Tx,
        reason: String,
    },
    SnapshotConfirmed {
        snapshot: hydra_ledger::Snapshot<L>,
    },
    GetUTxOResponse {
        utxo: L::UTxO,
    },
    InvalidInput {
        reason: String,
    },
    Greetings,
    PostTxOnChainFailed {
        reason: String,
    },
    RolledBack,
}

/// A delayed re-enqueue event, cancellable at fire time if its state
/// precondition no longer holds.
#[derive(Clone, Debug)]
pub enum DelayedEvent {
    ReadyToFanoutTick { head_id: HeadId },
}

/// One of the four effect kinds `step` may emit.
#[derive(Clone, Debug)]
pub enum Effect<L: Ledger> {
    NetworkBroadcast { msg: NetworkMessage<L> },
    ClientEffect { output: ServerOutput<L> },
    OnChainEffect { tx: PostChainTx<L> },
    Delay { until: u64, event: DelayedEvent },
    /// Re-enqueue a `ReqTx` whose referenced inputs are not yet visible,
    /// with `ttl` already decremented; dropped by the caller once `ttl`
    /// reaches zero.
    RequeueNetwork { input: NetworkInput<L> },
}

/// The result of a single `step` invocation: the new persisted state plus
/// the ordered effects to dispatch, in order.
#[derive(Clone, Debug)]
pub struct Outcome<L: Ledger> {
    pub new_state: crate::state::EngineState<L>,
    pub effects: Vec<Effect<L>>,
}

impl<L: Ledger> Outcome<L> {
    pub fn unchanged(state: crate::state::EngineState<L>) -> Self {
        Self {
            new_state: state,
            effects: Vec::new(),
        }
    }

    pub fn unchanged_with(state: crate::state::EngineState<L>, effects: Vec<Effect<L>>) -> Self {
        Self {
            new_state: state,
            effects,
        }
    }
}
