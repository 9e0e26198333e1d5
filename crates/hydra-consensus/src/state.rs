//! In-memory typed state of the head, plus the rollback checkpoint ring that
//! backs chain-rollback handling.

use std::collections::{BTreeMap, VecDeque};

use borsh::{BorshDeserialize, BorshSerialize};
use hydra_crypto::multisig::SignatureCollector;
use hydra_ledger::{ConfirmedSnapshot, Ledger, Snapshot};
use hydra_primitives::buf::Buf32;
use hydra_primitives::party::{HeadId, HeadParameters, Party};

/// Opaque point on the underlying chain; used to recognize rollback targets.
#[derive(Clone, Eq, PartialEq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ChainPoint {
    pub height: u64,
    pub block_hash: Buf32,
}

/// Accumulated view of chain-side UTxOs relevant to the head's script
/// addresses. The core treats this as opaque data it carries around and
/// compares for equality; building it is the Chain Observer Adapter's job.
#[derive(Clone, Eq, PartialEq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ChainState {
    pub point: ChainPoint,
}

/// A snapshot that has collected signatures from some (not yet all) parties.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct SeenSnapshot<L: Ledger> {
    pub candidate: Snapshot<L>,
    pub sigs: SignatureCollector,
}

/// Mutable coordinated-snapshot-protocol bookkeeping for an `Open` head.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct CoordinatedState<L: Ledger> {
    /// UTxO produced by combining all party commits; constant for the head's
    /// lifetime (the genesis/snapshot-0 UTxO).
    pub initial_utxo: L::UTxO,
    /// Transactions this party has locally submitted via `NewTx` and
    /// broadcast, not yet included in a confirmed snapshot.
    pub local_txs: Vec<L::Tx>,
    /// Transactions seen (via `ReqTx`) and applied to `seen_utxo`, not yet
    /// included in a confirmed snapshot.
    pub seen_txs: Vec<L::Tx>,
    /// UTxO after applying `seen_txs` on top of `confirmed_snapshot.utxo`.
    pub seen_utxo: L::UTxO,
    /// The most recent unanimously-signed snapshot.
    pub confirmed_snapshot: ConfirmedSnapshot<L>,
    /// The in-flight next snapshot proposal, if any.
    pub seen_snapshot: Option<SeenSnapshot<L>>,
    /// Union of `seen_txs` plus anything still pending confirmation;
    /// consulted by `ReqSn` validation to check tx availability.
    pub all_txs: Vec<L::Tx>,
}

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct InitialState<L: Ledger> {
    pub head_id: HeadId,
    pub params: HeadParameters,
    pub committed: BTreeMap<Party, L::UTxO>,
    pub chain_state: ChainState,
    pub seed_tx_in: Buf32,
}

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct OpenState<L: Ledger> {
    pub head_id: HeadId,
    pub params: HeadParameters,
    pub coordinated: CoordinatedState<L>,
    pub chain_state: ChainState,
}

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct ClosedState<L: Ledger> {
    pub head_id: HeadId,
    pub params: HeadParameters,
    pub confirmed_snapshot: ConfirmedSnapshot<L>,
    /// Snapshot number the chain observed the close transaction carrying;
    /// kept separate from `confirmed_snapshot.number()` since the latter is
    /// this party's own local view and a `Contest` is only valid when it is
    /// strictly ahead of what was actually posted on-chain.
    pub closed_snapshot_number: u64,
    /// Unix millis after which fanout is permitted.
    pub contestation_deadline: u64,
    pub ready_to_fanout: bool,
    pub chain_state: ChainState,
}

/// The head's typed lifecycle state: `Idle -> Initial -> Open -> Closed ->
/// Final`, with `Initial -> Final` on abort and chain rollback able to move
/// backward.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum HeadState<L: Ledger> {
    Idle {
        chain_state: ChainState,
    },
    Initial(InitialState<L>),
    Open(OpenState<L>),
    Closed(ClosedState<L>),
    Final {
        head_id: HeadId,
        final_utxo: L::UTxO,
        chain_state: ChainState,
    },
}

impl<L: Ledger> HeadState<L> {
    pub fn idle(chain_state: ChainState) -> Self {
        HeadState::Idle { chain_state }
    }

    pub fn chain_state(&self) -> &ChainState {
        match self {
            HeadState::Idle { chain_state } => chain_state,
            HeadState::Initial(s) => &s.chain_state,
            HeadState::Open(s) => &s.chain_state,
            HeadState::Closed(s) => &s.chain_state,
            HeadState::Final { chain_state, .. } => chain_state,
        }
    }

    pub fn head_id(&self) -> Option<HeadId> {
        match self {
            HeadState::Idle { .. } => None,
            HeadState::Initial(s) => Some(s.head_id),
            HeadState::Open(s) => Some(s.head_id),
            HeadState::Closed(s) => Some(s.head_id),
            HeadState::Final { head_id, .. } => Some(*head_id),
        }
    }
}

/// Bounded ring of prior `(HeadState, ChainPoint)` pairs, consulted when a
/// `Rollback` invalidates a chain-caused transition. Depth is configurable
/// (default 100, see `Env::checkpoint_depth`).
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct CheckpointRing<L: Ledger> {
    depth: usize,
    entries: VecDeque<(HeadState<L>, ChainPoint)>,
}

impl<L: Ledger> CheckpointRing<L> {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            entries: VecDeque::with_capacity(depth.max(1)),
        }
    }

    /// Records `state` as the checkpoint reached at `point`, to be called
    /// immediately before any chain-driven transition is applied.
    pub fn push(&mut self, state: HeadState<L>, point: ChainPoint) {
        if self.entries.len() == self.depth {
            self.entries.pop_front();
        }
        self.entries.push_back((state, point));
    }

    /// Finds the most recent checkpoint at or before `target`, if the ring
    /// still holds it (depth exceeded means the rollback cannot be served
    /// and the caller must treat it as unrecoverable; see DESIGN.md).
    pub fn find_at_or_before(&self, target_height: u64) -> Option<&(HeadState<L>, ChainPoint)> {
        self.entries
            .iter()
            .rev()
            .find(|(_, point)| point.height <= target_height)
    }
}

/// The value actually threaded through `step` and persisted: the typed head
/// state plus enough rollback history to undo chain-caused transitions.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct EngineState<L: Ledger> {
    pub head: HeadState<L>,
    pub history: CheckpointRing<L>,
}

impl<L: Ledger> EngineState<L> {
    pub fn new(head: HeadState<L>, checkpoint_depth: usize) -> Self {
        Self {
            head,
            history: CheckpointRing::new(checkpoint_depth),
        }
    }
}
