//! Node Runtime (C5): the single-consumer loop that dequeues inputs, applies
//! the pure `step` function, persists the result, and dispatches effects.
//! One blocking-recv loop, a cooperative shutdown check each iteration,
//! state owned exclusively by this loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hydra_chain::{ChainClient, ChainObserverAdapter};
use hydra_consensus::{step, DelayedEvent, Effect, EngineState, Env, Input, Outcome, ServerOutput};
use hydra_crypto::sign::sign_bytes;
use hydra_ledger::Ledger;
use hydra_network::{signable_bytes, Envelope, NetworkRelay, WireMessage};
use hydra_persistence::PersistenceLog;
use hydra_queue::{QueueConsumer, QueueHandle};
use tokio::sync::broadcast;

use crate::errors::NodeError;
use crate::shutdown::ShutdownGuard;
use crate::status::{self, StatusSender};

/// Delivers a signed outbound envelope to every connected peer. The actual
/// transport (TCP, QUIC, a relay service...) is an external collaborator
/// this crate doesn't implement; this trait only fixes the posting shape.
#[async_trait]
pub trait NetworkSender<L: Ledger>: Send + Sync {
    async fn broadcast(&self, envelope: Envelope<L>);
}

/// One `ServerOutput` tagged with the sequence id of the input whose `step`
/// produced it. Output formatting for a given subscriber happens downstream
/// of this, at the API Server boundary.
#[derive(Clone, Debug)]
pub struct TaggedOutput<L: Ledger> {
    pub seq: u64,
    pub output: ServerOutput<L>,
}

pub struct NodeRuntime<L: Ledger, C: ChainClient<L>, N: NetworkSender<L>> {
    env: Env,
    queue: QueueConsumer<Input<L>>,
    queue_handle: QueueHandle<Input<L>>,
    persistence: PersistenceLog,
    chain: Arc<ChainObserverAdapter<L, C>>,
    network_sender: N,
    outputs: broadcast::Sender<TaggedOutput<L>>,
    status: StatusSender,
    shutdown: ShutdownGuard,
}

impl<L, C, N> NodeRuntime<L, C, N>
where
    L: Ledger,
    C: ChainClient<L>,
    N: NetworkSender<L>,
{
    pub fn new(
        env: Env,
        queue: QueueConsumer<Input<L>>,
        queue_handle: QueueHandle<Input<L>>,
        persistence: PersistenceLog,
        chain: Arc<ChainObserverAdapter<L, C>>,
        network_sender: N,
        status: StatusSender,
        shutdown: ShutdownGuard,
    ) -> Self {
        let (outputs, _) = broadcast::channel(1024);
        Self {
            env,
            queue,
            queue_handle,
            persistence,
            chain,
            network_sender,
            outputs,
            status,
            shutdown,
        }
    }

    /// Subscribes to every `ClientEffect` output this loop dispatches, in
    /// dispatch order, tagged with its causing sequence id. The API Server
    /// fans this single stream out into per-client queues.
    pub fn subscribe_outputs(&self) -> broadcast::Receiver<TaggedOutput<L>> {
        self.outputs.subscribe()
    }

    pub fn queue_handle(&self) -> QueueHandle<Input<L>> {
        self.queue_handle.clone()
    }

    /// Runs until shutdown is triggered or every producer handle has been
    /// dropped and the queue drains. `state` is whatever the caller already
    /// loaded from persistence, or a fresh `Idle` state otherwise.
    pub async fn run(mut self, mut state: EngineState<L>) -> Result<(), NodeError> {
        loop {
            if self.shutdown.should_shutdown() {
                return Ok(());
            }

            let sequenced = match self.queue.dequeue().await {
                Some(sequenced) => sequenced,
                None if self.shutdown.should_shutdown() => return Ok(()),
                None => return Err(NodeError::QueueClosed),
            };
            let seq = sequenced.id;

            let outcome: Outcome<L> = step(&self.env, state, sequenced.item);
            state = outcome.new_state;

            self.persistence.save(&state)?;
            let _ = self.status.send(status::NodeStatus::from_head(&state.head, seq));

            for effect in outcome.effects {
                self.dispatch(seq, effect).await;
            }
        }
    }

    async fn dispatch(&self, seq: u64, effect: Effect<L>) {
        match effect {
            Effect::NetworkBroadcast { msg } => {
                let ttl = self.env.req_tx_initial_ttl;
                let wire = WireMessage::Protocol(msg);
                let preimage = signable_bytes::<L>(ttl, &wire);
                let sig = sign_bytes(&preimage, &self.env.signing_key);
                let envelope = Envelope {
                    sender: self.env.party,
                    ttl,
                    msg: wire,
                    sig,
                };
                self.network_sender.broadcast(envelope).await;
            }
            Effect::ClientEffect { output } => {
                // A dropped send means no subscriber is currently listening;
                // the runtime never drops a ClientEffect on the node's own
                // behalf, but it also can't buffer for a subscriber that
                // doesn't exist yet (the API Server owns per-client queues).
                let _ = self.outputs.send(TaggedOutput { seq, output });
            }
            Effect::OnChainEffect { tx } => {
                if let Err(err) = self.chain.post(tx).await {
                    tracing::error!(%err, seq, "could not hand chain post off to the adapter");
                }
            }
            Effect::Delay { until, event } => self.schedule_delay(until, event),
            Effect::RequeueNetwork { input } => {
                if let Err(err) = self.queue_handle.enqueue(Input::Network(input)) {
                    tracing::error!(%err, seq, "could not requeue network input");
                }
            }
        }
    }

    /// Schedules a one-shot re-enqueue of `Tick{now: until}` once the wall
    /// clock reaches `until`. No separate cancellation bookkeeping is
    /// needed: `handle_tick` only acts on a `Closed` head whose deadline has
    /// actually passed, so a delay that has been superseded by a later
    /// transition is simply a no-op when it eventually fires.
    fn schedule_delay(&self, until: u64, _event: DelayedEvent) {
        let queue_handle = self.queue_handle.clone();
        let now = hydra_common::now_millis() as u64;
        let wait = Duration::from_millis(until.saturating_sub(now));
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = queue_handle.enqueue(Input::Tick { now: until });
        });
    }
}

/// Periodic producer: enqueues `Tick{now}` inputs (driving snapshot-leader
/// initiation and contestation-deadline sweeps) and drives the Network
/// Relay's own dedup/heartbeat maintenance on the same cadence.
pub async fn run_ticker<L: Ledger>(
    queue_handle: QueueHandle<Input<L>>,
    network_relay: Arc<NetworkRelay<L>>,
    period: Duration,
    shutdown: ShutdownGuard,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if shutdown.should_shutdown() {
            return;
        }
        let now = hydra_common::now_millis();
        network_relay.tick(now).await;
        if queue_handle.enqueue(Input::Tick { now: now as u64 }).is_err() {
            return;
        }
    }
}
