//! Network Relay (peer side of the wire transport): deduplicates inbound
//! messages, verifies the sender's signature before anything reaches the
//! engine, and tracks heartbeats to detect disconnected peers.

use std::collections::HashMap;
use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use hydra_consensus::{Input, NetworkInput, NetworkMessage};
use hydra_crypto::sign::verify_bytes;
use hydra_ledger::Ledger;
use hydra_primitives::buf::Buf64;
use hydra_primitives::party::Party;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("input queue is shutting down")]
    QueueShuttingDown,
}

impl From<hydra_queue::QueueError> for NetworkError {
    fn from(_: hydra_queue::QueueError) -> Self {
        NetworkError::QueueShuttingDown
    }
}

/// What actually travels the wire: the protocol messages the engine
/// understands, plus a liveness-only `Heartbeat` the relay consumes itself.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum WireMessage<L: Ledger> {
    Protocol(NetworkMessage<L>),
    Heartbeat,
}

/// A signed, length-prefixed (at the transport layer) wire message.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct Envelope<L: Ledger> {
    pub sender: Party,
    pub ttl: u32,
    pub msg: WireMessage<L>,
    pub sig: Buf64,
}

/// The exact bytes every party signs and verifies an envelope over. The
/// sender's identity is not included since it is already authenticated by
/// matching the claimed sender's own key (`Party` *is* that key's bytes).
pub fn signable_bytes<L: Ledger>(ttl: u32, msg: &WireMessage<L>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&ttl.to_be_bytes());
    msg.serialize(&mut out)
        .expect("borsh serialization to an in-memory buffer cannot fail");
    out
}

fn content_id<L: Ledger>(sender: &Party, ttl: u32, msg: &WireMessage<L>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(sender.as_bytes());
    hasher.update(signable_bytes::<L>(ttl, msg));
    hasher.finalize().into()
}

/// A peer connect/disconnect fact. These never touch head state (there is
/// no core transition for them), so the relay publishes them directly to
/// interested subscribers (typically the API Server) instead of routing
/// them through the input queue.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PeerEvent {
    Connected(Party),
    Disconnected(Party),
}

/// Drops messages already seen within `forget_duration_ms`.
struct RecentMessageTracker {
    seen: Mutex<HashMap<[u8; 32], u128>>,
    forget_duration_ms: u128,
}

impl RecentMessageTracker {
    fn new(forget_duration_ms: u128) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            forget_duration_ms,
        }
    }

    /// Returns `true` if `id` has not been seen within the window, and
    /// records it as seen at `now_ms`.
    async fn check_should_relay(&self, id: [u8; 32], now_ms: u128) -> bool {
        let mut seen = self.seen.lock().await;
        if let Some(last) = seen.get(&id) {
            if now_ms.saturating_sub(*last) < self.forget_duration_ms {
                return false;
            }
        }
        seen.insert(id, now_ms);
        true
    }

    async fn clear_stale(&self, now_ms: u128) {
        let expiry = now_ms.saturating_sub(self.forget_duration_ms);
        let mut seen = self.seen.lock().await;
        seen.retain(|_, ts| *ts > expiry);
    }
}

/// Tracks the last heartbeat time per peer and reports a peer disconnected
/// once it has missed `missed_threshold` consecutive heartbeat periods.
struct HeartbeatTracker {
    last_seen_ms: Mutex<HashMap<Party, u128>>,
    reported_disconnected: Mutex<std::collections::HashSet<Party>>,
    heartbeat_period_ms: u128,
    missed_threshold: u32,
}

impl HeartbeatTracker {
    fn new(heartbeat_period_ms: u128, missed_threshold: u32) -> Self {
        Self {
            last_seen_ms: Mutex::new(HashMap::new()),
            reported_disconnected: Mutex::new(std::collections::HashSet::new()),
            heartbeat_period_ms,
            missed_threshold,
        }
    }

    /// Records a heartbeat from `party`, returning `true` if this is the
    /// first time it's been seen or it is reconnecting after having been
    /// reported disconnected.
    async fn record(&self, party: Party, now_ms: u128) -> bool {
        let mut last_seen = self.last_seen_ms.lock().await;
        let was_known = last_seen.insert(party, now_ms).is_some();
        let was_disconnected = self.reported_disconnected.lock().await.remove(&party);
        !was_known || was_disconnected
    }

    /// Returns the parties newly crossing the missed-heartbeat threshold as
    /// of `now_ms`; each party is reported at most once per disconnection.
    async fn sweep(&self, now_ms: u128) -> Vec<Party> {
        let threshold = self.heartbeat_period_ms * self.missed_threshold as u128;
        let last_seen = self.last_seen_ms.lock().await;
        let mut reported = self.reported_disconnected.lock().await;
        let mut newly_disconnected = Vec::new();
        for (party, last) in last_seen.iter() {
            if now_ms.saturating_sub(*last) >= threshold && reported.insert(*party) {
                newly_disconnected.push(*party);
            }
        }
        newly_disconnected
    }
}

/// Bridges the wire transport to the Input Queue (C1): dedup, signature
/// gate, heartbeat bookkeeping.
pub struct NetworkRelay<L: Ledger> {
    queue: hydra_queue::QueueHandle<Input<L>>,
    dedup: RecentMessageTracker,
    heartbeats: HeartbeatTracker,
    peer_events: broadcast::Sender<PeerEvent>,
}

impl<L: Ledger> NetworkRelay<L> {
    pub fn new(
        queue: hydra_queue::QueueHandle<Input<L>>,
        dedup_window_ms: u128,
        heartbeat_period_ms: u128,
        missed_heartbeat_threshold: u32,
    ) -> Arc<Self> {
        let (peer_events, _) = broadcast::channel(64);
        Arc::new(Self {
            queue,
            dedup: RecentMessageTracker::new(dedup_window_ms),
            heartbeats: HeartbeatTracker::new(heartbeat_period_ms, missed_heartbeat_threshold),
            peer_events,
        })
    }

    pub fn subscribe_peer_events(&self) -> broadcast::Receiver<PeerEvent> {
        self.peer_events.subscribe()
    }

    /// Processes one inbound envelope. Drops (with a log, never an error)
    /// anything that is a repeat, unsigned, malformed, or misattributed;
    /// only well-formed, freshly-seen, correctly-signed protocol messages
    /// reach the input queue.
    pub async fn handle_inbound(&self, envelope: Envelope<L>, now_ms: u128) -> Result<(), NetworkError> {
        let id = content_id::<L>(&envelope.sender, envelope.ttl, &envelope.msg);
        if !self.dedup.check_should_relay(id, now_ms).await {
            tracing::debug!(sender = ?envelope.sender, "dropping duplicate network message");
            return Ok(());
        }

        let preimage = signable_bytes::<L>(envelope.ttl, &envelope.msg);
        if !verify_bytes(&envelope.sig, &preimage, &envelope.sender.0) {
            tracing::warn!(sender = ?envelope.sender, "dropping network message with invalid signature");
            return Ok(());
        }

        let newly_connected = self.heartbeats.record(envelope.sender, now_ms).await;
        if newly_connected {
            let _ = self.peer_events.send(PeerEvent::Connected(envelope.sender));
        }

        match envelope.msg {
            WireMessage::Heartbeat => Ok(()),
            WireMessage::Protocol(msg) => {
                self.queue.enqueue(Input::Network(NetworkInput {
                    sender: envelope.sender,
                    ttl: envelope.ttl,
                    msg,
                }))?;
                Ok(())
            }
        }
    }

    /// Periodic maintenance: call every `heartbeat_period_ms` or so. Clears
    /// the dedup window and publishes `Disconnected` for peers that have
    /// gone quiet.
    pub async fn tick(&self, now_ms: u128) {
        self.dedup.clear_stale(now_ms).await;
        for party in self.heartbeats.sweep(now_ms).await {
            let _ = self.peer_events.send(PeerEvent::Disconnected(party));
        }
    }
}
