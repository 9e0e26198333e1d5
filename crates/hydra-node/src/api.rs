//! API Server (C8): fans the single dispatched-output stream out into one
//! outbound queue per connected client, parses inbound JSON client commands
//! onto the Input Queue, and applies output formatting at the
//! serialization boundary only — `step` never knows this layer exists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use hydra_consensus::{ClientCommand, Input};
use hydra_ledger::Ledger;
use hydra_network::PeerEvent;
use hydra_queue::QueueHandle;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::runtime::TaggedOutput;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("input queue is shutting down")]
    QueueShuttingDown,
    #[error("unknown client id {0}")]
    UnknownClient(u64),
}

impl From<hydra_queue::QueueError> for ApiError {
    fn from(_: hydra_queue::QueueError) -> Self {
        ApiError::QueueShuttingDown
    }
}

/// How `transaction` fields (and `confirmedTransactions[]` entries) are
/// rendered for a given subscriber.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxRepr {
    Json,
    CborHex,
}

/// Whether `SnapshotConfirmed` outputs carry their `utxo` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UtxoInSnapshot {
    Include,
    Omit,
}

#[derive(Clone, Copy, Debug)]
pub struct OutputFormat {
    pub tx_repr: TxRepr,
    pub utxo_in_snapshot: UtxoInSnapshot,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            tx_repr: TxRepr::Json,
            utxo_in_snapshot: UtxoInSnapshot::Include,
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ClientId(u64);

struct Subscriber {
    tx: mpsc::UnboundedSender<String>,
    format: OutputFormat,
}

/// Owns the per-client outbound queues. Each is unbounded so a slow client
/// never back-pressures delivery to others or the node loop; a client that
/// never drains its queue only grows its own memory, not the system's.
pub struct ApiServer<L: Ledger> {
    queue_handle: QueueHandle<Input<L>>,
    next_client_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

impl<L: Ledger> ApiServer<L> {
    pub fn new(queue_handle: QueueHandle<Input<L>>) -> Self {
        Self {
            queue_handle,
            next_client_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new subscriber and returns its id plus the receiving end
    /// of its outbound queue of already-formatted JSON text.
    pub fn connect(&self, format: OutputFormat) -> (ClientId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("subscribers mutex poisoned")
            .insert(id, Subscriber { tx, format });
        send_greeting(&self.subscribers, id);
        (ClientId(id), rx)
    }

    pub fn disconnect(&self, id: ClientId) {
        self.subscribers
            .lock()
            .expect("subscribers mutex poisoned")
            .remove(&id.0);
    }

    /// Parses `text` as a [`ClientCommand`] and pushes it onto the Input
    /// Queue. A parse failure never reaches `step`; it is reported as
    /// `InvalidInput` to the originating client only.
    pub fn handle_client_message(&self, id: ClientId, text: &str) -> Result<(), ApiError> {
        match serde_json::from_str::<ClientCommand<L>>(text) {
            Ok(cmd) => {
                self.queue_handle.enqueue(Input::Client(cmd))?;
                Ok(())
            }
            Err(err) => {
                self.send_to(
                    id,
                    serde_json::json!({
                        "tag": "InvalidInput",
                        "reason": err.to_string(),
                    }),
                );
                Ok(())
            }
        }
    }

    fn send_to(&self, id: ClientId, value: serde_json::Value) {
        let subscribers = self.subscribers.lock().expect("subscribers mutex poisoned");
        if let Some(subscriber) = subscribers.get(&id.0) {
            let _ = subscriber.tx.send(value.to_string());
        }
    }

    fn broadcast(&self, build: impl Fn(OutputFormat) -> serde_json::Value) {
        let subscribers = self.subscribers.lock().expect("subscribers mutex poisoned");
        for subscriber in subscribers.values() {
            let value = build(subscriber.format);
            let _ = subscriber.tx.send(value.to_string());
        }
    }

    /// Drives the fan-out from the node loop's dispatched-output stream and
    /// the Network Relay's peer-liveness stream into every connected
    /// client's own queue, until both upstream channels close.
    pub async fn run_fanout(
        &self,
        mut outputs: broadcast::Receiver<TaggedOutput<L>>,
        mut peer_events: broadcast::Receiver<PeerEvent>,
    ) {
        loop {
            tokio::select! {
                output = outputs.recv() => {
                    match output {
                        Ok(tagged) => {
                            self.broadcast(|format| format_output(tagged.seq, &tagged.output, format));
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "api output fanout lagged behind the node loop");
                        }
                    }
                }
                event = peer_events.recv() => {
                    match event {
                        Ok(event) => self.broadcast(|_format| format_peer_event(&event)),
                        Err(broadcast::error::RecvError::Closed) => return,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "api peer-event fanout lagged behind the network relay");
                        }
                    }
                }
            }
        }
    }
}

fn send_greeting(subscribers: &Mutex<HashMap<u64, Subscriber>>, id: u64) {
    let subscribers = subscribers.lock().expect("subscribers mutex poisoned");
    if let Some(subscriber) = subscribers.get(&id) {
        let greeting = serde_json::json!({ "tag": "Greetings", "timestamp": iso8601_now() });
        let _ = subscriber.tx.send(greeting.to_string());
    }
}

fn format_peer_event(event: &PeerEvent) -> serde_json::Value {
    let (tag, party) = match event {
        PeerEvent::Connected(party) => ("PeerConnected", party),
        PeerEvent::Disconnected(party) => ("PeerDisconnected", party),
    };
    serde_json::json!({
        "tag": tag,
        "party": hex::encode(party.as_bytes()),
        "timestamp": iso8601_now(),
    })
}

fn encode_tx_hex<T: Serialize>(tx: &T) -> String {
    let mut buf = Vec::new();
    ciborium::into_writer(tx, &mut buf).expect("cbor encoding of an in-memory value cannot fail");
    hex::encode(buf)
}

/// Renders one `ServerOutput` as the JSON object delivered to a client with
/// the given [`OutputFormat`], stamping `seq`/`timestamp` per the external
/// interface contract. Transaction re-encoding and `utxo` omission are
/// applied here, never inside `step`.
fn format_output<L: Ledger>(seq: u64, output: &hydra_consensus::ServerOutput<L>, format: OutputFormat) -> serde_json::Value {
    use hydra_consensus::ServerOutput;

    let mut value = serde_json::to_value(output).expect("ServerOutput always serializes to JSON");
    if let serde_json::Value::Object(map) = &mut value {
        match output {
            ServerOutput::TxValid { tx } if format.tx_repr == TxRepr::CborHex => {
                map.insert("transaction".into(), encode_tx_hex(tx).into());
            }
            ServerOutput::TxInvalid { tx, .. } if format.tx_repr == TxRepr::CborHex => {
                map.insert("transaction".into(), encode_tx_hex(tx).into());
            }
            ServerOutput::SnapshotConfirmed { snapshot } => {
                if let Some(serde_json::Value::Object(snap_map)) = map.get_mut("snapshot") {
                    if format.tx_repr == TxRepr::CborHex {
                        let hexed: Vec<serde_json::Value> = snapshot
                            .confirmed_txs
                            .iter()
                            .map(|tx| serde_json::Value::String(encode_tx_hex(tx)))
                            .collect();
                        snap_map.insert("confirmedTransactions".into(), serde_json::Value::Array(hexed));
                    }
                    if format.utxo_in_snapshot == UtxoInSnapshot::Omit {
                        snap_map.remove("utxo");
                    }
                }
            }
            _ => {}
        }
        map.insert("seq".into(), seq.into());
        map.insert("timestamp".into(), iso8601_now().into());
    }
    value
}

fn iso8601_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
