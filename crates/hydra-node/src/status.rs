//! Read-only status broadcast, independent of the per-subscriber API
//! stream: any number of monitoring consumers can watch the current head
//! phase without registering as an API client.

use hydra_consensus::HeadState;
use hydra_ledger::Ledger;
use hydra_primitives::party::HeadId;
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HeadPhase {
    Idle,
    Initial,
    Open,
    Closed,
    Final,
}

#[derive(Clone, Debug)]
pub struct NodeStatus {
    pub phase: HeadPhase,
    pub head_id: Option<HeadId>,
    pub last_sequence_id: u64,
}

impl NodeStatus {
    pub fn from_head<L: Ledger>(head: &HeadState<L>, last_sequence_id: u64) -> Self {
        let phase = match head {
            HeadState::Idle { .. } => HeadPhase::Idle,
            HeadState::Initial(_) => HeadPhase::Initial,
            HeadState::Open(_) => HeadPhase::Open,
            HeadState::Closed(_) => HeadPhase::Closed,
            HeadState::Final { .. } => HeadPhase::Final,
        };
        Self {
            phase,
            head_id: head.head_id(),
            last_sequence_id,
        }
    }
}

pub type StatusSender = watch::Sender<NodeStatus>;
pub type StatusReceiver = watch::Receiver<NodeStatus>;

pub fn channel<L: Ledger>(initial_head: &HeadState<L>) -> (StatusSender, StatusReceiver) {
    watch::channel(NodeStatus::from_head(initial_head, 0))
}

/// Serves the current status, once per connection, as a single JSON object.
/// A monitoring probe is expected to open a fresh connection each time it
/// polls rather than keep one open for a stream of updates.
pub async fn run_monitoring_listener(listener: tokio::net::TcpListener, receiver: StatusReceiver) {
    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let status = receiver.borrow().clone();
                tokio::spawn(async move {
                    use tokio::io::AsyncWriteExt;
                    let _ = stream.write_all(status_json(&status).as_bytes()).await;
                });
            }
            Err(err) => tracing::error!(%err, "failed to accept monitoring connection"),
        }
    }
}

fn status_json(status: &NodeStatus) -> String {
    serde_json::json!({
        "phase": format!("{:?}", status.phase),
        "headId": status.head_id.map(|id| hex::encode(id.0.as_bytes())),
        "lastSequenceId": status.last_sequence_id,
    })
    .to_string()
}
