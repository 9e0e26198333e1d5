//! Minimal length-prefixed Borsh transport over TCP: the wire-level
//! collaborator `NetworkSender`/`NetworkRelay` (in `hydra-network`) are
//! deliberately decoupled from. One frame is a big-endian `u32` length
//! followed by that many bytes of a Borsh-encoded `Envelope<L>`.

use std::net::SocketAddr;
use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use hydra_ledger::Ledger;
use hydra_network::{Envelope, NetworkRelay};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::runtime::NetworkSender;

/// Sends a fresh connection per broadcast to each known peer address. This
/// repo has no persistent connection pool (see DESIGN.md); a peer that is
/// briefly unreachable just misses this one message, same as a dropped UDP
/// packet would, and catches up from a later `ReqSn`/gossip retransmission.
pub struct TcpNetworkSender<L: Ledger> {
    peer_addrs: Vec<SocketAddr>,
    _marker: std::marker::PhantomData<L>,
}

impl<L: Ledger> TcpNetworkSender<L> {
    pub fn new(peer_addrs: Vec<SocketAddr>) -> Self {
        Self {
            peer_addrs,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<L: Ledger> NetworkSender<L> for TcpNetworkSender<L> {
    async fn broadcast(&self, envelope: Envelope<L>) {
        let mut payload = Vec::new();
        envelope
            .serialize(&mut payload)
            .expect("borsh serialization to an in-memory buffer cannot fail");

        for addr in &self.peer_addrs {
            let payload = payload.clone();
            let addr = *addr;
            tokio::spawn(async move {
                if let Err(err) = send_frame(addr, &payload).await {
                    tracing::warn!(%err, %addr, "failed to deliver envelope to peer");
                }
            });
        }
    }
}

async fn send_frame(addr: SocketAddr, payload: &[u8]) -> std::io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_u32(payload.len() as u32).await?;
    stream.write_all(payload).await?;
    Ok(())
}

/// Accepts inbound connections and hands each decoded envelope to the
/// Network Relay for dedup, the signature gate, and heartbeat bookkeeping.
pub async fn run_listener<L: Ledger>(listener: TcpListener, relay: Arc<NetworkRelay<L>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let relay = relay.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, relay).await {
                        tracing::debug!(%err, %peer_addr, "network connection closed");
                    }
                });
            }
            Err(err) => tracing::error!(%err, "failed to accept network connection"),
        }
    }
}

async fn handle_connection<L: Ledger>(
    mut stream: TcpStream,
    relay: Arc<NetworkRelay<L>>,
) -> std::io::Result<()> {
    loop {
        let len = match stream.read_u32().await {
            Ok(len) => len,
            Err(_) => return Ok(()),
        };
        let mut buf = vec![0u8; len as usize];
        stream.read_exact(&mut buf).await?;

        match Envelope::<L>::try_from_slice(&buf) {
            Ok(envelope) => {
                let now = hydra_common::now_millis();
                if let Err(err) = relay.handle_inbound(envelope, now).await {
                    tracing::warn!(%err, "network relay rejected inbound envelope");
                }
            }
            Err(err) => tracing::warn!(%err, "dropping malformed network frame"),
        }
    }
}
