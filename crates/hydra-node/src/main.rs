//! Binary entry point: wires the Input Queue, Persistence Log, Chain
//! Observer Adapter, Network Relay, Node Runtime, and API Server together
//! around a single party's view of one head.

mod api;
mod config;
mod errors;
mod net;
mod runtime;
mod shutdown;
mod status;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use hydra_chain::{ChainClient, ChainObserverAdapter};
use hydra_consensus::{ChainPoint, ChainState, EngineState, Env, HeadState, Input, PostChainTx};
use hydra_network::NetworkRelay;
use hydra_persistence::PersistenceLog;
use hydra_primitives::buf::Buf32;
use hydra_primitives::party::Party;
use hydra_test_utils::ToyLedger;
use tokio::net::TcpListener;

use crate::api::{ApiServer, OutputFormat};
use crate::config::{load_or_generate_party_key, Cli, Command, RunArgs, RunOptions};
use crate::runtime::NodeRuntime;
use crate::shutdown::ShutdownGuard;

/// Every envelope is gossiped to all configured peers, so there is nothing
/// the network relay needs beyond the addresses in `RunOptions.peers`; the
/// window/period constants below are implementation defaults (see
/// DESIGN.md), not something `RunOptions` exposes.
const DEDUP_WINDOW_MS: u128 = 30_000;
const HEARTBEAT_PERIOD_MS: u64 = 5_000;
const MISSED_HEARTBEAT_THRESHOLD: u32 = 3;

/// Logs what would have been posted on-chain and always succeeds. Posting an
/// actual chain transaction requires a concrete chain client (a Bitcoin RPC
/// connection, a wallet, script construction) this repository doesn't carry;
/// a production deployment supplies its own `ChainClient` impl here.
struct LoggingChainClient;

#[async_trait]
impl ChainClient<ToyLedger> for LoggingChainClient {
    async fn submit(&self, tx: PostChainTx<ToyLedger>) -> Result<(), String> {
        tracing::info!(?tx, "would post chain transaction (no chain client configured)");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::PublishScripts(args) => publish_scripts(args).await,
    }
}

async fn publish_scripts(args: config::PublishScriptsArgs) -> anyhow::Result<()> {
    hydra_common::init_logging(hydra_common::LoggerConfig::new("hydra-node-publish-scripts"));
    tracing::info!(
        chain_config = %args.chain_config.display(),
        "publish-scripts has no chain client configured in this build; nothing to publish"
    );
    Ok(())
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let opts = RunOptions::resolve(&args)?;
    hydra_common::init_logging(hydra_common::LoggerConfig::new("hydra-node"));

    let signing_key = load_or_generate_party_key(&opts.party_key)?;
    let party = Party::from_verification_key_bytes(*signing_key.verification_key_bytes().as_bytes());
    let other_parties = opts.other_parties()?;

    let env = Env::new(party, signing_key, Duration::from_secs(opts.contestation_period_secs))
        .with_other_parties(other_parties);

    let persistence = PersistenceLog::open(&opts.persistence_dir)?;
    let state: EngineState<ToyLedger> = match persistence.load::<ToyLedger>()? {
        Some(state) => state,
        None => {
            let chain_state = ChainState {
                point: ChainPoint {
                    height: 0,
                    block_hash: Buf32::zero(),
                },
            };
            EngineState::new(HeadState::idle(chain_state), env.checkpoint_depth)
        }
    };

    let (queue_handle, queue_consumer) = hydra_queue::channel::<Input<ToyLedger>>();

    let relay = NetworkRelay::<ToyLedger>::new(
        queue_handle.clone(),
        DEDUP_WINDOW_MS,
        HEARTBEAT_PERIOD_MS as u128,
        MISSED_HEARTBEAT_THRESHOLD,
    );

    let peer_addrs = opts
        .peers
        .iter()
        .map(|peer| peer.parse::<SocketAddr>())
        .collect::<Result<Vec<SocketAddr>, _>>()
        .map_err(|err| anyhow::anyhow!("invalid peer address: {err}"))?;
    let network_sender = net::TcpNetworkSender::<ToyLedger>::new(peer_addrs);

    let chain_adapter = Arc::new(ChainObserverAdapter::new(
        state.head.chain_state().clone(),
        queue_handle.clone(),
        LoggingChainClient,
    ));

    let (status_sender, status_receiver) = status::channel(&state.head);
    let shutdown = ShutdownGuard::new();

    let runtime = NodeRuntime::new(
        env,
        queue_consumer,
        queue_handle.clone(),
        persistence,
        chain_adapter,
        network_sender,
        status_sender,
        shutdown.clone(),
    );

    let api_server = Arc::new(ApiServer::<ToyLedger>::new(queue_handle.clone()));
    let outputs_rx = runtime.subscribe_outputs();
    let peer_events_rx = relay.subscribe_peer_events();

    let network_listener = TcpListener::bind((opts.host.as_str(), opts.port)).await?;
    tracing::info!(host = %opts.host, port = opts.port, "network relay listening");
    tokio::spawn(net::run_listener(network_listener, relay.clone()));

    let api_listener = TcpListener::bind((opts.api_host.as_str(), opts.api_port)).await?;
    tracing::info!(host = %opts.api_host, port = opts.api_port, "api server listening");
    tokio::spawn(run_api_listener(api_listener, api_server.clone()));

    let monitoring_listener = TcpListener::bind((opts.api_host.as_str(), opts.monitoring_port)).await?;
    tracing::info!(port = opts.monitoring_port, "monitoring endpoint listening");
    tokio::spawn(status::run_monitoring_listener(monitoring_listener, status_receiver));

    {
        let api_server = api_server.clone();
        tokio::spawn(async move { api_server.run_fanout(outputs_rx, peer_events_rx).await });
    }

    tokio::spawn(runtime::run_ticker(
        queue_handle.clone(),
        relay.clone(),
        Duration::from_millis(HEARTBEAT_PERIOD_MS),
        shutdown.clone(),
    ));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    tokio::select! {
        result = runtime.run(state) => {
            result?;
        }
        _ = &mut ctrl_c => {
            tracing::info!("shutdown requested, draining the node loop");
            shutdown.trigger();
            queue_handle.initiate_shutdown();
        }
    }

    hydra_common::logging::finalize();
    Ok(())
}

/// Accepts API client connections and bridges each to the `ApiServer`: one
/// task copies its outbound queue onto the socket, newline-delimited; the
/// read half feeds each line to `handle_client_message`.
async fn run_api_listener(listener: TcpListener, api_server: Arc<ApiServer<ToyLedger>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let api_server = api_server.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_api_connection(stream, api_server).await {
                        tracing::debug!(%err, %peer_addr, "api connection closed");
                    }
                });
            }
            Err(err) => tracing::error!(%err, "failed to accept api connection"),
        }
    }
}

async fn handle_api_connection(
    stream: tokio::net::TcpStream,
    api_server: Arc<ApiServer<ToyLedger>>,
) -> std::io::Result<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let (read_half, mut write_half) = stream.into_split();
    let (id, mut outbound) = api_server.connect(OutputFormat::default());

    let writer = tokio::spawn(async move {
        while let Some(line) = outbound.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                return;
            }
            if write_half.write_all(b"\n").await.is_err() {
                return;
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if api_server.handle_client_message(id, &line).is_err() {
            break;
        }
    }

    api_server.disconnect(id);
    writer.abort();
    Ok(())
}
