//! CLI surface and the merged runtime configuration `RunOptions` builds
//! `Env` from: CLI flags layered over an optional TOML config file.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use hydra_crypto::sign::SigningKey;
use hydra_primitives::buf::Buf32;
use hydra_primitives::party::{ContestationPeriod, Party};
use serde::{Deserialize, Serialize};

use crate::errors::NodeError;

#[derive(Debug, Parser)]
#[command(name = "hydra-node", about = "Runs a single party's off-chain head-protocol node")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the node against an already-provisioned head deployment.
    Run(RunArgs),
    /// Publishes the on-chain scripts a head depends on, then exits.
    PublishScripts(PublishScriptsArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to a TOML file providing defaults for any flag not passed here.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    /// Repeatable; each is `host:port` of one counterparty's network relay.
    #[arg(long = "peer")]
    pub peers: Vec<String>,
    /// Repeatable; each is the hex-encoded verification key of one
    /// counterparty, in the same order as `--peer`. Network address and
    /// protocol identity are orthogonal (see DESIGN.md), so both are
    /// supplied explicitly rather than derived from one another.
    #[arg(long = "peer-key")]
    pub peer_keys: Vec<String>,
    #[arg(long)]
    pub api_host: Option<String>,
    #[arg(long)]
    pub api_port: Option<u16>,
    #[arg(long)]
    pub monitoring_port: Option<u16>,
    #[arg(long)]
    pub persistence_dir: Option<PathBuf>,
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbosity: u8,
    #[arg(long)]
    pub chain_config: Option<PathBuf>,
    #[arg(long)]
    pub ledger_config: Option<PathBuf>,
    #[arg(long)]
    pub hydra_scripts_tx_id: Option<String>,
    /// Path to this party's signing key. Generated on first run if absent.
    #[arg(long)]
    pub party_key: Option<PathBuf>,
    /// Contestation period in seconds, used when this party originates `Init`.
    #[arg(long)]
    pub contestation_period_secs: Option<u64>,
}

#[derive(Debug, Args)]
pub struct PublishScriptsArgs {
    #[arg(long)]
    pub chain_config: PathBuf,
}

/// The merged configuration a `run` invocation actually uses: CLI flags
/// take precedence over the TOML file's values, which take precedence over
/// these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub host: String,
    pub port: u16,
    pub peers: Vec<String>,
    pub peer_keys: Vec<String>,
    pub api_host: String,
    pub api_port: u16,
    pub monitoring_port: u16,
    pub persistence_dir: PathBuf,
    pub verbosity: u8,
    pub chain_config: PathBuf,
    pub ledger_config: PathBuf,
    pub hydra_scripts_tx_id: Option<String>,
    pub party_key: PathBuf,
    pub contestation_period_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            peers: Vec::new(),
            peer_keys: Vec::new(),
            api_host: "127.0.0.1".to_string(),
            api_port: 4001,
            monitoring_port: 9001,
            persistence_dir: PathBuf::from("./hydra-state"),
            verbosity: 0,
            chain_config: PathBuf::from("./chain.toml"),
            ledger_config: PathBuf::from("./ledger.toml"),
            hydra_scripts_tx_id: None,
            party_key: PathBuf::from("./party.key"),
            contestation_period_secs: 60,
        }
    }
}

impl RunOptions {
    /// Loads the TOML file named by `--config` (if any) over the defaults,
    /// then applies every flag the caller actually passed.
    pub fn resolve(args: &RunArgs) -> Result<Self, NodeError> {
        let mut opts = match &args.config {
            Some(path) => hydra_common::load_toml(path)?,
            None => RunOptions::default(),
        };

        if let Some(host) = &args.host {
            opts.host = host.clone();
        }
        if let Some(port) = args.port {
            opts.port = port;
        }
        if !args.peers.is_empty() {
            opts.peers = args.peers.clone();
        }
        if !args.peer_keys.is_empty() {
            opts.peer_keys = args.peer_keys.clone();
        }
        if let Some(api_host) = &args.api_host {
            opts.api_host = api_host.clone();
        }
        if let Some(api_port) = args.api_port {
            opts.api_port = api_port;
        }
        if let Some(monitoring_port) = args.monitoring_port {
            opts.monitoring_port = monitoring_port;
        }
        if let Some(persistence_dir) = &args.persistence_dir {
            opts.persistence_dir = persistence_dir.clone();
        }
        if args.verbosity > 0 {
            opts.verbosity = args.verbosity;
        }
        if let Some(chain_config) = &args.chain_config {
            opts.chain_config = chain_config.clone();
        }
        if let Some(ledger_config) = &args.ledger_config {
            opts.ledger_config = ledger_config.clone();
        }
        if args.hydra_scripts_tx_id.is_some() {
            opts.hydra_scripts_tx_id = args.hydra_scripts_tx_id.clone();
        }
        if let Some(party_key) = &args.party_key {
            opts.party_key = party_key.clone();
        }
        if let Some(secs) = args.contestation_period_secs {
            opts.contestation_period_secs = secs;
        }

        Ok(opts)
    }

    /// Parses the hex-encoded counterparty keys into `Party` values. Errors
    /// are surfaced as a `ConfigError::Parse`-shaped message since a bad key
    /// is effectively a malformed configuration.
    pub fn other_parties(&self) -> Result<Vec<Party>, NodeError> {
        self.peer_keys
            .iter()
            .map(|hex_key| {
                let bytes = hex::decode(hex_key)
                    .map_err(|err| NodeError::InvalidPeerKey(hex_key.clone(), err.to_string()))?;
                let array: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| NodeError::InvalidPeerKey(hex_key.clone(), "expected 32 bytes".to_string()))?;
                Ok(Party(Buf32::from(array)))
            })
            .collect()
    }

    pub fn contestation_period(&self) -> ContestationPeriod {
        ContestationPeriod::from_duration(Duration::from_secs(self.contestation_period_secs))
    }
}

/// Loads this party's signing key from `path`, generating and persisting a
/// fresh one on first run (mirroring how a freshly-provisioned node has no
/// pre-existing identity yet). The file holds the raw 32-byte seed, since
/// `SigningKey` itself does not expose one to re-derive from a loaded key.
pub fn load_or_generate_party_key(path: &std::path::Path) -> Result<SigningKey, NodeError> {
    if let Ok(bytes) = std::fs::read(path) {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NodeError::InvalidPeerKey(path.display().to_string(), "expected a 32-byte key file".to_string()))?;
        return Ok(SigningKey::from_bytes(&array));
    }

    let mut seed = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut seed);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, seed)?;
    Ok(SigningKey::from_bytes(&seed))
}
