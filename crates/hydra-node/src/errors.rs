//! Implementation-level node errors, composed behind `anyhow` at the binary
//! boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("persistence failure, exiting: {0}")]
    Persistence(#[from] hydra_persistence::PersistenceError),
    #[error("config error: {0}")]
    Config(#[from] hydra_common::ConfigError),
    #[error("input queue closed unexpectedly")]
    QueueClosed,
    #[error("invalid key material at {0}: {1}")]
    InvalidPeerKey(String, String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
