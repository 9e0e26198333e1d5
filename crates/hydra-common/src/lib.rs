//! Ambient stack shared by every binary: structured logging and config
//! loading. Nothing here touches head logic; it exists so `hydra-node` isn't
//! reinventing these per binary.

pub mod clock;
pub mod config;
pub mod logging;

pub use clock::now_millis;
pub use config::{load_toml, ConfigError};
pub use logging::{init as init_logging, LoggerConfig};
