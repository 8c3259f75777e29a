//! FedTx Config
//!
//! Process configuration.
//!
//! Responsibilities:
//! - Describe the federation endpoint (VDB name, host, port, credentials)
//! - Carry the connection pool bounds and the visibility strategy selector
//! - Load from TOML and apply `FEDTX_*` environment overrides
//! - Reject inconsistent settings before anything connects

mod settings;
mod error;

pub use settings::{EndpointConfig, FederationConfig, ENV_PREFIX};
pub use error::{ConfigError, ConfigResult};
