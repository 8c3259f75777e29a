//! Federation configuration.

use std::path::Path;

use fedtx_core::{Credentials, VisibilityStrategy};
use fedtx_pool::PoolConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "FEDTX_";

/// Address and credentials of the federation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Name of the virtual database exposed by the endpoint.
    pub vdb_name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            vdb_name: "OperatonVDB".to_string(),
            host: "localhost".to_string(),
            port: 35482,
            username: "sa".to_string(),
            password: "sa".to_string(),
        }
    }
}

impl EndpointConfig {
    /// Connection URL, e.g. `fedtx://localhost:35482/OperatonVDB`.
    pub fn url(&self) -> String {
        format!("fedtx://{}:{}/{}", self.host, self.port, self.vdb_name)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }
}

/// Top-level configuration.
///
/// ```toml
/// strategy = "deferred"
///
/// [endpoint]
/// vdb_name = "OperatonVDB"
/// host = "localhost"
/// port = 35482
///
/// [pool]
/// max_size = 10
/// min_idle = 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub endpoint: EndpointConfig,
    pub pool: PoolConfig,
    /// Write visibility of every transaction of the process.
    pub strategy: VisibilityStrategy,
}

impl FederationConfig {
    /// Parse a TOML document. Missing settings keep their defaults.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: FederationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: FederationConfig = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        debug!(path = %path.display(), url = %config.endpoint.url(), strategy = %config.strategy, "loaded configuration");
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FEDTX_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`, which receives full variable
    /// names such as `FEDTX_PORT`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&name).map(|value| (name, value))
        };

        if let Some((_, value)) = var("VDB_NAME") {
            self.endpoint.vdb_name = value;
        }
        if let Some((_, value)) = var("HOST") {
            self.endpoint.host = value;
        }
        if let Some((name, value)) = var("PORT") {
            self.endpoint.port = value
                .parse()
                .map_err(|_| ConfigError::invalid_override(name, &value, "expected a port number"))?;
        }
        if let Some((_, value)) = var("USERNAME") {
            self.endpoint.username = value;
        }
        if let Some((_, value)) = var("PASSWORD") {
            self.endpoint.password = value;
        }
        if let Some((name, value)) = var("STRATEGY") {
            self.strategy = value
                .parse()
                .map_err(|reason: String| ConfigError::invalid_override(name, &value, reason))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.endpoint.vdb_name.trim().is_empty() {
            return Err(ConfigError::invalid("endpoint.vdb_name must not be empty"));
        }
        if self.endpoint.host.trim().is_empty() {
            return Err(ConfigError::invalid("endpoint.host must not be empty"));
        }
        if self.endpoint.port == 0 {
            return Err(ConfigError::invalid("endpoint.port must not be 0"));
        }
        self.pool.validate()?;
        Ok(())
    }
}
