//! Configuration management for Quillgate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::throttle::{Policy, PolicyTable};

/// Prefix of environment variables overriding configuration values,
/// e.g. `QUILLGATE__SERVER__BIND_ADDR`.
pub const ENV_PREFIX: &str = "QUILLGATE";

/// Main configuration for the Quillgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuillgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Throttle configuration
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Take the client identity from `X-Real-IP` / the last `X-Forwarded-For` hop.
    /// Only enable behind a proxy that sets `X-Real-IP` or appends to `X-Forwarded-For`.
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            trust_forwarded_headers: false,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Throttle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Seconds between sweeps of expired entries
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Path to a YAML policy file layered over the built-in policies
    #[serde(default)]
    pub policies_path: Option<String>,

    /// Seconds between policy file reloads; zero disables reloading
    #[serde(default = "default_reload_interval")]
    pub policy_reload_interval_secs: u64,

    /// Inline policy overrides, applied last
    #[serde(default)]
    pub policies: HashMap<String, Policy>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            policies_path: None,
            policy_reload_interval_secs: default_reload_interval(),
            policies: HashMap::new(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_reload_interval() -> u64 {
    60
}

impl ThrottleConfig {
    /// Sweep interval, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Reload interval, or `None` when reloading is disabled or there is no file.
    pub fn reload_interval(&self) -> Option<Duration> {
        match (&self.policies_path, self.policy_reload_interval_secs) {
            (Some(_), secs) if secs > 0 => Some(Duration::from_secs(secs)),
            _ => None,
        }
    }

    /// The inline overrides as a policy table.
    pub fn overrides(&self) -> PolicyTable {
        let mut table = PolicyTable::new();
        for (name, policy) in &self.policies {
            table.insert(name.clone(), *policy);
        }
        table
    }

    /// The effective policy table at startup.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        PolicyTable::layered(self.policies_path.as_deref().map(Path::new), &self.overrides())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl QuillgateConfig {
    /// Load configuration from an optional YAML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
