//! Gateway configuration.
//!
//! `GatewayConfig` is the immutable runtime view handed to the listener,
//! registry, router and links. `ConfigFile` is its TOML form.

use gate_shared::{MAX_INBOUND_PAYLOAD, MAX_OUTBOUND_PAYLOAD};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
    /// Bound on each individual socket read.
    pub read_timeout: Duration,
    /// Bound on each individual socket write.
    pub write_timeout: Duration,
    pub max_inbound_payload: usize,
    pub max_outbound_payload: usize,
    pub outbound_queue_capacity: usize,
    /// How long `put_bytes` waits on a full outbound queue.
    pub enqueue_timeout: Duration,
    /// How long a closed link may keep flushing already queued payloads
    /// before its socket is dropped. Zero drops it right away.
    pub close_linger: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 100_000,
            read_timeout: Duration::from_secs(600),
            write_timeout: Duration::from_secs(300),
            max_inbound_payload: MAX_INBOUND_PAYLOAD,
            max_outbound_payload: MAX_OUTBOUND_PAYLOAD,
            outbound_queue_capacity: 10,
            enqueue_timeout: Duration::from_secs(20),
            close_linger: Duration::from_secs(5),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be > 0".into()));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid("outbound_queue_capacity must be > 0".into()));
        }
        for (name, value) in [
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
            ("enqueue_timeout", self.enqueue_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        for (name, value) in [
            ("max_inbound_payload", self.max_inbound_payload),
            ("max_outbound_payload", self.max_outbound_payload),
        ] {
            if value == 0 || value > u32::MAX as usize {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within 1..={}",
                    name,
                    u32::MAX
                )));
            }
        }
        Ok(())
    }
}

/// On-disk configuration. Every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub gateway: GatewaySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub host: IpAddr,
    pub port: u16,
    pub max_connections: usize,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub max_inbound_payload: usize,
    pub max_outbound_payload: usize,
    pub outbound_queue_capacity: usize,
    pub enqueue_timeout_secs: u64,
    pub close_linger_secs: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        let defaults = GatewayConfig::default();
        Self {
            host: defaults.listen_addr.ip(),
            port: defaults.listen_addr.port(),
            max_connections: defaults.max_connections,
            read_timeout_secs: defaults.read_timeout.as_secs(),
            write_timeout_secs: defaults.write_timeout.as_secs(),
            max_inbound_payload: defaults.max_inbound_payload,
            max_outbound_payload: defaults.max_outbound_payload,
            outbound_queue_capacity: defaults.outbound_queue_capacity,
            enqueue_timeout_secs: defaults.enqueue_timeout.as_secs(),
            close_linger_secs: defaults.close_linger.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn into_gateway_config(self) -> Result<GatewayConfig, ConfigError> {
        let g = self.gateway;
        let config = GatewayConfig {
            listen_addr: SocketAddr::new(g.host, g.port),
            max_connections: g.max_connections,
            read_timeout: Duration::from_secs(g.read_timeout_secs),
            write_timeout: Duration::from_secs(g.write_timeout_secs),
            max_inbound_payload: g.max_inbound_payload,
            max_outbound_payload: g.max_outbound_payload,
            outbound_queue_capacity: g.outbound_queue_capacity,
            enqueue_timeout: Duration::from_secs(g.enqueue_timeout_secs),
            close_linger: Duration::from_secs(g.close_linger_secs),
        };
        config.validate()?;
        Ok(config)
    }
}
