//! Configuration handling for the gateway daemon.
//!
//! This module reads the gateway configuration from a YAML file and
//! environment variables, falling back to defaults for anything missing.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cycler_link::LinkConfig;

/// Gateway daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base of the rack subnet; board N answers at base + (100 + N)
    pub base_ip: Ipv4Addr,
    /// Base TCP port; board N listens on base + N
    pub base_port: u16,
    /// Connection attempt timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Silence on a connected socket tolerated before recycling, milliseconds
    pub idle_timeout_ms: u64,
    /// First reconnect delay in milliseconds; doubles per attempt
    pub reconnect_backoff_ms: u64,
    /// Reconnection attempts before a board is faulted
    pub max_reconnect_attempts: u32,
    /// Socket receive buffer size in bytes
    pub recv_buffer_size: u32,
    /// Socket send buffer size in bytes
    pub send_buffer_size: u32,
    /// Seconds between throughput reports
    pub stats_interval_secs: u64,
    /// Seconds between health summaries
    pub health_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_ip: Ipv4Addr::new(192, 168, 1, 0),
            base_port: 8000,
            connect_timeout_ms: 5_000,
            idle_timeout_ms: 30_000,
            reconnect_backoff_ms: 1_000,
            max_reconnect_attempts: 3,
            recv_buffer_size: 8_192,
            send_buffer_size: 4_096,
            stats_interval_secs: 10,
            health_interval_secs: 10,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            match serde_yaml::from_str::<GatewayConfig>(&content) {
                Ok(parsed) => {
                    config = parsed;
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?} ({}), using defaults",
                        config_path.as_ref(),
                        e
                    );
                }
            }
        } else {
            warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            );
        }

        config.apply_environment_overrides();

        info!(
            "Final gateway configuration: base_ip={}, base_port={}, connect_timeout={}ms, max_reconnect_attempts={}",
            config.base_ip, config.base_port, config.connect_timeout_ms, config.max_reconnect_attempts
        );

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        if let Ok(base_ip) = std::env::var("GATEWAY_BASE_IP") {
            if let Ok(ip) = base_ip.parse::<Ipv4Addr>() {
                self.base_ip = ip;
                info!("Base IP overridden by environment: {}", ip);
            }
        }

        if let Ok(base_port) = std::env::var("GATEWAY_BASE_PORT") {
            if let Ok(port) = base_port.parse::<u16>() {
                self.base_port = port;
                info!("Base port overridden by environment: {}", port);
            }
        }

        if let Ok(attempts) = std::env::var("GATEWAY_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.max_reconnect_attempts = n;
                info!("Reconnect attempt budget overridden by environment: {}", n);
            }
        }
    }

    /// The board link settings this configuration describes
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            base_ip: self.base_ip,
            base_port: self.base_port,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            reconnect_backoff: Duration::from_millis(self.reconnect_backoff_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
            recv_buffer_size: self.recv_buffer_size,
            send_buffer_size: self.send_buffer_size,
        }
    }

    /// Interval between throughput reports
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Interval between health summaries
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}
