//! Configuration module for the market data handler
//!
//! Values are layered: built-in defaults, then an optional TOML file
//! (`market-data.toml`, or the path in `MARKET_DATA_CONFIG`), then
//! `VERTEX_*` environment variables.

use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::{MarketDataError, Result};

/// Default config file, resolved relative to the working directory
const DEFAULT_CONFIG_FILE: &str = "market-data.toml";
/// Largest depth the gateway serves for `market_liquidity`
const MAX_SNAPSHOT_DEPTH: usize = 100;
/// The gateway drops connections that stay silent longer than this
const MAX_PING_INTERVAL_MS: u64 = 30_000;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instrument to track (2 = BTC-PERP)
    pub product_id: u32,

    /// WebSocket endpoint for stream subscriptions
    pub ws_endpoint: String,

    /// REST gateway endpoint for snapshot queries
    pub gateway_endpoint: String,

    /// Levels per side requested in each snapshot
    pub snapshot_depth: usize,

    /// Keepalive and staleness settings
    pub ping_interval_ms: u64,
    pub stale_timeout_ms: u64,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub reconnect_jitter_ms: u64,

    /// Capacity of the feed event channel
    pub event_buffer: usize,

    /// Hard limit for draining on shutdown
    pub shutdown_timeout_ms: u64,

    /// Port of the health and metrics server
    pub health_port: u16,

    /// Render the book to the terminal
    pub display: bool,
    pub display_depth: usize,
}

impl Config {
    /// Load configuration from `.env`, the config file and the environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let file = env::var("MARKET_DATA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::load_from(Path::new(&file))
    }

    /// Load configuration from a specific file plus the environment
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let config = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(::config::Environment::with_prefix("VERTEX").try_parsing(true))
            .build()?
            .try_deserialize::<Self>()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the feed session cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MarketDataError::ConfigError(msg));

        if self.product_id == 0 {
            return invalid("product_id 0 is the quote asset and has no order book".into());
        }
        if self.ws_endpoint.is_empty() || self.gateway_endpoint.is_empty() {
            return invalid("ws_endpoint and gateway_endpoint must be set".into());
        }
        if self.snapshot_depth == 0 || self.snapshot_depth > MAX_SNAPSHOT_DEPTH {
            return invalid(format!(
                "snapshot_depth must be within 1..={MAX_SNAPSHOT_DEPTH}, got {}",
                self.snapshot_depth
            ));
        }
        if self.ping_interval_ms == 0 || self.ping_interval_ms > MAX_PING_INTERVAL_MS {
            return invalid(format!(
                "ping_interval_ms must be within 1..={MAX_PING_INTERVAL_MS}, got {}",
                self.ping_interval_ms
            ));
        }
        if self.stale_timeout_ms <= self.ping_interval_ms {
            return invalid("stale_timeout_ms must exceed ping_interval_ms".into());
        }
        if self.reconnect_delay_ms == 0 || self.reconnect_delay_ms > self.max_reconnect_delay_ms {
            return invalid("reconnect_delay_ms must be within 1..=max_reconnect_delay_ms".into());
        }
        if self.event_buffer == 0 {
            return invalid("event_buffer must be positive".into());
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            product_id: 2,
            ws_endpoint: "wss://gateway.prod.vertexprotocol.com/v1/subscribe".to_string(),
            gateway_endpoint: "https://gateway.prod.vertexprotocol.com/v1".to_string(),
            snapshot_depth: MAX_SNAPSHOT_DEPTH,
            ping_interval_ms: 5_000,
            stale_timeout_ms: 15_000,
            reconnect_delay_ms: 500,
            max_reconnect_delay_ms: 30_000,
            reconnect_jitter_ms: 250,
            event_buffer: 10_000,
            shutdown_timeout_ms: 5_000,
            health_port: 9090,
            display: true,
            display_depth: 10,
        }
    }
}
