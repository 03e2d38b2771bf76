//! Error types for the market data handler

use thiserror::Error;

/// Market data handler errors
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("REST API error: {0}")]
    RestApiError(String),

    #[error("Snapshot query rejected: {0}")]
    SnapshotRejected(String),

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection timeout")]
    ConnectionTimeout,
}

impl MarketDataError {
    /// Whether the error can never be recovered by reconnecting.
    ///
    /// Only a rejected subscription or an invalid configuration halts the
    /// process; transport, sequencing and semantic faults end in a resync.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MarketDataError::SubscriptionRejected(_) | MarketDataError::ConfigError(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MarketDataError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MarketDataError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for MarketDataError {
    fn from(err: serde_json::Error) -> Self {
        MarketDataError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for MarketDataError {
    fn from(err: reqwest::Error) -> Self {
        MarketDataError::RestApiError(err.to_string())
    }
}

impl From<std::io::Error> for MarketDataError {
    fn from(err: std::io::Error) -> Self {
        MarketDataError::WebSocketConnection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MarketDataError>;
