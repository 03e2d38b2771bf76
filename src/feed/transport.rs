//! Feed transport abstraction
//!
//! The session drives the connection lifecycle through this trait, so the
//! reconnect and resync logic can be exercised against a scripted feed.

use async_trait::async_trait;

use crate::error::Result;
use crate::parser::MarketLiquidity;

/// One streaming connection plus a snapshot source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedTransport: Send {
    /// Open a fresh connection and send the subscribe request
    async fn connect(&mut self, product_id: u32) -> Result<()>;

    /// Query a full depth snapshot
    async fn fetch_snapshot(&mut self, product_id: u32, depth: usize) -> Result<MarketLiquidity>;

    /// Next text frame; `None` for control frames such as pong
    async fn next_message(&mut self) -> Result<Option<String>>;

    /// Send a keepalive ping
    async fn ping(&mut self) -> Result<()>;

    /// Close the connection if open
    async fn close(&mut self);
}
