//! Scripted feed transport shared by the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use market_data::error::{MarketDataError, Result};
use market_data::feed::{FeedTransport, SessionSettings};
use market_data::parser::MarketLiquidity;
use market_data::PriceLevel;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

pub const PRODUCT_ID: u32 = 2;

/// One scripted connection: the snapshot it serves and its frame source
pub struct Script {
    snapshot: MarketLiquidity,
    frames: mpsc::UnboundedReceiver<String>,
}

impl Script {
    /// A connection serving `snapshot`, fed through the returned sender
    pub fn new(snapshot: MarketLiquidity) -> (Self, mpsc::UnboundedSender<String>) {
        let (tx, frames) = mpsc::unbounded_channel();
        (Self { snapshot, frames }, tx)
    }
}

/// Serves one script per successful `connect`, failing once they run out
pub struct ScriptedTransport {
    scripts: VecDeque<Script>,
    snapshot: Option<MarketLiquidity>,
    frames: Option<mpsc::UnboundedReceiver<String>>,
    connects: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(scripts: Vec<Script>) -> (Self, Arc<AtomicUsize>) {
        let connects = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            scripts: scripts.into(),
            snapshot: None,
            frames: None,
            connects: connects.clone(),
        };
        (transport, connects)
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn connect(&mut self, _product_id: u32) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.pop_front().ok_or_else(|| {
            MarketDataError::WebSocketConnection("no scripted connection left".into())
        })?;
        self.snapshot = Some(script.snapshot);
        self.frames = Some(script.frames);
        Ok(())
    }

    async fn fetch_snapshot(&mut self, _product_id: u32, _depth: usize) -> Result<MarketLiquidity> {
        self.snapshot
            .take()
            .ok_or_else(|| MarketDataError::RestApiError("snapshot already served".into()))
    }

    async fn next_message(&mut self) -> Result<Option<String>> {
        let frames = self
            .frames
            .as_mut()
            .ok_or_else(|| MarketDataError::WebSocketConnection("Not connected".into()))?;
        match frames.recv().await {
            Some(frame) => Ok(Some(frame)),
            None => {
                self.frames = None;
                Err(MarketDataError::WebSocketConnection("Connection closed".into()))
            }
        }
    }

    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) {
        self.frames = None;
    }
}

pub fn settings(stale_timeout: Duration) -> SessionSettings {
    SessionSettings {
        product_id: PRODUCT_ID,
        snapshot_depth: 10,
        ping_interval: Duration::from_millis(50),
        stale_timeout,
        reconnect_delay: Duration::from_millis(10),
        max_reconnect_delay: Duration::from_millis(40),
        reconnect_jitter_ms: 0,
    }
}

fn x18(value: u64) -> String {
    format!("{value}000000000000000000")
}

/// Snapshot with one level per side
pub fn liquidity_with(timestamp: u64, bid: u64, ask: u64) -> MarketLiquidity {
    MarketLiquidity {
        bids: vec![PriceLevel::new(Decimal::from(bid), Decimal::ONE)],
        asks: vec![PriceLevel::new(Decimal::from(ask), Decimal::ONE)],
        timestamp,
    }
}

/// Bid 100 / ask 101, one unit each
pub fn liquidity(timestamp: u64) -> MarketLiquidity {
    liquidity_with(timestamp, 100, 101)
}

/// A `book_depth` frame carrying bid updates only
pub fn depth_frame(product_id: u32, last_max: u64, max: u64, bids: &[(u64, u64)]) -> String {
    let bids: Vec<(String, String)> = bids.iter().map(|&(p, q)| (x18(p), x18(q))).collect();
    serde_json::json!({
        "type": "book_depth",
        "min_timestamp": (last_max + 1).to_string(),
        "max_timestamp": max.to_string(),
        "last_max_timestamp": last_max.to_string(),
        "product_id": product_id,
        "bids": bids,
        "asks": []
    })
    .to_string()
}
