//! Events emitted by the feed session
//!
//! This is the exchange-agnostic contract between the feed adapter and the
//! core. Sequence numbers are only comparable within one connection epoch.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::orderbook::{PriceLevel, Side};

/// Full replacement of both sides at a sequence point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookSnapshot {
    pub sequence: u64,
    /// Exchange timestamp of the snapshot (nanoseconds)
    pub timestamp: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// New quantity for one price level; zero means remove
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelUpdate {
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

impl LevelUpdate {
    pub fn bid(price: Decimal, quantity: Decimal) -> Self {
        Self {
            side: Side::Bid,
            price,
            quantity,
        }
    }

    pub fn ask(price: Decimal, quantity: Decimal) -> Self {
        Self {
            side: Side::Ask,
            price,
            quantity,
        }
    }
}

/// Incremental update carrying every level change of one exchange message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookDiff {
    pub sequence: u64,
    /// Exchange timestamp of the last change in this diff (nanoseconds)
    pub timestamp: u64,
    pub updates: Vec<LevelUpdate>,
}

/// Typed feed event, delivered in the order received
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Snapshot(BookSnapshot),
    Diff(BookDiff),
    Disconnected,
    Error { reason: String },
}

impl FeedEvent {
    /// Sequence number, for events that carry one
    pub fn sequence(&self) -> Option<u64> {
        match self {
            FeedEvent::Snapshot(s) => Some(s.sequence),
            FeedEvent::Diff(d) => Some(d.sequence),
            FeedEvent::Disconnected | FeedEvent::Error { .. } => None,
        }
    }
}
