//! Publisher module for consistent book snapshots
//!
//! The book builder swaps in a fresh immutable [`BookView`] after every
//! successful mutation. Readers load the current view without taking a lock
//! and may hold it for as long as they like.

use arc_swap::ArcSwap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

use crate::orderbook::{OrderBook, OrderBookMetrics, PriceLevel, Side};

/// Whether the published levels reflect the live feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookStatus {
    /// No snapshot has been applied yet
    AwaitingSnapshot,
    /// Levels are current as of `sequence`
    Live,
    /// Levels are the last valid state before a gap or disconnect
    Resyncing,
}

/// Immutable point-in-time view of the order book
#[derive(Debug, Clone, Serialize)]
pub struct BookView {
    pub product_id: u32,
    /// Strictly increasing across publications
    pub version: u64,
    pub sequence: u64,
    /// Exchange timestamp of the last applied update (nanoseconds)
    pub timestamp: u64,
    pub status: BookStatus,
    /// Best-first
    pub bids: Vec<PriceLevel>,
    /// Best-first
    pub asks: Vec<PriceLevel>,
    pub metrics: OrderBookMetrics,
}

impl BookView {
    fn empty(product_id: u32) -> Self {
        Self {
            product_id,
            version: 0,
            sequence: 0,
            timestamp: 0,
            status: BookStatus::AwaitingSnapshot,
            bids: Vec::new(),
            asks: Vec::new(),
            metrics: OrderBookMetrics::default(),
        }
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    pub fn levels(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// True when exactly one side has levels
    pub fn is_one_sided(&self) -> bool {
        self.bids.is_empty() != self.asks.is_empty()
    }

    pub fn is_live(&self) -> bool {
        self.status == BookStatus::Live
    }
}

/// Single-writer, many-reader holder of the latest [`BookView`]
pub struct SnapshotPublisher {
    product_id: u32,
    current: ArcSwap<BookView>,
    changes: watch::Sender<u64>,
}

impl SnapshotPublisher {
    /// Create a publisher holding an empty, awaiting-snapshot view
    pub fn new(product_id: u32) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            product_id,
            current: ArcSwap::from_pointee(BookView::empty(product_id)),
            changes,
        }
    }

    /// Latest published view
    pub fn current(&self) -> Arc<BookView> {
        self.current.load_full()
    }

    /// Change notifications carrying the published version
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Publish a copy of a validated book as the live view.
    ///
    /// Must only be called by the book's single writer.
    pub fn publish(&self, book: &OrderBook) {
        let version = self.current.load().version + 1;
        let view = BookView {
            product_id: book.instrument_id(),
            version,
            sequence: book.last_applied_sequence(),
            timestamp: book.last_update_timestamp(),
            status: BookStatus::Live,
            bids: book.levels(Side::Bid),
            asks: book.levels(Side::Ask),
            metrics: book.metrics(),
        };
        self.swap(view);
    }

    /// Keep the last valid levels but flag them as not live
    pub fn mark_resyncing(&self) {
        let previous = self.current.load_full();
        if previous.status == BookStatus::Resyncing {
            return;
        }
        let status = if previous.version == 0 {
            BookStatus::AwaitingSnapshot
        } else {
            BookStatus::Resyncing
        };
        if status == previous.status {
            return;
        }
        let view = BookView {
            version: previous.version + 1,
            status,
            ..(*previous).clone()
        };
        self.swap(view);
    }

    fn swap(&self, view: BookView) {
        let version = view.version;
        debug!(
            product_id = self.product_id,
            version,
            sequence = view.sequence,
            status = ?view.status,
            "Published order book view"
        );
        self.current.store(Arc::new(view));
        self.changes.send_replace(version);
    }
}
