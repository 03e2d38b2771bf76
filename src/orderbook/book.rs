//! Core order book implementation
//!
//! Uses BTreeMap-backed sides for sorted price level management. Every
//! mutation is followed by invariant validation; a book that fails
//! validation must be discarded by its owner.

use rust_decimal::Decimal;
use thiserror::Error;

use super::{BookSide, OrderBookMetrics, PriceLevel, Side};
use crate::feed::{BookDiff, BookSnapshot, LevelUpdate};

/// Number of levels per side used for the imbalance metric
const IMBALANCE_LEVELS: usize = 5;

/// A book state that must never be published
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("crossed book: best bid {bid} >= best ask {ask}")]
    CrossedBook { bid: Decimal, ask: Decimal },

    #[error("non-positive {side:?} price {price}")]
    NonPositivePrice { side: Side, price: Decimal },

    #[error("non-positive {side:?} quantity {quantity} at price {price}")]
    NonPositiveQuantity {
        side: Side,
        price: Decimal,
        quantity: Decimal,
    },
}

/// Order book for a single instrument
#[derive(Debug, Clone)]
pub struct OrderBook {
    instrument_id: u32,
    bids: BookSide,
    asks: BookSide,
    /// Sequence of the last applied snapshot or diff
    last_applied_sequence: u64,
    /// Exchange timestamp of the last applied snapshot or diff (nanoseconds)
    last_update_timestamp: u64,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(instrument_id: u32) -> Self {
        Self {
            instrument_id,
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
            last_applied_sequence: 0,
            last_update_timestamp: 0,
        }
    }

    /// Build a book from a full snapshot.
    ///
    /// Non-positive quantities are filtered out. Returns the book together
    /// with the number of filtered entries, or the first violation if the
    /// remaining levels do not form a valid book.
    pub fn from_snapshot(
        instrument_id: u32,
        snapshot: &BookSnapshot,
    ) -> Result<(Self, usize), InvariantViolation> {
        let mut book = Self::new(instrument_id);
        let mut filtered = 0;

        for (side, levels) in [(Side::Bid, &snapshot.bids), (Side::Ask, &snapshot.asks)] {
            for level in levels {
                if level.quantity <= Decimal::ZERO {
                    filtered += 1;
                    continue;
                }
                if level.price <= Decimal::ZERO {
                    return Err(InvariantViolation::NonPositivePrice {
                        side,
                        price: level.price,
                    });
                }
                book.side_mut(side).update(level.price, level.quantity);
            }
        }

        book.last_applied_sequence = snapshot.sequence;
        book.last_update_timestamp = snapshot.timestamp;
        book.validate()?;

        Ok((book, filtered))
    }

    /// Apply every level change of a diff, then re-check the top of book.
    ///
    /// On error the book may be partially updated and must be discarded.
    pub fn apply_diff(&mut self, diff: &BookDiff) -> Result<(), InvariantViolation> {
        for update in &diff.updates {
            self.apply_level(update)?;
        }

        self.last_applied_sequence = diff.sequence;
        self.last_update_timestamp = self.last_update_timestamp.max(diff.timestamp);
        self.validate_top_of_book()
    }

    /// Update a single price level
    fn apply_level(&mut self, update: &LevelUpdate) -> Result<(), InvariantViolation> {
        if update.price <= Decimal::ZERO {
            return Err(InvariantViolation::NonPositivePrice {
                side: update.side,
                price: update.price,
            });
        }
        if update.quantity < Decimal::ZERO {
            return Err(InvariantViolation::NonPositiveQuantity {
                side: update.side,
                price: update.price,
                quantity: update.quantity,
            });
        }
        self.side_mut(update.side).update(update.price, update.quantity);
        Ok(())
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Full invariant check over every level
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        for side in [&self.bids, &self.asks] {
            for level in side.iter() {
                if level.quantity <= Decimal::ZERO {
                    return Err(InvariantViolation::NonPositiveQuantity {
                        side: side.side(),
                        price: level.price,
                        quantity: level.quantity,
                    });
                }
            }
            // Lowest price on either side must still be positive
            let lowest = match side.side() {
                Side::Bid => side.worst(),
                Side::Ask => side.best(),
            };
            if let Some(level) = lowest {
                if level.price <= Decimal::ZERO {
                    return Err(InvariantViolation::NonPositivePrice {
                        side: side.side(),
                        price: level.price,
                    });
                }
            }
        }

        self.validate_top_of_book()
    }

    /// Best bid must be strictly below best ask when both sides exist
    pub fn validate_top_of_book(&self) -> Result<(), InvariantViolation> {
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid >= ask {
                return Err(InvariantViolation::CrossedBook { bid, ask });
            }
        }
        Ok(())
    }

    pub fn instrument_id(&self) -> u32 {
        self.instrument_id
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    pub fn last_applied_sequence(&self) -> u64 {
        self.last_applied_sequence
    }

    pub fn last_update_timestamp(&self) -> u64 {
        self.last_update_timestamp
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.best().map(|l| l.price)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.best().map(|l| l.price)
    }

    /// True when exactly one side has levels
    pub fn is_one_sided(&self) -> bool {
        self.bids.is_empty() != self.asks.is_empty()
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Absolute spread
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get spread in basis points
    pub fn spread_bps(&self) -> Option<Decimal> {
        match (self.spread(), self.mid_price()) {
            (Some(spread), Some(mid)) if mid > Decimal::ZERO => {
                Some(spread / mid * Decimal::from(10000))
            }
            _ => None,
        }
    }

    /// Calculate order book imbalance at top N levels
    pub fn imbalance(&self, levels: usize) -> Option<Decimal> {
        let bid_volume: Decimal = self.bids.iter().take(levels).map(|l| l.quantity).sum();
        let ask_volume: Decimal = self.asks.iter().take(levels).map(|l| l.quantity).sum();

        let total = bid_volume + ask_volume;
        if total > Decimal::ZERO {
            Some((bid_volume - ask_volume) / total)
        } else {
            None
        }
    }

    /// Levels of one side, best-first
    pub fn levels(&self, side: Side) -> Vec<PriceLevel> {
        match side {
            Side::Bid => self.bids.iter().collect(),
            Side::Ask => self.asks.iter().collect(),
        }
    }

    /// Calculate order book metrics
    pub fn metrics(&self) -> OrderBookMetrics {
        OrderBookMetrics {
            mid_price: self.mid_price(),
            spread: self.spread(),
            spread_bps: self.spread_bps(),
            imbalance: self.imbalance(IMBALANCE_LEVELS),
            bid_depth: self.bids.depth(),
            ask_depth: self.asks.depth(),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
        }
    }
}
