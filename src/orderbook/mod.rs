//! Order book module
//!
//! Maintains the canonical book for one instrument from validated snapshots
//! and diffs. The [`BookBuilder`] is the only writer.

mod book;
mod builder;
mod metrics;
mod side;

pub use book::{InvariantViolation, OrderBook};
pub use builder::{BookBuilder, BookFault};
pub use metrics::OrderBookMetrics;
pub use side::BookSide;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// A single level in the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}
