//! One side of the order book
//!
//! Prices are unique keys; iteration is always best-first (descending for
//! bids, ascending for asks).

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::{PriceLevel, Side};

/// Price to quantity store for a single side
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl BookSide {
    /// Create an empty side
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Set the quantity at a price; zero removes the level.
    ///
    /// Removing an absent level is a no-op. Callers are responsible for
    /// rejecting negative quantities before they get here.
    #[inline]
    pub fn update(&mut self, price: Decimal, quantity: Decimal) {
        if quantity.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, quantity);
        }
    }

    /// Best level (highest bid or lowest ask)
    #[inline]
    pub fn best(&self) -> Option<PriceLevel> {
        let entry = match self.side {
            Side::Bid => self.levels.last_key_value(),
            Side::Ask => self.levels.first_key_value(),
        };
        entry.map(|(p, q)| PriceLevel::new(*p, *q))
    }

    /// Worst level (lowest bid or highest ask)
    pub fn worst(&self) -> Option<PriceLevel> {
        let entry = match self.side {
            Side::Bid => self.levels.first_key_value(),
            Side::Ask => self.levels.last_key_value(),
        };
        entry.map(|(p, q)| PriceLevel::new(*p, *q))
    }

    /// Quantity resting at a price
    pub fn get(&self, price: &Decimal) -> Option<Decimal> {
        self.levels.get(price).copied()
    }

    /// Levels best-first
    pub fn iter(&self) -> Box<dyn Iterator<Item = PriceLevel> + '_> {
        let levels = self.levels.iter().map(|(p, q)| PriceLevel::new(*p, *q));
        match self.side {
            Side::Bid => Box::new(levels.rev()),
            Side::Ask => Box::new(levels),
        }
    }

    /// Up to `n` levels best-first
    pub fn best_n(&self, n: usize) -> Vec<PriceLevel> {
        self.iter().take(n).collect()
    }

    /// Total resting quantity
    pub fn depth(&self) -> Decimal {
        self.levels.values().copied().sum()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
