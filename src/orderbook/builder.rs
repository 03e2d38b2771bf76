//! Order book builder
//!
//! Sole owner of the mutable [`OrderBook`]. Applies sequenced snapshots and
//! diffs, and publishes a view only after the book passed validation.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::{InvariantViolation, OrderBook};
use crate::feed::{BookDiff, BookSnapshot};
use crate::publisher::SnapshotPublisher;

/// Reasons the builder discarded its book
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookFault {
    #[error("diff {sequence} arrived before any snapshot")]
    NotInitialized { sequence: u64 },

    #[error(transparent)]
    Violation(#[from] InvariantViolation),
}

/// Builds and owns the canonical book for one instrument
pub struct BookBuilder {
    instrument_id: u32,
    book: Option<OrderBook>,
    publisher: Arc<SnapshotPublisher>,
}

impl BookBuilder {
    /// Create a builder with no book; the first snapshot creates one
    pub fn new(instrument_id: u32, publisher: Arc<SnapshotPublisher>) -> Self {
        Self {
            instrument_id,
            book: None,
            publisher,
        }
    }

    /// Replace the book wholesale with a snapshot.
    ///
    /// Fails closed: on error no book is kept and nothing is published.
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) -> Result<(), BookFault> {
        self.book = None;

        let (book, filtered) = match OrderBook::from_snapshot(self.instrument_id, snapshot) {
            Ok(built) => built,
            Err(violation) => {
                error!(
                    product_id = self.instrument_id,
                    sequence = snapshot.sequence,
                    error = %violation,
                    snapshot = ?snapshot,
                    "Rejected invalid snapshot"
                );
                return Err(violation.into());
            }
        };

        if filtered > 0 {
            warn!(
                product_id = self.instrument_id,
                sequence = snapshot.sequence,
                filtered,
                "Dropped non-positive quantities from snapshot"
            );
        }

        info!(
            product_id = self.instrument_id,
            sequence = snapshot.sequence,
            bid_levels = book.bids().len(),
            ask_levels = book.asks().len(),
            "Order book initialized from snapshot"
        );

        self.publisher.publish(&book);
        self.book = Some(book);
        Ok(())
    }

    /// Apply a diff in place and publish the result.
    ///
    /// An invariant violation discards the book; the caller must resync.
    pub fn apply_diff(&mut self, diff: &BookDiff) -> Result<(), BookFault> {
        let Some(book) = self.book.as_mut() else {
            return Err(BookFault::NotInitialized {
                sequence: diff.sequence,
            });
        };

        if let Err(violation) = book.apply_diff(diff) {
            error!(
                product_id = self.instrument_id,
                sequence = diff.sequence,
                error = %violation,
                diff = ?diff,
                "Order book invariant violated, discarding book"
            );
            self.book = None;
            return Err(violation.into());
        }

        self.publisher.publish(book);
        Ok(())
    }

    /// Drop the current book without publishing anything
    pub fn discard(&mut self) {
        self.book = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.book.is_some()
    }

    pub fn publisher(&self) -> &Arc<SnapshotPublisher> {
        &self.publisher
    }
}
