//! Timestamp chain tracking for the Vertex `book_depth` stream
//!
//! Vertex does not number its depth events. Instead each event names the
//! `max_timestamp` of its predecessor in `last_max_timestamp`. This module
//! turns that chain into the contiguous sequence numbers the core expects.

/// How a depth event relates to the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLink {
    /// Fully covered by the current snapshot
    Stale,
    /// Directly follows the previous event (or the snapshot)
    Contiguous,
    /// At least one event between the previous one and this one was lost
    Broken { expected: u64, found: u64 },
}

/// Follows `last_max_timestamp -> max_timestamp` links since a snapshot
#[derive(Debug, Clone, Default)]
pub struct TimestampChain {
    snapshot_timestamp: Option<u64>,
    previous_max: Option<u64>,
}

impl TimestampChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor the chain at a snapshot taken at `timestamp`
    pub fn reset(&mut self, timestamp: u64) {
        self.snapshot_timestamp = Some(timestamp);
        self.previous_max = None;
    }

    /// Classify the next event and advance the chain
    pub fn link(&mut self, last_max_timestamp: u64, max_timestamp: u64) -> ChainLink {
        let Some(snapshot_timestamp) = self.snapshot_timestamp else {
            return ChainLink::Stale;
        };

        if max_timestamp <= snapshot_timestamp {
            return ChainLink::Stale;
        }

        let link = match self.previous_max {
            // First event past the snapshot must start at or before it
            None if last_max_timestamp <= snapshot_timestamp => ChainLink::Contiguous,
            None => ChainLink::Broken {
                expected: snapshot_timestamp,
                found: last_max_timestamp,
            },
            Some(previous) if previous == last_max_timestamp => ChainLink::Contiguous,
            Some(previous) if max_timestamp <= previous => return ChainLink::Stale,
            Some(previous) => ChainLink::Broken {
                expected: previous,
                found: last_max_timestamp,
            },
        };

        self.previous_max = Some(max_timestamp);
        link
    }

    pub fn previous_max(&self) -> Option<u64> {
        self.previous_max
    }
}
