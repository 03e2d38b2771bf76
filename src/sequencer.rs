//! Sequencing and gap detection
//!
//! Sits between the feed session and the book builder. Only contiguous
//! diffs following an accepted snapshot are forwarded; anything else either
//! drops silently (stale) or puts the sequencer back into
//! [`SyncState::AwaitingSnapshot`].

use std::fmt;
use tracing::{debug, info, trace, warn};

use crate::feed::{BookDiff, BookSnapshot, FeedEvent};

/// Sequencer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Diffs are discarded until the next snapshot
    AwaitingSnapshot,
    /// Diffs are forwarded while contiguous
    Synced,
}

/// Why the sequencer left [`SyncState::Synced`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapReason {
    /// A diff skipped ahead of the expected sequence
    Missing { expected: u64, received: u64 },
    /// The feed connection dropped
    Disconnected,
    /// The feed reported an error
    FeedError(String),
    /// The book builder rejected a validated event
    BookFault(String),
}

impl GapReason {
    /// Whether the core must ask the feed for a new snapshot.
    ///
    /// A disconnect already forces a new snapshot on reconnect.
    pub fn needs_resync_request(&self) -> bool {
        !matches!(self, GapReason::Disconnected)
    }
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapReason::Missing { expected, received } => {
                write!(f, "sequence gap: expected {expected}, received {received}")
            }
            GapReason::Disconnected => write!(f, "feed disconnected"),
            GapReason::FeedError(reason) => write!(f, "feed error: {reason}"),
            GapReason::BookFault(reason) => write!(f, "book fault: {reason}"),
        }
    }
}

/// Outcome of sequencing a single feed event
#[derive(Debug, Clone, PartialEq)]
pub enum Sequenced {
    /// Reset the book from this snapshot
    Reset(BookSnapshot),
    /// Apply this contiguous diff
    Apply(BookDiff),
    /// Already-seen sequence, dropped without error
    Stale { sequence: u64, expected: u64 },
    /// Diff received while awaiting a snapshot
    Discarded { sequence: u64 },
    /// Continuity lost; wait for a fresh snapshot
    Gap(GapReason),
}

/// Validates ordering and continuity of feed events
#[derive(Debug)]
pub struct Sequencer {
    state: SyncState,
    expected_next: u64,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            state: SyncState::AwaitingSnapshot,
            expected_next: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Next diff sequence that will be forwarded, while synced
    pub fn expected_next(&self) -> Option<u64> {
        match self.state {
            SyncState::Synced => Some(self.expected_next),
            SyncState::AwaitingSnapshot => None,
        }
    }

    /// Sequence one feed event
    pub fn on_event(&mut self, event: FeedEvent) -> Sequenced {
        match event {
            FeedEvent::Snapshot(snapshot) => self.on_snapshot(snapshot),
            FeedEvent::Diff(diff) => self.on_diff(diff),
            FeedEvent::Disconnected => self.declare_gap(GapReason::Disconnected),
            FeedEvent::Error { reason } => self.declare_gap(GapReason::FeedError(reason)),
        }
    }

    /// Leave the synced state because the book could not be maintained
    pub fn force_resync(&mut self, reason: impl Into<String>) -> Sequenced {
        self.declare_gap(GapReason::BookFault(reason.into()))
    }

    fn on_snapshot(&mut self, snapshot: BookSnapshot) -> Sequenced {
        if self.state == SyncState::AwaitingSnapshot {
            info!(sequence = snapshot.sequence, "Snapshot received, sequencer synced");
        } else {
            debug!(sequence = snapshot.sequence, "Snapshot received while synced, resetting");
        }
        self.state = SyncState::Synced;
        self.expected_next = snapshot.sequence + 1;
        Sequenced::Reset(snapshot)
    }

    fn on_diff(&mut self, diff: BookDiff) -> Sequenced {
        if self.state == SyncState::AwaitingSnapshot {
            trace!(sequence = diff.sequence, "Discarding diff while awaiting snapshot");
            return Sequenced::Discarded {
                sequence: diff.sequence,
            };
        }

        let expected = self.expected_next;
        if diff.sequence == expected {
            self.expected_next += 1;
            Sequenced::Apply(diff)
        } else if diff.sequence < expected {
            debug!(sequence = diff.sequence, expected, "Dropping stale diff");
            Sequenced::Stale {
                sequence: diff.sequence,
                expected,
            }
        } else {
            self.declare_gap(GapReason::Missing {
                expected,
                received: diff.sequence,
            })
        }
    }

    fn declare_gap(&mut self, reason: GapReason) -> Sequenced {
        if self.state == SyncState::Synced {
            warn!(reason = %reason, "Sequencer lost sync, awaiting snapshot");
        } else {
            debug!(reason = %reason, "Gap signalled while already awaiting snapshot");
        }
        self.state = SyncState::AwaitingSnapshot;
        Sequenced::Gap(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(sequence: u64) -> FeedEvent {
        FeedEvent::Snapshot(BookSnapshot {
            sequence,
            timestamp: 0,
            bids: vec![],
            asks: vec![],
        })
    }

    fn diff(sequence: u64) -> FeedEvent {
        FeedEvent::Diff(BookDiff {
            sequence,
            timestamp: 0,
            updates: vec![],
        })
    }

    #[test]
    fn test_starts_awaiting_snapshot() {
        let mut sequencer = Sequencer::new();
        assert_eq!(sequencer.state(), SyncState::AwaitingSnapshot);
        assert_eq!(sequencer.expected_next(), None);
        assert_eq!(
            sequencer.on_event(diff(1)),
            Sequenced::Discarded { sequence: 1 }
        );
    }

    #[test]
    fn test_contiguous_diffs_are_forwarded() {
        let mut sequencer = Sequencer::new();
        assert!(matches!(sequencer.on_event(snapshot(10)), Sequenced::Reset(_)));
        assert_eq!(sequencer.expected_next(), Some(11));
        assert!(matches!(sequencer.on_event(diff(11)), Sequenced::Apply(_)));
        assert!(matches!(sequencer.on_event(diff(12)), Sequenced::Apply(_)));
        assert_eq!(sequencer.expected_next(), Some(13));
    }

    #[test]
    fn test_duplicate_diff_is_stale() {
        let mut sequencer = Sequencer::new();
        sequencer.on_event(snapshot(1));
        sequencer.on_event(diff(2));

        assert_eq!(
            sequencer.on_event(diff(2)),
            Sequenced::Stale {
                sequence: 2,
                expected: 3
            }
        );
        assert_eq!(
            sequencer.on_event(diff(1)),
            Sequenced::Stale {
                sequence: 1,
                expected: 3
            }
        );
        assert_eq!(sequencer.state(), SyncState::Synced);
    }

    #[test]
    fn test_gap_requires_new_snapshot() {
        let mut sequencer = Sequencer::new();
        sequencer.on_event(snapshot(0));
        sequencer.on_event(diff(1));
        sequencer.on_event(diff(2));

        assert_eq!(
            sequencer.on_event(diff(4)),
            Sequenced::Gap(GapReason::Missing {
                expected: 3,
                received: 4
            })
        );
        assert_eq!(sequencer.state(), SyncState::AwaitingSnapshot);

        // Late arrival of the missing diff is not applied either
        assert_eq!(
            sequencer.on_event(diff(3)),
            Sequenced::Discarded { sequence: 3 }
        );
        assert!(matches!(sequencer.on_event(snapshot(20)), Sequenced::Reset(_)));
        assert!(matches!(sequencer.on_event(diff(21)), Sequenced::Apply(_)));
    }

    #[test]
    fn test_disconnect_and_error_declare_gap() {
        let mut sequencer = Sequencer::new();
        sequencer.on_event(snapshot(5));
        let gap = sequencer.on_event(FeedEvent::Disconnected);
        assert_eq!(gap, Sequenced::Gap(GapReason::Disconnected));
        assert_eq!(sequencer.state(), SyncState::AwaitingSnapshot);

        sequencer.on_event(snapshot(1));
        let gap = sequencer.on_event(FeedEvent::Error {
            reason: "bad frame".into(),
        });
        assert_eq!(gap, Sequenced::Gap(GapReason::FeedError("bad frame".into())));
    }

    #[test]
    fn test_sequences_not_compared_across_epochs() {
        let mut sequencer = Sequencer::new();
        sequencer.on_event(snapshot(500));
        sequencer.on_event(FeedEvent::Disconnected);

        // New epoch restarts numbering lower than before
        sequencer.on_event(snapshot(3));
        assert!(matches!(sequencer.on_event(diff(4)), Sequenced::Apply(_)));
    }

    #[test]
    fn test_force_resync() {
        let mut sequencer = Sequencer::new();
        sequencer.on_event(snapshot(1));
        let gap = sequencer.force_resync("crossed book");
        assert_eq!(gap, Sequenced::Gap(GapReason::BookFault("crossed book".into())));
        assert_eq!(sequencer.state(), SyncState::AwaitingSnapshot);
    }

    #[test]
    fn test_resync_request_policy() {
        assert!(!GapReason::Disconnected.needs_resync_request());
        assert!(GapReason::Missing {
            expected: 1,
            received: 2
        }
        .needs_resync_request());
        assert!(GapReason::FeedError("x".into()).needs_resync_request());
    }
}
