//! Core event pipeline
//!
//! Single consumer of the feed event channel. Every event runs through the
//! sequencer, then the book builder; whenever continuity is lost the
//! published view is flagged and the feed session is asked for a snapshot.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::feed::{FeedEvent, ResyncHandle};
use crate::metrics::Metrics;
use crate::orderbook::{BookBuilder, BookFault};
use crate::publisher::SnapshotPublisher;
use crate::sequencer::{GapReason, Sequenced, Sequencer, SyncState};

/// Interval of the periodic book status log line
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Sequencer plus book builder for one instrument
pub struct Pipeline {
    product_id: u32,
    sequencer: Sequencer,
    builder: BookBuilder,
    resync: ResyncHandle,
    metrics: Metrics,
    /// Sequence of the newest snapshot seen, accepted or not
    last_snapshot: Option<u64>,
}

impl Pipeline {
    pub fn new(
        product_id: u32,
        publisher: Arc<SnapshotPublisher>,
        resync: ResyncHandle,
        metrics: Metrics,
    ) -> Self {
        Self {
            product_id,
            sequencer: Sequencer::new(),
            builder: BookBuilder::new(product_id, publisher),
            resync,
            metrics,
            last_snapshot: None,
        }
    }

    pub fn sync_state(&self) -> SyncState {
        self.sequencer.state()
    }

    pub fn builder(&self) -> &BookBuilder {
        &self.builder
    }

    /// Process one feed event to completion
    pub fn handle(&mut self, event: FeedEvent) {
        self.metrics.events_received.inc();
        trace!(sequence = ?event.sequence(), "Handling feed event");

        match self.sequencer.on_event(event) {
            Sequenced::Reset(snapshot) => {
                // A rejected snapshot must still supersede older resync requests
                self.last_snapshot = Some(snapshot.sequence);
                if let Err(fault) = self.builder.apply_snapshot(&snapshot) {
                    self.on_fault(fault);
                }
            }
            Sequenced::Apply(diff) => match self.builder.apply_diff(&diff) {
                Ok(()) => self.metrics.diffs_applied.inc(),
                Err(fault) => self.on_fault(fault),
            },
            Sequenced::Stale { .. } => self.metrics.stale_diffs.inc(),
            Sequenced::Discarded { .. } => {}
            Sequenced::Gap(reason) => self.on_gap(reason),
        }
    }

    /// Consume events until the channel closes or shutdown is signalled.
    ///
    /// On shutdown the events already queued are still applied.
    pub async fn run(mut self, mut events: mpsc::Receiver<FeedEvent>, shutdown: CancellationToken) {
        info!(product_id = self.product_id, "Book pipeline started");

        let mut status = interval(STATUS_LOG_INTERVAL);
        status.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    let mut drained = 0usize;
                    while let Ok(event) = events.try_recv() {
                        self.handle(event);
                        drained += 1;
                    }
                    debug!(drained, "Drained queued events on shutdown");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => {
                        info!("Feed event channel closed");
                        break;
                    }
                },
                _ = status.tick() => self.log_status(),
            }
        }

        info!(product_id = self.product_id, "Book pipeline stopped");
    }

    fn on_fault(&mut self, fault: BookFault) {
        if matches!(fault, BookFault::Violation(_)) {
            self.metrics.invariant_violations.inc();
        }
        self.builder.discard();
        let Sequenced::Gap(reason) = self.sequencer.force_resync(fault.to_string()) else {
            return;
        };
        self.on_gap(reason);
    }

    fn on_gap(&mut self, reason: GapReason) {
        self.metrics.gaps_detected.inc();
        self.builder.publisher().mark_resyncing();

        if reason.needs_resync_request() {
            warn!(
                product_id = self.product_id,
                reason = %reason,
                last_snapshot = ?self.last_snapshot,
                "Requesting snapshot resync"
            );
            self.metrics.resyncs_requested.inc();
            if !self.resync.request_resync(self.last_snapshot) {
                warn!("Feed session gone, resync request dropped");
            }
        } else {
            info!(reason = %reason, "Awaiting snapshot from reconnect");
        }
    }

    fn log_status(&self) {
        let view = self.builder.publisher().current();
        match view.metrics.mid_price {
            Some(mid) => info!(
                product_id = self.product_id,
                mid_price = %mid,
                spread_bps = ?view.metrics.spread_bps,
                imbalance = ?view.metrics.imbalance,
                status = ?view.status,
                version = view.version,
                "Order book status"
            ),
            None => info!(
                product_id = self.product_id,
                status = ?view.status,
                "Order book has no two-sided market"
            ),
        }
    }
}
