//! Prometheus counters for the feed session and the book pipeline

use prometheus::{IntCounter, Registry};

/// Counters shared by the session and the pipeline
#[derive(Clone)]
pub struct Metrics {
    pub events_received: IntCounter,
    pub diffs_applied: IntCounter,
    pub stale_diffs: IntCounter,
    pub gaps_detected: IntCounter,
    pub resyncs_requested: IntCounter,
    pub invariant_violations: IntCounter,
    pub malformed_frames: IntCounter,
    pub reconnects: IntCounter,
}

impl Metrics {
    /// Create unregistered counters
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            events_received: IntCounter::new(
                "book_feed_events_total",
                "Feed events received by the pipeline",
            )?,
            diffs_applied: IntCounter::new(
                "book_diffs_applied_total",
                "Diffs applied to the order book",
            )?,
            stale_diffs: IntCounter::new(
                "book_stale_diffs_total",
                "Diffs dropped as stale duplicates",
            )?,
            gaps_detected: IntCounter::new(
                "book_gaps_total",
                "Sequence gaps, disconnects and feed errors that forced a resync",
            )?,
            resyncs_requested: IntCounter::new(
                "book_resync_requests_total",
                "Snapshot resyncs requested from the feed session",
            )?,
            invariant_violations: IntCounter::new(
                "book_invariant_violations_total",
                "Snapshots or diffs rejected for violating book invariants",
            )?,
            malformed_frames: IntCounter::new(
                "feed_malformed_frames_total",
                "Feed frames dropped because they could not be parsed",
            )?,
            reconnects: IntCounter::new(
                "feed_reconnects_total",
                "Feed reconnect attempts after transport faults",
            )?,
        })
    }

    /// Register every counter with a registry
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        for counter in [
            &self.events_received,
            &self.diffs_applied,
            &self.stale_diffs,
            &self.gaps_detected,
            &self.resyncs_requested,
            &self.invariant_violations,
            &self.malformed_frames,
            &self.reconnects,
        ] {
            registry.register(Box::new(counter.clone()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_exposes_counters() {
        let registry = Registry::new();
        let metrics = Metrics::new().unwrap();
        metrics.register(&registry).unwrap();
        metrics.gaps_detected.inc();

        let families = registry.gather();
        assert_eq!(families.len(), 8);
        let gaps = families
            .iter()
            .find(|f| f.get_name() == "book_gaps_total")
            .unwrap();
        assert_eq!(gaps.get_metric()[0].get_counter().get_value(), 1.0);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        let metrics = Metrics::new().unwrap();
        tokio_test::assert_ok!(metrics.register(&registry));
        tokio_test::assert_err!(metrics.register(&registry));
    }
}
