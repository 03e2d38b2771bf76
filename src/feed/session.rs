//! Feed session lifecycle
//!
//! Owns the streaming connection: connect and subscribe, take a snapshot,
//! stream diffs, keep the connection alive, and reconnect with backoff when
//! it fails. Every epoch starts with exactly one snapshot event.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::backoff::ExponentialBackoff;
use super::chain::{ChainLink, TimestampChain};
use super::{BookDiff, BookSnapshot, FeedEvent, FeedTransport, LevelUpdate};
use crate::config::Config;
use crate::error::{MarketDataError, Result};
use crate::metrics::Metrics;
use crate::parser::{BookDepth, ParsedMessage};

/// How long a fatal error waits for room in the event channel
const FATAL_EVENT_TIMEOUT: Duration = Duration::from_secs(1);

/// Observable connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Subscribing,
    Connected,
    Reconnecting { attempt: u32 },
    Stopped,
}

/// Timing and subscription parameters of a session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub product_id: u32,
    pub snapshot_depth: usize,
    pub ping_interval: Duration,
    pub stale_timeout: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub reconnect_jitter_ms: u64,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            product_id: config.product_id,
            snapshot_depth: config.snapshot_depth,
            ping_interval: config.ping_interval(),
            stale_timeout: config.stale_timeout(),
            reconnect_delay: config.reconnect_delay(),
            max_reconnect_delay: config.max_reconnect_delay(),
            reconnect_jitter_ms: config.reconnect_jitter_ms,
        }
    }
}

/// Request for a fresh snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncRequest {
    /// Sequence of the newest snapshot the requester has seen
    pub last_snapshot: Option<u64>,
}

/// Core-side handle for asking the session to resynchronize
#[derive(Debug, Clone)]
pub struct ResyncHandle {
    tx: mpsc::UnboundedSender<ResyncRequest>,
}

impl ResyncHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ResyncRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Ask for a new snapshot; returns false if the session is gone.
    ///
    /// Requests made before the newest snapshot was emitted are ignored by
    /// the session, so repeated requests yield a single new snapshot.
    pub fn request_resync(&self, last_snapshot: Option<u64>) -> bool {
        self.tx.send(ResyncRequest { last_snapshot }).is_ok()
    }
}

/// How a connection epoch ended without a transport fault
enum EpochEnd {
    Resync,
    Shutdown,
}

/// Streams one instrument's book into a [`FeedEvent`] channel
pub struct FeedSession<T: FeedTransport> {
    transport: T,
    settings: SessionSettings,
    events: mpsc::Sender<FeedEvent>,
    resync_requests: mpsc::UnboundedReceiver<ResyncRequest>,
    shutdown: CancellationToken,
    state: watch::Sender<SessionState>,
    metrics: Metrics,
    chain: TimestampChain,
    backoff: ExponentialBackoff,
    /// Last sequence handed out; never reset so numbers keep increasing
    sequence: u64,
    last_snapshot: Option<u64>,
    /// Whether the current epoch has delivered its snapshot
    delivering: bool,
}

impl<T: FeedTransport> FeedSession<T> {
    pub fn new(
        transport: T,
        settings: SessionSettings,
        events: mpsc::Sender<FeedEvent>,
        resync_requests: mpsc::UnboundedReceiver<ResyncRequest>,
        shutdown: CancellationToken,
        metrics: Metrics,
    ) -> Self {
        let backoff = ExponentialBackoff::new(
            settings.reconnect_delay,
            settings.max_reconnect_delay,
            settings.reconnect_jitter_ms,
        );
        let (state, _) = watch::channel(SessionState::Connecting);

        Self {
            transport,
            settings,
            events,
            resync_requests,
            shutdown,
            state,
            metrics,
            chain: TimestampChain::new(),
            backoff,
            sequence: 0,
            last_snapshot: None,
            delivering: false,
        }
    }

    /// Lifecycle updates; subscribe before calling [`FeedSession::run`]
    pub fn state_updates(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run until shutdown or a fatal fault, reconnecting on everything else
    pub async fn run(mut self) -> Result<()> {
        info!(
            product_id = self.settings.product_id,
            "Starting feed session with infinite retry"
        );

        let shutdown = self.shutdown.clone();
        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Ok(EpochEnd::Shutdown),
                result = self.run_epoch() => result,
            };

            match outcome {
                Ok(EpochEnd::Shutdown) => break,
                Ok(EpochEnd::Resync) => {
                    info!("Resync requested, starting a new subscription");
                    self.transport.close().await;
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Fatal feed error, stopping session");
                    let event = FeedEvent::Error {
                        reason: e.to_string(),
                    };
                    match timeout(FATAL_EVENT_TIMEOUT, self.events.send(event)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => warn!("Event consumer gone, fatal error not delivered"),
                        Err(_) => warn!("Event channel full, fatal error not delivered"),
                    }
                    self.stop().await;
                    return Err(e);
                }
                Err(e) => {
                    self.transport.close().await;
                    self.metrics.reconnects.inc();

                    if self.delivering {
                        self.delivering = false;
                        let sent = tokio::select! {
                            _ = shutdown.cancelled() => false,
                            sent = self.events.send(FeedEvent::Disconnected) => sent.is_ok(),
                        };
                        if !sent {
                            break;
                        }
                    }

                    let delay = self.backoff.next_duration();
                    let attempt = self.backoff.attempts();
                    self.set_state(SessionState::Reconnecting { attempt });
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting after error..."
                    );

                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }

        self.stop().await;
        info!("Feed session stopped");
        Ok(())
    }

    /// One connection: subscribe, snapshot, then stream until it ends
    async fn run_epoch(&mut self) -> Result<EpochEnd> {
        self.delivering = false;
        let product_id = self.settings.product_id;

        self.set_state(SessionState::Connecting);
        self.transport.connect(product_id).await?;

        self.set_state(SessionState::Subscribing);
        let snapshot = self
            .transport
            .fetch_snapshot(product_id, self.settings.snapshot_depth)
            .await?;

        let sequence = self.next_sequence();
        self.chain.reset(snapshot.timestamp);
        info!(
            product_id,
            sequence,
            timestamp = snapshot.timestamp,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "Snapshot received, streaming diffs"
        );

        let event = FeedEvent::Snapshot(BookSnapshot {
            sequence,
            timestamp: snapshot.timestamp,
            bids: snapshot.bids,
            asks: snapshot.asks,
        });
        if !self.emit(event).await {
            return Ok(EpochEnd::Shutdown);
        }
        self.last_snapshot = Some(sequence);
        self.delivering = true;
        self.backoff.reset();
        self.set_state(SessionState::Connected);

        let ping_interval = self.settings.ping_interval;
        let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_activity = Instant::now();

        loop {
            let stale_deadline = last_activity + self.settings.stale_timeout;

            tokio::select! {
                biased;
                Some(request) = self.resync_requests.recv() => {
                    if request.last_snapshot >= self.last_snapshot {
                        return Ok(EpochEnd::Resync);
                    }
                    debug!(
                        requested_after = ?request.last_snapshot,
                        newest = ?self.last_snapshot,
                        "Ignoring superseded resync request"
                    );
                }
                _ = sleep_until(stale_deadline) => {
                    warn!(
                        idle_ms = self.settings.stale_timeout.as_millis() as u64,
                        "No message received within stale timeout"
                    );
                    return Err(MarketDataError::ConnectionTimeout);
                }
                _ = ping.tick() => {
                    self.transport.ping().await?;
                }
                message = self.transport.next_message() => {
                    last_activity = Instant::now();
                    if let Some(raw) = message? {
                        if !self.handle_frame(&raw).await? {
                            return Ok(EpochEnd::Shutdown);
                        }
                    }
                }
            }
        }
    }

    /// Returns false once the event receiver is gone
    async fn handle_frame(&mut self, raw: &str) -> Result<bool> {
        match ParsedMessage::parse(raw) {
            Ok(ParsedMessage::BookDepth(depth)) => self.handle_depth(depth).await,
            Ok(ParsedMessage::Subscription(response)) => match response.error {
                Some(reason) => Err(MarketDataError::SubscriptionRejected(reason)),
                None => {
                    debug!(id = response.id, "Subscription confirmed");
                    Ok(true)
                }
            },
            Ok(ParsedMessage::Unknown(msg)) => {
                trace!(msg = %msg, "Unknown message type");
                Ok(true)
            }
            Err(e) => {
                // The chain will break at the next event and surface a gap
                self.metrics.malformed_frames.inc();
                warn!(error = %e, frame = %raw, "Dropping malformed frame");
                Ok(true)
            }
        }
    }

    async fn handle_depth(&mut self, depth: BookDepth) -> Result<bool> {
        if depth.product_id != self.settings.product_id {
            trace!(product_id = depth.product_id, "Ignoring depth for other product");
            return Ok(true);
        }

        match self.chain.link(depth.last_max_timestamp, depth.max_timestamp) {
            ChainLink::Stale => {
                trace!(
                    max_timestamp = depth.max_timestamp,
                    "Dropping depth event covered by snapshot"
                );
                return Ok(true);
            }
            ChainLink::Contiguous => {}
            ChainLink::Broken { expected, found } => {
                warn!(expected, found, "Depth event chain broken");
                // Lost events get a number nobody will ever deliver
                self.next_sequence();
            }
        }

        let updates = depth
            .bids
            .iter()
            .map(|l| LevelUpdate::bid(l.price, l.quantity))
            .chain(depth.asks.iter().map(|l| LevelUpdate::ask(l.price, l.quantity)))
            .collect();

        let diff = BookDiff {
            sequence: self.next_sequence(),
            timestamp: depth.max_timestamp,
            updates,
        };
        Ok(self.emit(FeedEvent::Diff(diff)).await)
    }

    async fn emit(&self, event: FeedEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    async fn stop(&mut self) {
        self.transport.close().await;
        self.set_state(SessionState::Stopped);
    }
}
