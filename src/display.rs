//! Terminal rendering of the published book
//!
//! Reads only through [`SnapshotPublisher`]; redraws whenever a new view is
//! published. Output goes to stdout, logs stay on stderr.

use std::fmt::Write as _;
use std::sync::Arc;
use tokio::io::{self, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::publisher::{BookStatus, BookView, SnapshotPublisher};

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[H";
const COLUMN_WIDTH: usize = 30;

/// Render one frame showing up to `depth` levels per side
pub fn render(view: &BookView, depth: usize) -> String {
    let mut out = String::from(CLEAR_SCREEN);

    let _ = writeln!(out, "Order Book (product {})", view.product_id);
    let _ = writeln!(out, "{:=<width$}", "", width = COLUMN_WIDTH * 2);
    match view.status {
        BookStatus::Live => {}
        BookStatus::AwaitingSnapshot => {
            let _ = writeln!(out, "[waiting for snapshot]");
        }
        BookStatus::Resyncing => {
            let _ = writeln!(out, "[STALE - resynchronizing, last sequence {}]", view.sequence);
        }
    }

    match view.metrics.mid_price {
        Some(mid) => {
            let _ = writeln!(out, "Market Price: {:.2}", mid);
        }
        None => {
            let _ = writeln!(out, "Market Price: N/A");
        }
    }
    if let Some(bps) = view.metrics.spread_bps {
        let _ = writeln!(out, "Spread: {:.2} bps", bps);
    }
    if view.is_one_sided() {
        let _ = writeln!(out, "One-sided book");
    }
    out.push('\n');

    let _ = writeln!(
        out,
        "{:<width$} {:>width$}",
        "Asks (Price -> Quantity)",
        "Bids (Price -> Quantity)",
        width = COLUMN_WIDTH
    );
    let _ = writeln!(out, "{:=<width$}", "", width = COLUMN_WIDTH * 2 + 1);

    let mut asks = view.asks.iter().take(depth);
    let mut bids = view.bids.iter().take(depth);
    loop {
        let ask = asks.next();
        let bid = bids.next();
        if ask.is_none() && bid.is_none() {
            break;
        }
        let ask = ask
            .map(|l| format!("{} -> {}", l.price, l.quantity))
            .unwrap_or_default();
        let bid = bid
            .map(|l| format!("{} -> {}", l.price, l.quantity))
            .unwrap_or_default();
        let _ = writeln!(out, "{:<width$} {:>width$}", ask, bid, width = COLUMN_WIDTH);
    }

    out
}

/// Redraw on every published change until shutdown
pub async fn run(publisher: Arc<SnapshotPublisher>, depth: usize, shutdown: CancellationToken) {
    let mut changes = publisher.subscribe();
    let mut stdout = io::stdout();

    loop {
        let frame = render(&publisher.current(), depth);
        if let Err(e) = write_frame(&mut stdout, &frame).await {
            warn!(error = %e, "Failed to draw order book, display stopped");
            return;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Display stopped");
}

async fn write_frame(stdout: &mut io::Stdout, frame: &str) -> std::io::Result<()> {
    stdout.write_all(frame.as_bytes()).await?;
    stdout.flush().await
}
