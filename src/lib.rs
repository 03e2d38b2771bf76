//! Vertex Market Data Handler Library
//!
//! Maintains a local order book for one Vertex Protocol instrument from a
//! snapshot plus a stream of incremental depth updates, and publishes
//! immutable, validated views of it to concurrent readers.

pub mod config;
pub mod display;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod orderbook;
pub mod parser;
pub mod pipeline;
pub mod publisher;
pub mod sequencer;

pub use config::Config;
pub use error::{MarketDataError, Result};
pub use feed::{
    BookDiff, BookSnapshot, FeedEvent, FeedSession, FeedTransport, LevelUpdate, ResyncHandle,
    SessionSettings, VertexTransport,
};
pub use metrics::Metrics;
pub use orderbook::{BookBuilder, OrderBook, OrderBookMetrics, PriceLevel, Side};
pub use pipeline::Pipeline;
pub use publisher::{BookStatus, BookView, SnapshotPublisher};
pub use sequencer::{Sequenced, Sequencer, SyncState};
