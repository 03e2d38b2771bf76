//! Feed session and exchange adapter
//!
//! Turns the Vertex `book_depth` stream plus `market_liquidity` snapshots
//! into a sequenced [`FeedEvent`] stream for the core.

mod backoff;
mod chain;
mod event;
mod session;
pub mod transport;
mod vertex;

pub use backoff::ExponentialBackoff;
pub use chain::{ChainLink, TimestampChain};
pub use event::{BookDiff, BookSnapshot, FeedEvent, LevelUpdate};
pub use session::{FeedSession, ResyncHandle, ResyncRequest, SessionSettings, SessionState};
pub use transport::FeedTransport;
pub use vertex::VertexTransport;
