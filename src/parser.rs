//! Parser module for Vertex gateway messages
//!
//! Handles deserialization of `book_depth` stream events, subscription
//! responses and `market_liquidity` snapshot responses. Prices and sizes
//! arrive as x18 fixed-point integers and are converted to exact decimals.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::json;

use crate::orderbook::PriceLevel;

/// Scale of Vertex fixed-point values
const X18_SCALE: u32 = 18;

/// Vertex `book_depth` stream event
#[derive(Debug, Clone, Deserialize)]
pub struct BookDepth {
    /// Event type
    #[serde(rename = "type")]
    pub event_type: String,

    /// Earliest change included (nanoseconds)
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub min_timestamp: u64,

    /// Latest change included (nanoseconds)
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub max_timestamp: u64,

    /// `max_timestamp` of the previous event on this stream
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_max_timestamp: u64,

    /// Product (instrument) id
    pub product_id: u32,

    /// Bid levels to update
    #[serde(deserialize_with = "deserialize_x18_levels")]
    pub bids: Vec<PriceLevel>,

    /// Ask levels to update
    #[serde(deserialize_with = "deserialize_x18_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Response to a subscribe request
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionResponse {
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub id: u64,
}

/// Envelope of a `market_liquidity` query response
#[derive(Debug, Clone, Deserialize)]
pub struct MarketLiquidityResponse {
    pub status: String,
    pub data: Option<MarketLiquidity>,
    pub error: Option<String>,
    pub request_type: Option<String>,
}

/// Full depth snapshot from the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct MarketLiquidity {
    /// Bids
    #[serde(deserialize_with = "deserialize_x18_levels")]
    pub bids: Vec<PriceLevel>,

    /// Asks
    #[serde(deserialize_with = "deserialize_x18_levels")]
    pub asks: Vec<PriceLevel>,

    /// Snapshot time (nanoseconds)
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: u64,
}

impl MarketLiquidityResponse {
    /// Unwrap a successful response, or return the gateway's error text
    pub fn into_result(self) -> Result<MarketLiquidity, String> {
        match (self.status.as_str(), self.data) {
            ("success", Some(data)) => Ok(data),
            _ => Err(self
                .error
                .unwrap_or_else(|| format!("query returned status {}", self.status))),
        }
    }
}

/// Parsed stream message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    BookDepth(BookDepth),
    Subscription(SubscriptionResponse),
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw WebSocket text frame
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        match value.get("type").and_then(|t| t.as_str()) {
            Some("book_depth") => {
                let depth: BookDepth = serde_json::from_value(value)?;
                Ok(ParsedMessage::BookDepth(depth))
            }
            Some(_) => Ok(ParsedMessage::Unknown(raw.to_string())),
            None if value.get("id").is_some() => {
                let response: SubscriptionResponse = serde_json::from_value(value)?;
                Ok(ParsedMessage::Subscription(response))
            }
            None => Ok(ParsedMessage::Unknown(raw.to_string())),
        }
    }
}

/// Subscribe request for the `book_depth` stream of one product
pub fn book_depth_subscription(product_id: u32) -> String {
    json!({
        "method": "subscribe",
        "stream": {
            "type": "book_depth",
            "product_id": product_id
        },
        "id": 0
    })
    .to_string()
}

/// Convert an x18 fixed-point integer string to an exact decimal
pub fn parse_x18(raw: &str) -> Result<Decimal, String> {
    let value: i128 = raw
        .parse()
        .map_err(|e| format!("invalid x18 value {raw:?}: {e}"))?;
    Decimal::try_from_i128_with_scale(value, X18_SCALE)
        .map(|d| d.normalize())
        .map_err(|e| format!("x18 value {raw:?} out of range: {e}"))
}

/// Custom deserializer for nanosecond timestamps sent as strings
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Custom deserializer for price levels from array of x18 string pairs
fn deserialize_x18_levels<'de, D>(deserializer: D) -> Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<(String, String)> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(price, quantity)| {
            Ok(PriceLevel {
                price: parse_x18(&price).map_err(serde::de::Error::custom)?,
                quantity: parse_x18(&quantity).map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}
