//! WebSocket client for the Vertex gateway
//!
//! Handles connection, subscription, message reception and snapshot
//! queries against the REST gateway.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use super::FeedTransport;
use crate::config::Config;
use crate::error::{MarketDataError, Result};
use crate::parser::{book_depth_subscription, MarketLiquidity, MarketLiquidityResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Vertex `book_depth` subscription plus `market_liquidity` queries
pub struct VertexTransport {
    stream: Option<WsStream>,
    ws_endpoint: String,
    gateway_endpoint: String,
    http: reqwest::Client,
}

impl VertexTransport {
    /// Create a new, unconnected transport
    pub fn new(ws_endpoint: &str, gateway_endpoint: &str) -> Self {
        Self {
            stream: None,
            ws_endpoint: ws_endpoint.to_string(),
            gateway_endpoint: gateway_endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.ws_endpoint, &config.gateway_endpoint)
    }

    fn stream_mut(&mut self) -> Result<&mut WsStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| MarketDataError::WebSocketConnection("Not connected".to_string()))
    }
}

#[async_trait]
impl FeedTransport for VertexTransport {
    async fn connect(&mut self, product_id: u32) -> Result<()> {
        self.close().await;

        info!(url = %self.ws_endpoint, product_id, "Connecting to Vertex WebSocket");

        let (mut ws_stream, response) = connect_async(&self.ws_endpoint).await.map_err(|e| {
            MarketDataError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");

        ws_stream
            .send(Message::Text(book_depth_subscription(product_id)))
            .await
            .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))?;

        debug!(product_id, "Subscribe request sent");
        self.stream = Some(ws_stream);

        Ok(())
    }

    async fn fetch_snapshot(&mut self, product_id: u32, depth: usize) -> Result<MarketLiquidity> {
        let url = format!(
            "{}/query?type=market_liquidity&product_id={}&depth={}",
            self.gateway_endpoint, product_id, depth
        );

        info!(product_id, url = %url, "Fetching order book snapshot");

        let response = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<MarketLiquidityResponse>()
            .await?;

        response
            .into_result()
            .map_err(MarketDataError::SnapshotRejected)
    }

    async fn next_message(&mut self) -> Result<Option<String>> {
        let stream = self.stream_mut()?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Some(text))
            }
            Some(Ok(Message::Ping(_))) => {
                // tungstenite queues the pong and flushes it on the next read or write
                debug!("Received ping");
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(MarketDataError::WebSocketConnection(
                    "Connection closed".to_string(),
                ))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.stream = None;
                Err(MarketDataError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                self.stream = None;
                Err(MarketDataError::WebSocketConnection(
                    "Stream ended".to_string(),
                ))
            }
        }
    }

    async fn ping(&mut self) -> Result<()> {
        self.stream_mut()?
            .send(Message::Ping(vec![]))
            .await
            .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
