//! Binance WebSocket ticker feed.
//!
//! Streams 24h ticker updates for every tracked symbol over one combined
//! stream and forwards validated [`PriceUpdate`]s to the game loop.
//!
//! # Architecture
//!
//! ```text
//! Binance WS (wss://stream.binance.com:9443)
//!     │
//!     ├── /stream?streams=btcusdt@ticker/ethusdt@ticker/...
//!     │
//!     ▼
//! BinanceFeed
//!     │
//!     ├── maps pairs back to game symbols (BTCUSDT -> BTC)
//!     ├── rejects zero/non-finite prices at the wire
//!     ├── sends FeedEvents to the game loop via channel
//!     │
//!     ▼
//! PriceTable (single writer) -> per-tick PriceSnapshot
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use crate::errors::FeedError;
use crate::feed::FeedEvent;
use crate::prices::PriceUpdate;

/// Game symbol to Binance pair mapping.
#[derive(Debug, Clone)]
pub struct SymbolMapping {
    /// Symbol the game uses (e.g. "BTC").
    pub symbol: String,
    /// Binance pair (e.g. "BTCUSDT").
    pub pair: String,
}

/// Configuration for the Binance feed.
#[derive(Debug, Clone)]
pub struct BinanceFeedConfig {
    /// Tracked symbols and their Binance pairs.
    pub mappings: Vec<SymbolMapping>,
    /// WebSocket endpoint.
    pub ws_url: String,
    /// Base reconnect delay; doubles per failed attempt.
    pub reconnect_delay: Duration,
    /// Maximum reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for BinanceFeedConfig {
    fn default() -> Self {
        Self::for_symbols(&["BTC", "ETH", "ADA", "DOT"])
    }
}

impl BinanceFeedConfig {
    /// Config for a symbol list, pairing each against USDT.
    pub fn for_symbols(symbols: &[&str]) -> Self {
        Self {
            mappings: symbols
                .iter()
                .map(|s| SymbolMapping {
                    symbol: s.to_string(),
                    pair: format!("{}USDT", s.to_uppercase()),
                })
                .collect(),
            ws_url: "wss://stream.binance.com:9443".to_string(),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 10,
        }
    }

    /// Combined-stream URL subscribing every pair's ticker.
    pub fn stream_url(&self) -> String {
        let streams: Vec<String> = self
            .mappings
            .iter()
            .map(|m| format!("{}@ticker", m.pair.to_lowercase()))
            .collect();
        format!("{}/stream?streams={}", self.ws_url, streams.join("/"))
    }

    /// Game symbol for a Binance pair, if tracked.
    fn symbol_for_pair(&self, pair: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.pair == pair)
            .map(|m| m.symbol.as_str())
    }
}

/// Combined-stream envelope.
#[derive(Debug, Deserialize)]
struct StreamMessage {
    stream: String,
    data: TickerData,
}

/// Binance 24h ticker payload (the fields the game consumes).
#[derive(Debug, Deserialize)]
struct TickerData {
    /// Pair, e.g. "BTCUSDT".
    #[serde(rename = "s")]
    pair: String,
    /// Last trade price.
    #[serde(rename = "c")]
    last_price: String,
    /// 24h price change percent.
    #[serde(rename = "P")]
    change_pct: String,
    /// 24h base-asset volume.
    #[serde(rename = "v")]
    volume: String,
    /// 24h high.
    #[serde(rename = "h")]
    high: String,
    /// 24h low.
    #[serde(rename = "l")]
    low: String,
}

/// Live Binance ticker feed.
pub struct BinanceFeed {
    config: BinanceFeedConfig,
    tx: mpsc::Sender<FeedEvent>,
    reconnect_attempts: u32,
}

impl BinanceFeed {
    /// Create a new feed.
    pub fn new(config: BinanceFeedConfig, tx: mpsc::Sender<FeedEvent>) -> Self {
        Self {
            config,
            tx,
            reconnect_attempts: 0,
        }
    }

    /// Run the feed (blocking, should be spawned).
    ///
    /// Reconnects with exponential backoff on failure; gives up after the
    /// configured number of attempts.
    pub async fn run(mut self) {
        loop {
            match self.connect_and_stream().await {
                Ok(()) => {
                    info!("Binance feed closed normally");
                    break;
                }
                Err(e) => {
                    self.send(FeedEvent::Connected(false)).await;
                    self.reconnect_attempts += 1;
                    if self.reconnect_attempts > self.config.max_reconnect_attempts {
                        let err = FeedError::ReconnectsExhausted {
                            attempts: self.reconnect_attempts,
                        };
                        error!(error = %err, "giving up on Binance feed");
                        break;
                    }

                    let delay = self.backoff_delay();
                    warn!(
                        error = %e,
                        attempt = self.reconnect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Binance feed error, reconnecting"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Delay before the next reconnect attempt: base * 2^(attempt-1),
    /// capped at one minute.
    fn backoff_delay(&self) -> Duration {
        let exponent = self.reconnect_attempts.saturating_sub(1).min(16);
        let delay = self.config.reconnect_delay * 2u32.pow(exponent);
        delay.min(Duration::from_secs(60))
    }

    /// Connect and stream until the socket closes or errors.
    async fn connect_and_stream(&mut self) -> Result<(), FeedError> {
        let url = self.config.stream_url();
        info!(url = %url, "connecting to Binance WebSocket");

        let (ws_stream, _) = connect_async(&url).await.map_err(FeedError::connection)?;
        info!("connected to Binance WebSocket");
        self.reconnect_attempts = 0;
        self.send(FeedEvent::Connected(true)).await;

        let (_, mut read) = ws_stream.split();
        while let Some(msg) = read.next().await {
            match msg {
                Ok(tokio_tungstenite::tungstenite::Message::Text(text)) => {
                    match parse_ticker(&self.config, &text) {
                        Ok(Some(update)) => {
                            // Drop on full rather than ever blocking the reader.
                            if self.tx.try_send(FeedEvent::Price(update)).is_err() {
                                debug!("price channel full, dropping update");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => debug!(error = %e, "unparseable frame"),
                    }
                }
                Ok(tokio_tungstenite::tungstenite::Message::Close(_)) => {
                    info!("Binance WebSocket closed by server");
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(FeedError::connection(e)),
            }
        }

        self.send(FeedEvent::Connected(false)).await;
        Ok(())
    }

    async fn send(&self, event: FeedEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("feed channel closed");
        }
    }
}

/// Parse one combined-stream frame into a price update.
///
/// Returns `Ok(None)` for frames that are not tracked tickers or that carry
/// an unusable price; only well-formed updates reach the table.
fn parse_ticker(config: &BinanceFeedConfig, text: &str) -> Result<Option<PriceUpdate>, FeedError> {
    if !text.contains("@ticker") {
        return Ok(None);
    }
    let msg: StreamMessage = serde_json::from_str(text).map_err(FeedError::parse)?;
    if !msg.stream.contains("@ticker") {
        return Ok(None);
    }

    let Some(symbol) = config.symbol_for_pair(&msg.data.pair) else {
        return Ok(None);
    };

    let price: f64 = msg.data.last_price.parse().map_err(FeedError::parse)?;
    if !price.is_finite() || price <= 0.0 {
        return Ok(None);
    }

    Ok(Some(PriceUpdate {
        symbol: symbol.to_string(),
        price,
        change_24h: msg.data.change_pct.parse().unwrap_or(0.0),
        volume: msg.data.volume.parse().unwrap_or(0.0),
        high_24h: msg.data.high.parse().unwrap_or(price),
        low_24h: msg.data.low.parse().unwrap_or(price),
    }))
}

// ============================================================================
// Tests
// ============================================================================
