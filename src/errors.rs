use thiserror::Error;

/// Engine-level errors.
///
/// Only genuinely invalid inputs become errors. Conditions the game must
/// absorb without failing a tick (same-column jumps, stale prices, zero
/// denominators) are modeled as outcome enums or fallbacks instead, so the
/// render loop never sees an unhandled failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Price is missing, zero, negative, or non-finite where a valid mark is required.
    #[error("invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: f64 },

    /// Requested leverage is not one of the enumerated steps.
    #[error("leverage x{requested} is not available (allowed: x1, x10, x100, x500, x1000)")]
    InvalidLeverage { requested: u32 },

    /// Asset index outside the configured symbol list.
    #[error("no asset at index {index} ({count} assets configured)")]
    UnknownAsset { index: usize, count: usize },

    /// Operation requires an open position but none exists.
    #[error("no open position")]
    NoOpenPosition,

    /// Configuration rejected at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Price feed errors.
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    /// WebSocket connect/stream failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Frame did not parse as a ticker message.
    #[error("parse error: {0}")]
    Parse(String),

    /// Reconnect attempts exhausted.
    #[error("gave up after {attempts} reconnect attempts")]
    ReconnectsExhausted { attempts: u32 },
}

impl FeedError {
    /// Create a connection error from any display-able source.
    pub fn connection(msg: impl std::fmt::Display) -> Self {
        FeedError::Connection(msg.to_string())
    }

    /// Create a parse error from any display-able source.
    pub fn parse(msg: impl std::fmt::Display) -> Self {
        FeedError::Parse(msg.to_string())
    }
}
