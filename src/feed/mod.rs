//! Price feeds.
//!
//! Feeds are the single writer of the price table: they push [`FeedEvent`]s
//! over a bounded channel and the game loop drains them between ticks. Two
//! implementations exist: the live Binance ticker stream and a synthetic
//! generator that keeps the game playable offline.

mod binance;
mod synthetic;

pub use binance::*;
pub use synthetic::*;

use crate::prices::PriceUpdate;

/// Event pushed by a feed.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A fresh price for one symbol.
    Price(PriceUpdate),
    /// Connection state changed.
    Connected(bool),
}
